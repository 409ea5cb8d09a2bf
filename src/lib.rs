//! Expense splitting and share storage.
//!
//! [`split::compute_shares`] turns an expense amount and its participants into
//! per-user shares that add up to the amount to the cent. [`ShareService`]
//! records those shares through an [`ExpenseShareRepository`].

pub mod balance;
pub mod config;
pub mod error;
pub mod repository;
pub mod schemas;
pub mod service;
pub mod split;

pub use error::{Error, Result};
pub use repository::{ExpenseShareRepository, InMemoryShareRepository, MongoShareRepository};
pub use schemas::{Currency, Expense, ExpenseShare, Participant, SplitMode};
pub use service::ShareService;
pub use split::{compute_shares, InvalidSplitError, SplitErrorReason, UserShare};
