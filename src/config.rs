use std::env;

use crate::error::{Error, Result};

pub const DEFAULT_DATABASE: &str = "ExpenseShare";
pub const DEFAULT_COLLECTION: &str = "expense_shares";

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub mongodb_uri: Option<String>,
    pub database: String,
    pub collection: String,
}

impl Config {
    /// Reads `MONGODB_URI`, `EXPENSESHARE_DB` and `EXPENSESHARE_COLLECTION`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Config {
            mongodb_uri: non_empty("MONGODB_URI"),
            database: non_empty("EXPENSESHARE_DB").unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            collection: non_empty("EXPENSESHARE_COLLECTION")
                .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
        }
    }

    pub fn require_mongodb_uri(&self) -> Result<&str> {
        self.mongodb_uri
            .as_deref()
            .ok_or_else(|| Error::Config("You need to add the MONGODB_URI to the env".to_string()))
    }
}
