use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type UserId = i64;
pub type ExpenseId = i64;
pub type ShareId = ObjectId;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Inr,
    Usd,
    Eur,
    Gbp,
}

impl Currency {
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::Inr => "₹",
            Currency::Usd => "$",
            Currency::Eur => "€",
            Currency::Gbp => "£",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Currency::Inr => "INR",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
        };
        f.write_str(code)
    }
}

/// How a single participant's portion is derived.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "mode", content = "value", rename_all = "UPPERCASE")]
pub enum SplitMode {
    Equal,
    /// Amount owed, 2 decimal places at most.
    Exact(Decimal),
    /// Percentage of the total, 0 to 100.
    Percent(Decimal),
}

impl SplitMode {
    pub fn kind(&self) -> &'static str {
        match self {
            SplitMode::Equal => "EQUAL",
            SplitMode::Exact(_) => "EXACT",
            SplitMode::Percent(_) => "PERCENT",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Participant {
    pub user: UserId,
    pub split: SplitMode,
}

impl Participant {
    pub fn equal(user: UserId) -> Self {
        Participant {
            user,
            split: SplitMode::Equal,
        }
    }

    pub fn exact(user: UserId, amount: Decimal) -> Self {
        Participant {
            user,
            split: SplitMode::Exact(amount),
        }
    }

    pub fn percent(user: UserId, percent: Decimal) -> Self {
        Participant {
            user,
            split: SplitMode::Percent(percent),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Expense {
    pub id: ExpenseId,
    #[serde(default)]
    pub description: String,
    pub amount: Decimal,
    #[serde(default)]
    pub currency: Currency,
    pub payer: UserId,
    pub participants: Vec<Participant>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// One participant's owed portion of an expense. Immutable once stored.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ExpenseShare {
    #[serde(rename = "_id")]
    pub id: ShareId,
    pub expense_id: ExpenseId,
    /// Index of the participant within the expense.
    #[serde(default)]
    pub position: u32,
    pub user_id: UserId,
    pub share_amount: Decimal,
}

impl ExpenseShare {
    pub fn new(expense_id: ExpenseId, user_id: UserId, share_amount: Decimal) -> Self {
        ExpenseShare {
            id: ObjectId::new(),
            expense_id,
            position: 0,
            user_id,
            share_amount,
        }
    }

    pub fn at_position(mut self, position: u32) -> Self {
        self.position = position;
        self
    }
}
