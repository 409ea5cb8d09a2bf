use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::schemas::{Expense, ExpenseShare, UserId};

pub type Balance = HashMap<UserId, Decimal>;

/// Net position per user: positive means the user is owed money.
pub fn compute_balances(expenses: &[(Expense, Vec<ExpenseShare>)]) -> Balance {
    let mut balance = Balance::new();
    for (expense, shares) in expenses {
        let amount = expense.amount;
        balance
            .entry(expense.payer)
            .and_modify(|v| *v += amount)
            .or_insert(amount);
        for share in shares {
            balance
                .entry(share.user_id)
                .and_modify(|v| *v -= share.share_amount)
                .or_insert(-share.share_amount);
        }
    }
    balance
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct UserSummary {
    pub total_paid: Decimal,
    pub you_owe: Decimal,
    pub you_are_owed: Decimal,
}

pub fn summarize_for_user(user: UserId, expenses: &[(Expense, Vec<ExpenseShare>)]) -> UserSummary {
    let mut summary = UserSummary::default();
    for (expense, shares) in expenses {
        let own_share = shares
            .iter()
            .find(|share| share.user_id == user)
            .map(|share| share.share_amount);
        if expense.payer == user {
            summary.total_paid += expense.amount;
            // A payer outside the split is owed nothing by this expense
            if let Some(own_share) = own_share {
                summary.you_are_owed += expense.amount - own_share;
            }
        } else if let Some(own_share) = own_share {
            summary.you_owe += own_share;
        }
    }
    summary
}
