use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::repository::ExpenseShareRepository;
use crate::schemas::{Expense, ExpenseId, ExpenseShare, UserId};
use crate::split::compute_shares;

/// Derives share sets from expenses and keeps them in a repository.
pub struct ShareService<R> {
    repository: R,
}

impl<R: ExpenseShareRepository> ShareService<R> {
    pub fn new(repository: R) -> Self {
        ShareService { repository }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Computes and stores the shares of a newly created expense.
    pub async fn record(&self, expense: &Expense) -> Result<Vec<ExpenseShare>> {
        let shares = shares_of(expense)?;
        if let Err(err) = self.repository.insert_for_expense(expense.id, &shares).await {
            warn!(expense_id = expense.id, %err, "shares not recorded");
            return Err(err);
        }
        info!(
            expense_id = expense.id,
            shares = shares.len(),
            amount = %expense.amount,
            "recorded expense shares"
        );
        Ok(shares)
    }

    /// Replaces the whole share set of an expense. Stored shares are left
    /// alone when the new split is invalid or the store rejects the new set.
    pub async fn recompute(&self, expense: &Expense) -> Result<Vec<ExpenseShare>> {
        let shares = shares_of(expense)?;
        let removed = self
            .repository
            .replace_for_expense(expense.id, &shares)
            .await?;
        info!(
            expense_id = expense.id,
            removed,
            shares = shares.len(),
            "recomputed expense shares"
        );
        Ok(shares)
    }

    pub async fn shares_for(&self, expense_id: ExpenseId) -> Result<Vec<ExpenseShare>> {
        self.repository.find_by_expense(expense_id).await
    }

    pub async fn shares_for_user(&self, user_id: UserId) -> Result<Vec<ExpenseShare>> {
        self.repository.find_by_user(user_id).await
    }
}

fn shares_of(expense: &Expense) -> Result<Vec<ExpenseShare>> {
    let shares = compute_shares(expense.amount, &expense.participants).map_err(|err| {
        warn!(expense_id = expense.id, reason = err.reason.code(), "rejected split");
        Error::from(err)
    })?;
    Ok(shares
        .into_iter()
        .zip(0u32..)
        .map(|(share, position)| {
            ExpenseShare::new(expense.id, share.user, share.amount).at_position(position)
        })
        .collect())
}
