use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOptions, IndexOptions};
use mongodb::{bson::doc, Client, ClientSession, Collection, IndexModel};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::schemas::{ExpenseId, ExpenseShare, ShareId, UserId};

const DUPLICATE_KEY: i32 = 11000;
const WRITE_CONFLICT: i32 = 112;

/// Storage for computed shares, one record per user and expense.
#[async_trait]
pub trait ExpenseShareRepository: Send + Sync {
    async fn find_by_id(&self, id: ShareId) -> Result<Option<ExpenseShare>>;

    /// Shares of one expense, ordered by participant position.
    async fn find_by_expense(&self, expense_id: ExpenseId) -> Result<Vec<ExpenseShare>>;

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<ExpenseShare>>;

    async fn find_all(&self) -> Result<Vec<ExpenseShare>>;

    async fn save_all(&self, shares: &[ExpenseShare]) -> Result<()>;

    /// Returns how many shares were removed.
    async fn delete_by_expense(&self, expense_id: ExpenseId) -> Result<u64>;

    /// Stores the first share set of an expense. Fails with
    /// [`Error::Conflict`] if the expense already has shares, including when
    /// another writer gets there first.
    async fn insert_for_expense(
        &self,
        expense_id: ExpenseId,
        shares: &[ExpenseShare],
    ) -> Result<()>;

    /// Swaps the share set of an expense in one step: either the new set is
    /// stored or the old one is left untouched. Returns how many shares were
    /// replaced.
    async fn replace_for_expense(
        &self,
        expense_id: ExpenseId,
        shares: &[ExpenseShare],
    ) -> Result<u64>;
}

/// MongoDB-backed shares. The atomic set operations run in transactions, so
/// the server has to be a replica set or a sharded cluster.
pub struct MongoShareRepository {
    client: Client,
    shares: Collection<ExpenseShare>,
}

impl MongoShareRepository {
    pub fn new(client: &Client, config: &Config) -> Self {
        let shares = client
            .database(&config.database)
            .collection(&config.collection);
        MongoShareRepository {
            client: client.clone(),
            shares,
        }
    }

    pub async fn connect(config: &Config) -> Result<Self> {
        let client = Client::with_uri_str(config.require_mongodb_uri()?).await?;
        let repository = Self::new(&client, config);
        repository.ensure_indexes().await?;
        Ok(repository)
    }

    /// A user holds at most one share per expense.
    pub async fn ensure_indexes(&self) -> Result<()> {
        let unique_share = IndexModel::builder()
            .keys(doc! { "expense_id": 1, "user_id": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.shares.create_index(unique_share, None).await?;
        Ok(())
    }

    async fn find_many(&self, filter: bson::Document) -> Result<Vec<ExpenseShare>> {
        let options = FindOptions::builder()
            .sort(doc! { "expense_id": 1, "position": 1 })
            .build();
        let cursor = self.shares.find(filter, options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn insert_in(
        &self,
        session: &mut ClientSession,
        expense_id: ExpenseId,
        shares: &[ExpenseShare],
    ) -> Result<()> {
        let existing = self
            .shares
            .count_documents_with_session(doc! { "expense_id": expense_id }, None, session)
            .await?;
        if existing > 0 {
            return Err(already_recorded(expense_id));
        }
        if !shares.is_empty() {
            self.shares
                .insert_many_with_session(shares, None, session)
                .await?;
        }
        Ok(())
    }

    async fn replace_in(
        &self,
        session: &mut ClientSession,
        expense_id: ExpenseId,
        shares: &[ExpenseShare],
    ) -> Result<u64> {
        let removed = self
            .shares
            .delete_many_with_session(doc! { "expense_id": expense_id }, None, session)
            .await?
            .deleted_count;
        if !shares.is_empty() {
            self.shares
                .insert_many_with_session(shares, None, session)
                .await?;
        }
        Ok(removed)
    }
}

#[async_trait]
impl ExpenseShareRepository for MongoShareRepository {
    async fn find_by_id(&self, id: ShareId) -> Result<Option<ExpenseShare>> {
        Ok(self.shares.find_one(doc! { "_id": id }, None).await?)
    }

    async fn find_by_expense(&self, expense_id: ExpenseId) -> Result<Vec<ExpenseShare>> {
        self.find_many(doc! { "expense_id": expense_id }).await
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<ExpenseShare>> {
        self.find_many(doc! { "user_id": user_id }).await
    }

    async fn find_all(&self) -> Result<Vec<ExpenseShare>> {
        self.find_many(doc! {}).await
    }

    async fn save_all(&self, shares: &[ExpenseShare]) -> Result<()> {
        if shares.is_empty() {
            return Ok(());
        }
        let result = self.shares.insert_many(shares, None).await?;
        debug!(inserted = result.inserted_ids.len(), "shares inserted");
        Ok(())
    }

    async fn delete_by_expense(&self, expense_id: ExpenseId) -> Result<u64> {
        let result = self
            .shares
            .delete_many(doc! { "expense_id": expense_id }, None)
            .await?;
        Ok(result.deleted_count)
    }

    async fn insert_for_expense(
        &self,
        expense_id: ExpenseId,
        shares: &[ExpenseShare],
    ) -> Result<()> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;
        match self.insert_in(&mut session, expense_id, shares).await {
            Ok(()) => commit(&mut session, expense_id).await,
            Err(err) => {
                abort(&mut session).await;
                Err(into_conflict(err, expense_id))
            }
        }
    }

    async fn replace_for_expense(
        &self,
        expense_id: ExpenseId,
        shares: &[ExpenseShare],
    ) -> Result<u64> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;
        match self.replace_in(&mut session, expense_id, shares).await {
            Ok(removed) => {
                commit(&mut session, expense_id).await?;
                Ok(removed)
            }
            Err(err) => {
                abort(&mut session).await;
                Err(into_conflict(err, expense_id))
            }
        }
    }
}

async fn commit(session: &mut ClientSession, expense_id: ExpenseId) -> Result<()> {
    session
        .commit_transaction()
        .await
        .map_err(|err| into_conflict(Error::from(err), expense_id))
}

async fn abort(session: &mut ClientSession) {
    if let Err(err) = session.abort_transaction().await {
        warn!(%err, "failed to abort share transaction");
    }
}

fn already_recorded(expense_id: ExpenseId) -> Error {
    Error::Conflict(format!("expense {expense_id} already has shares, recompute them instead"))
}

// Concurrent writers on the same expense surface as duplicate keys or
// transaction write conflicts.
fn into_conflict(err: Error, expense_id: ExpenseId) -> Error {
    if matches!(&err, Error::Storage(storage) if is_write_clash(storage)) {
        Error::Conflict(format!("shares of expense {expense_id} were written concurrently"))
    } else {
        err
    }
}

fn is_write_clash(err: &mongodb::error::Error) -> bool {
    let clash = |code: i32| code == DUPLICATE_KEY || code == WRITE_CONFLICT;
    match err.kind.as_ref() {
        ErrorKind::BulkWrite(failure) => failure
            .write_errors
            .iter()
            .flatten()
            .any(|write_error| clash(write_error.code)),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => clash(write_error.code),
        ErrorKind::Command(command_error) => clash(command_error.code),
        _ => false,
    }
}

#[derive(Default)]
pub struct InMemoryShareRepository {
    shares: RwLock<Vec<ExpenseShare>>,
    limit: Option<usize>,
}

impl InMemoryShareRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that refuses writes leaving it with more than `limit` shares.
    pub fn with_limit(limit: usize) -> Self {
        InMemoryShareRepository {
            shares: RwLock::default(),
            limit: Some(limit),
        }
    }

    fn check_limit(&self, len: usize) -> Result<()> {
        match self.limit {
            Some(limit) if len > limit => Err(Error::StoreFull(limit)),
            _ => Ok(()),
        }
    }

    async fn filtered(&self, keep: impl Fn(&ExpenseShare) -> bool) -> Vec<ExpenseShare> {
        self.shares
            .read()
            .await
            .iter()
            .filter(|share| keep(share))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ExpenseShareRepository for InMemoryShareRepository {
    async fn find_by_id(&self, id: ShareId) -> Result<Option<ExpenseShare>> {
        Ok(self.filtered(|share| share.id == id).await.into_iter().next())
    }

    async fn find_by_expense(&self, expense_id: ExpenseId) -> Result<Vec<ExpenseShare>> {
        let mut shares = self.filtered(|share| share.expense_id == expense_id).await;
        shares.sort_by_key(|share| share.position);
        Ok(shares)
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<ExpenseShare>> {
        Ok(self.filtered(|share| share.user_id == user_id).await)
    }

    async fn find_all(&self) -> Result<Vec<ExpenseShare>> {
        Ok(self.shares.read().await.clone())
    }

    async fn save_all(&self, shares: &[ExpenseShare]) -> Result<()> {
        let mut stored = self.shares.write().await;
        self.check_limit(stored.len() + shares.len())?;
        stored.extend_from_slice(shares);
        Ok(())
    }

    async fn delete_by_expense(&self, expense_id: ExpenseId) -> Result<u64> {
        let mut shares = self.shares.write().await;
        let before = shares.len();
        shares.retain(|share| share.expense_id != expense_id);
        Ok((before - shares.len()) as u64)
    }

    async fn insert_for_expense(
        &self,
        expense_id: ExpenseId,
        shares: &[ExpenseShare],
    ) -> Result<()> {
        let mut stored = self.shares.write().await;
        if stored.iter().any(|share| share.expense_id == expense_id) {
            return Err(already_recorded(expense_id));
        }
        self.check_limit(stored.len() + shares.len())?;
        stored.extend_from_slice(shares);
        Ok(())
    }

    async fn replace_for_expense(
        &self,
        expense_id: ExpenseId,
        shares: &[ExpenseShare],
    ) -> Result<u64> {
        let mut stored = self.shares.write().await;
        let mut replaced: Vec<ExpenseShare> = stored
            .iter()
            .filter(|share| share.expense_id != expense_id)
            .cloned()
            .collect();
        let removed = (stored.len() - replaced.len()) as u64;
        replaced.extend_from_slice(shares);
        self.check_limit(replaced.len())?;
        *stored = replaced;
        Ok(removed)
    }
}
