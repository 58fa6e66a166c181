//! In-process `AccountRepository` used by the unit tests.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    error::{RepoError, UniqueField},
    repo::{AccountRepository, RepoResult},
    repo_types::Account,
};

#[derive(Default)]
struct Table {
    next_id: i64,
    rows: Vec<Account>,
}

impl Table {
    fn check_unique(&self, candidate: &Account) -> RepoResult<()> {
        for row in self.rows.iter().filter(|r| r.id != candidate.id) {
            if row.email == candidate.email {
                return Err(RepoError::Duplicate(UniqueField::Email));
            }
            if candidate.phone.is_some() && row.phone == candidate.phone {
                return Err(RepoError::Duplicate(UniqueField::Phone));
            }
        }
        Ok(())
    }
}

/// Keeps rows in insertion order and enforces the same unique constraints
/// as the migration. `fail_updates` makes every `update` fail.
#[derive(Default)]
pub struct InMemoryAccountRepository {
    table: RwLock<Table>,
    pub fail_updates: AtomicBool,
}

impl InMemoryAccountRepository {
    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn find_by_id(&self, id: i64) -> RepoResult<Option<Account>> {
        let table = self.table.read().await;
        Ok(table.rows.iter().find(|r| r.id == Some(id)).cloned())
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<Option<Account>> {
        let table = self.table.read().await;
        Ok(table.rows.iter().find(|r| r.email == email).cloned())
    }

    async fn find_by_phone(&self, phone: &str) -> RepoResult<Option<Account>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .iter()
            .find(|r| r.phone.as_deref() == Some(phone))
            .cloned())
    }

    async fn insert(&self, account: &Account) -> RepoResult<i64> {
        let mut table = self.table.write().await;
        let mut row = account.clone();
        row.id = None;
        table.check_unique(&row)?;
        table.next_id += 1;
        let id = table.next_id;
        row.id = Some(id);
        table.rows.push(row);
        Ok(id)
    }

    async fn update(&self, account: &Account) -> RepoResult<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("connection reset").into());
        }
        let mut table = self.table.write().await;
        let id = account.id.ok_or_else(|| anyhow::anyhow!("account has no id"))?;
        table.check_unique(account)?;
        let slot = table
            .rows
            .iter_mut()
            .find(|r| r.id == Some(id))
            .ok_or(RepoError::Missing(id))?;
        *slot = account.clone();
        Ok(())
    }

    async fn delete(&self, id: i64) -> RepoResult<()> {
        let mut table = self.table.write().await;
        let before = table.rows.len();
        table.rows.retain(|r| r.id != Some(id));
        if table.rows.len() == before {
            return Err(RepoError::Missing(id));
        }
        Ok(())
    }

    async fn list_all(&self) -> RepoResult<Vec<Account>> {
        Ok(self.table.read().await.rows.clone())
    }
}
