use crate::accounts::{
    avatar::AvatarIngester,
    password::PasswordAuthenticator,
    repo::{AccountRepository, PgAccountRepository},
    services::AccountService,
};
use crate::config::{AppConfig, BlobConfig, PasswordConfig};
use crate::storage::{BlobStore, FsBlobStore, S3BlobStore};
use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// `None` when the repository is not Postgres-backed.
    pub db: Option<PgPool>,
    pub accounts: Arc<AccountService>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let storage: Arc<dyn BlobStore> = match &config.blob {
            BlobConfig::Fs { root } => Arc::new(FsBlobStore::new(root).await?),
            BlobConfig::S3(s3) => Arc::new(S3BlobStore::new(s3).await?),
        };
        let repo: Arc<dyn AccountRepository> = Arc::new(PgAccountRepository::new(db.clone()));

        Self::from_parts(Some(db), &config.password, repo, storage)
    }

    pub fn from_parts(
        db: Option<PgPool>,
        password: &PasswordConfig,
        repo: Arc<dyn AccountRepository>,
        storage: Arc<dyn BlobStore>,
    ) -> anyhow::Result<Self> {
        let passwords = PasswordAuthenticator::new(repo.clone(), password)?;
        let accounts = Arc::new(AccountService::new(
            repo,
            passwords,
            AvatarIngester::new(storage),
        ));
        Ok(Self { db, accounts })
    }

    /// State backed by in-memory collaborators; no database, no disk.
    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::accounts::memory::InMemoryAccountRepository;
        use crate::storage::memory::MemoryBlobStore;

        Self::from_parts(
            None,
            &crate::accounts::password::test_config(),
            Arc::new(InMemoryAccountRepository::default()),
            Arc::new(MemoryBlobStore::default()),
        )
        .expect("fake state builds")
    }
}
