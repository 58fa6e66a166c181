use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;

use super::{
    error::{RepoError, UniqueField},
    repo_types::{Account, AccountRow},
};

pub type RepoResult<T> = Result<T, RepoError>;

/// Persistence of account records.
///
/// Implementations must enforce email and phone uniqueness themselves and
/// report a violation as `RepoError::Duplicate`; the service-level check is
/// only a fast path.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> RepoResult<Option<Account>>;
    async fn find_by_email(&self, email: &str) -> RepoResult<Option<Account>>;
    async fn find_by_phone(&self, phone: &str) -> RepoResult<Option<Account>>;
    /// Stores a new account and returns its id. `account.id` is ignored.
    async fn insert(&self, account: &Account) -> RepoResult<i64>;
    /// Overwrites every column of an existing account.
    async fn update(&self, account: &Account) -> RepoResult<()>;
    async fn delete(&self, id: i64) -> RepoResult<()>;
    /// All accounts, oldest first.
    async fn list_all(&self) -> RepoResult<Vec<Account>>;
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, first_name, last_name, middle_name, gender, birth_date,
           email, phone, avatar_path, password_hash, role
    FROM accounts
"#;

#[derive(Clone)]
pub struct PgAccountRepository {
    db: PgPool,
}

impl PgAccountRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn fetch_one_where(&self, clause: &str, value: &str) -> RepoResult<Option<Account>> {
        let sql = format!("{SELECT_COLUMNS} WHERE {clause}");
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await
            .with_context(|| format!("select account where {clause}"))?;
        Ok(row.map(Account::try_from).transpose()?)
    }
}

/// Maps a unique-constraint violation onto the field it protects.
fn classify(e: sqlx::Error, what: &'static str) -> RepoError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            match db.constraint() {
                Some("accounts_email_key") => return RepoError::Duplicate(UniqueField::Email),
                Some("accounts_phone_key") => return RepoError::Duplicate(UniqueField::Phone),
                _ => {}
            }
        }
    }
    RepoError::Other(anyhow::Error::new(e).context(what))
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn find_by_id(&self, id: i64) -> RepoResult<Option<Account>> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = $1");
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("select account by id")?;
        Ok(row.map(Account::try_from).transpose()?)
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<Option<Account>> {
        self.fetch_one_where("email = $1", email).await
    }

    async fn find_by_phone(&self, phone: &str) -> RepoResult<Option<Account>> {
        self.fetch_one_where("phone = $1", phone).await
    }

    async fn insert(&self, account: &Account) -> RepoResult<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO accounts (first_name, last_name, middle_name, gender, birth_date,
                                  email, phone, avatar_path, password_hash, role)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(&account.first_name)
        .bind(&account.last_name)
        .bind(&account.middle_name)
        .bind(&account.gender)
        .bind(account.birth_date)
        .bind(&account.email)
        .bind(&account.phone)
        .bind(&account.avatar_path)
        .bind(&account.password_hash)
        .bind(account.role.code())
        .fetch_one(&self.db)
        .await
        .map_err(|e| classify(e, "insert account"))?;
        Ok(id)
    }

    async fn update(&self, account: &Account) -> RepoResult<()> {
        let id = account
            .id
            .context("cannot update an account that has no id")?;
        let res = sqlx::query(
            r#"
            UPDATE accounts SET
                first_name = $2, last_name = $3, middle_name = $4, gender = $5,
                birth_date = $6, email = $7, phone = $8, avatar_path = $9,
                password_hash = $10, role = $11
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&account.first_name)
        .bind(&account.last_name)
        .bind(&account.middle_name)
        .bind(&account.gender)
        .bind(account.birth_date)
        .bind(&account.email)
        .bind(&account.phone)
        .bind(&account.avatar_path)
        .bind(&account.password_hash)
        .bind(account.role.code())
        .execute(&self.db)
        .await
        .map_err(|e| classify(e, "update account"))?;

        if res.rows_affected() == 0 {
            return Err(RepoError::Missing(id));
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> RepoResult<()> {
        let res = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete account")?;
        if res.rows_affected() == 0 {
            return Err(RepoError::Missing(id));
        }
        Ok(())
    }

    async fn list_all(&self) -> RepoResult<Vec<Account>> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY id ASC");
        let rows = sqlx::query_as::<_, AccountRow>(&sql)
            .fetch_all(&self.db)
            .await
            .context("list accounts")?;
        rows.into_iter()
            .map(|r| Account::try_from(r).map_err(RepoError::from))
            .collect()
    }
}
