use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::{
    avatar::{AvatarChange, AvatarIngester},
    dto::{normalize_email, AccountForm, AccountKey, AccountProjection, UploadDescriptor},
    error::{AccountError, AccountResult},
    password::PasswordAuthenticator,
    repo::AccountRepository,
    repo_types::Account,
    validator::AccountValidator,
};

/// Public contract of the account core. Every operation is a plain sequence
/// of awaited repository and blob-store calls; nothing is spawned.
pub struct AccountService {
    repo: Arc<dyn AccountRepository>,
    validator: AccountValidator,
    passwords: PasswordAuthenticator,
    avatars: AvatarIngester,
}

fn project(account: &Account) -> AccountResult<AccountProjection> {
    AccountProjection::from_account(account)
        .ok_or_else(|| anyhow::anyhow!("repository returned an account without id").into())
}

impl AccountService {
    pub fn new(
        repo: Arc<dyn AccountRepository>,
        passwords: PasswordAuthenticator,
        avatars: AvatarIngester,
    ) -> Self {
        Self {
            validator: AccountValidator::new(repo.clone()),
            repo,
            passwords,
            avatars,
        }
    }

    /// Validates, stores the bare account to obtain an id, then attaches the
    /// avatar. An avatar failure is returned even though the row exists; the
    /// error carries the id so the caller can retry with `attach_avatar`.
    #[instrument(skip(self, form, upload), fields(email = ?form.email))]
    pub async fn register(&self, form: AccountForm, upload: UploadDescriptor) -> AccountResult<i64> {
        let fields = self.validator.validate_for_create(&form).await?;
        let password_hash = self.passwords.hash(&fields.password)?;

        let p = fields.profile;
        let mut account = Account {
            id: None,
            first_name: p.first_name,
            last_name: p.last_name,
            middle_name: p.middle_name,
            gender: p.gender,
            birth_date: p.birth_date,
            email: p.email,
            phone: p.phone,
            avatar_path: None,
            password_hash,
            role: fields.role,
        };

        let id = self.repo.insert(&account).await?;
        account.id = Some(id);
        info!(account_id = id, role = %account.role, "account registered");

        match self.avatars.ingest(id, upload).await {
            Ok(AvatarChange::Keep) => {}
            Ok(AvatarChange::Stored(path)) => {
                account.avatar_path = Some(path.clone());
                if let Err(e) = self.repo.update(&account).await {
                    warn!(account_id = id, error = %e, "avatar stored but not linked");
                    self.avatars.discard(&path).await;
                    return Err(AccountError::AvatarNotLinked {
                        source: e.into(),
                        account_id: id,
                    });
                }
            }
            Err(e) => {
                warn!(account_id = id, error = %e, "account stored without avatar");
                return Err(e);
            }
        }
        Ok(id)
    }

    pub async fn authenticate(&self, email: &str, password: &str) -> AccountResult<Account> {
        self.passwords.authenticate(email, password).await
    }

    pub async fn view(&self, key: &AccountKey) -> AccountResult<AccountProjection> {
        let found = match key {
            AccountKey::Id(id) => self.repo.find_by_id(*id).await?,
            AccountKey::Email(email) => self.repo.find_by_email(&normalize_email(email)).await?,
        };
        let account = found.ok_or(AccountError::NotFound)?;
        project(&account)
    }

    /// Full overwrite of the mutable fields. Without a new file the current
    /// avatar path is kept.
    #[instrument(skip(self, form, upload))]
    pub async fn update(
        &self,
        id: i64,
        form: AccountForm,
        upload: UploadDescriptor,
    ) -> AccountResult<Account> {
        let fields = self.validator.validate_for_update(id, &form).await?;
        let mut account = fields.current;

        if let AvatarChange::Stored(path) = self.avatars.ingest(id, upload).await? {
            account.avatar_path = Some(path);
        }

        let p = fields.profile;
        account.first_name = p.first_name;
        account.last_name = p.last_name;
        account.middle_name = p.middle_name;
        account.gender = p.gender;
        account.birth_date = p.birth_date;
        account.email = p.email;
        account.phone = p.phone;
        if let Some(role) = fields.role {
            account.role = role;
        }
        if let Some(password) = fields.password {
            account.password_hash = self.passwords.hash(&password)?;
        }

        self.repo.update(&account).await?;
        info!(account_id = id, "account updated");
        Ok(account)
    }

    /// Second phase of registration on its own; safe to repeat.
    #[instrument(skip(self, upload))]
    pub async fn attach_avatar(
        &self,
        id: i64,
        upload: UploadDescriptor,
    ) -> AccountResult<AccountProjection> {
        let mut account = self.load(id).await?;
        if let AvatarChange::Stored(path) = self.avatars.ingest(id, upload).await? {
            account.avatar_path = Some(path);
            self.repo.update(&account).await?;
        }
        project(&account)
    }

    /// Removes the row, then the avatar blob. A blob failure does not bring
    /// the row back.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> AccountResult<()> {
        let account = self.load(id).await?;
        self.repo.delete(id).await?;
        if let Some(path) = account.avatar_path.as_deref() {
            self.avatars.discard(path).await;
        }
        info!(account_id = id, "account deleted");
        Ok(())
    }

    pub async fn list_all(&self) -> AccountResult<Vec<AccountProjection>> {
        self.repo.list_all().await?.iter().map(project).collect()
    }

    async fn load(&self, id: i64) -> AccountResult<Account> {
        self.repo.find_by_id(id).await?.ok_or(AccountError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use bytes::Bytes;
    use time::macros::{date, datetime};

    use super::*;
    use crate::accounts::{
        error::UniqueField, memory::InMemoryAccountRepository, password::test_config,
        repo_types::Role,
    };
    use crate::storage::{memory::MemoryBlobStore, SourceHandle};

    struct Fixture {
        repo: Arc<InMemoryAccountRepository>,
        store: Arc<MemoryBlobStore>,
        svc: AccountService,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(InMemoryAccountRepository::default());
        let store = Arc::new(MemoryBlobStore::default());
        let passwords = PasswordAuthenticator::new(repo.clone(), &test_config()).unwrap();
        let svc = AccountService::new(repo.clone(), passwords, AvatarIngester::new(store.clone()));
        Fixture { repo, store, svc }
    }

    fn ann() -> AccountForm {
        AccountForm {
            first_name: Some("Ann".into()),
            last_name: Some("Lee".into()),
            gender: Some("female".into()),
            birth_date: Some("1990-02-28".into()),
            email: Some("ann@example.com".into()),
            password: Some("correct-horse".into()),
            role: Some("1".into()),
            ..AccountForm::default()
        }
    }

    fn upload(mime: &str) -> UploadDescriptor {
        UploadDescriptor::received(mime, SourceHandle::Bytes(Bytes::from_static(b"img")))
    }

    #[tokio::test]
    async fn register_without_avatar() {
        let f = fixture();
        let id = f.svc.register(ann(), UploadDescriptor::absent()).await.unwrap();

        let view = f.svc.view(&AccountKey::Id(id)).await.unwrap();
        assert_eq!(view.avatar_path, None);
        assert_eq!(view.role, Role::Member);
        assert_eq!(view.birth_date, Some(date!(1990 - 02 - 28)));

        let stored = f.repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.birth_date, Some(datetime!(1990-02-28 0:00)));
        assert_ne!(stored.password_hash, "correct-horse");
    }

    #[tokio::test]
    async fn register_with_avatar_attaches_path() {
        let f = fixture();
        let id = f.svc.register(ann(), upload("image/png")).await.unwrap();
        let view = f.svc.view(&AccountKey::Email("ann@example.com".into())).await.unwrap();
        assert_eq!(view.avatar_path, Some(format!("avatar{id}.png")));
        assert_eq!(
            f.store.content_type(&format!("avatar{id}.png")).await.as_deref(),
            Some("image/png")
        );
    }

    #[tokio::test]
    async fn register_duplicate_email_creates_nothing() {
        let f = fixture();
        f.svc.register(ann(), UploadDescriptor::absent()).await.unwrap();
        let err = f.svc.register(ann(), UploadDescriptor::absent()).await.unwrap_err();
        assert!(matches!(err, AccountError::Conflict(UniqueField::Email)));
        assert_eq!(f.repo.len().await, 1);
    }

    #[tokio::test]
    async fn register_bad_date_creates_nothing() {
        let f = fixture();
        let mut form = ann();
        form.birth_date = Some("not-a-date".into());
        let err = f.svc.register(form, upload("image/png")).await.unwrap_err();
        assert!(matches!(err, AccountError::InvalidInput { field: "birth_date", .. }));
        assert_eq!(f.repo.len().await, 0);
        assert!(f.store.blobs.lock().await.is_empty());
    }

    #[tokio::test]
    async fn register_with_pdf_fails_but_keeps_row() {
        let f = fixture();
        let err = f.svc.register(ann(), upload("application/pdf")).await.unwrap_err();
        let id = err.account_id().expect("row id reported");
        assert!(matches!(err, AccountError::UnsupportedMediaType { .. }));

        // partially committed: the bare row exists and can be completed later
        let view = f.svc.view(&AccountKey::Id(id)).await.unwrap();
        assert_eq!(view.avatar_path, None);

        let view = f.svc.attach_avatar(id, upload("image/gif")).await.unwrap();
        assert_eq!(view.avatar_path, Some(format!("avatar{id}.gif")));
        let again = f.svc.attach_avatar(id, upload("image/gif")).await.unwrap();
        assert_eq!(again, view);
    }

    #[tokio::test]
    async fn register_storage_failure_is_reported() {
        let f = fixture();
        f.store.fail_moves.store(true, Ordering::SeqCst);
        let err = f.svc.register(ann(), upload("image/jpeg")).await.unwrap_err();
        assert!(matches!(err, AccountError::Storage { .. }));
        assert_eq!(f.repo.len().await, 1);
    }

    #[tokio::test]
    async fn authenticate_round_trip() {
        let f = fixture();
        let id = f.svc.register(ann(), UploadDescriptor::absent()).await.unwrap();
        let account = f.svc.authenticate("ann@example.com", "correct-horse").await.unwrap();
        assert_eq!(account.id, Some(id));

        assert!(matches!(
            f.svc.authenticate("ann@example.com", "wrong").await,
            Err(AccountError::AuthenticationFailed)
        ));
        assert!(matches!(
            f.svc.authenticate("nobody@example.com", "correct-horse").await,
            Err(AccountError::AuthenticationFailed)
        ));
    }

    #[tokio::test]
    async fn update_overwrites_fields_and_keeps_avatar() {
        let f = fixture();
        let id = f.svc.register(ann(), upload("image/png")).await.unwrap();

        let mut form = ann();
        form.first_name = Some("Annie".into());
        form.middle_name = Some("Mae".into());
        form.phone = Some("555-0100".into());
        form.password = None;
        form.role = Some("admin".into());
        let updated = f.svc.update(id, form, UploadDescriptor::absent()).await.unwrap();

        assert_eq!(updated.first_name, "Annie");
        assert_eq!(updated.middle_name.as_deref(), Some("Mae"));
        assert_eq!(updated.phone.as_deref(), Some("555-0100"));
        assert_eq!(updated.role, Role::Admin);
        assert_eq!(updated.avatar_path, Some(format!("avatar{id}.png")));
        // password untouched
        f.svc.authenticate("ann@example.com", "correct-horse").await.unwrap();
    }

    #[tokio::test]
    async fn update_can_change_password_and_avatar() {
        let f = fixture();
        let id = f.svc.register(ann(), UploadDescriptor::absent()).await.unwrap();
        let mut form = ann();
        form.password = Some("new-secret".into());
        let updated = f.svc.update(id, form, upload("image/jpeg")).await.unwrap();

        assert_eq!(updated.avatar_path, Some(format!("avatar{id}.jpeg")));
        f.svc.authenticate("ann@example.com", "new-secret").await.unwrap();
        assert!(f.svc.authenticate("ann@example.com", "correct-horse").await.is_err());
    }

    #[tokio::test]
    async fn update_with_bad_date_leaves_account_unchanged() {
        let f = fixture();
        let id = f.svc.register(ann(), UploadDescriptor::absent()).await.unwrap();
        let before = f.repo.find_by_id(id).await.unwrap().unwrap();

        let mut form = ann();
        form.first_name = Some("Changed".into());
        form.birth_date = Some("bad".into());
        let err = f.svc.update(id, form, UploadDescriptor::absent()).await.unwrap_err();
        assert!(matches!(err, AccountError::InvalidInput { .. }));

        let after = f.repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn update_unknown_account_is_not_found() {
        let f = fixture();
        let err = f.svc.update(42, ann(), UploadDescriptor::absent()).await.unwrap_err();
        assert!(matches!(err, AccountError::NotFound));
    }

    #[tokio::test]
    async fn update_rejects_email_of_another_account() {
        let f = fixture();
        f.svc.register(ann(), UploadDescriptor::absent()).await.unwrap();
        let mut bob = ann();
        bob.email = Some("bob@example.com".into());
        let bob_id = f.svc.register(bob, UploadDescriptor::absent()).await.unwrap();

        let err = f.svc.update(bob_id, ann(), UploadDescriptor::absent()).await.unwrap_err();
        assert!(matches!(err, AccountError::Conflict(UniqueField::Email)));
    }

    #[tokio::test]
    async fn delete_removes_row_and_blob() {
        let f = fixture();
        let id = f.svc.register(ann(), upload("image/jpeg")).await.unwrap();
        let path = format!("avatar{id}.jpeg");
        assert!(f.store.contains(&path).await);

        f.svc.delete(id).await.unwrap();
        assert!(!f.store.contains(&path).await);
        assert!(matches!(f.svc.view(&AccountKey::Id(id)).await, Err(AccountError::NotFound)));
        assert!(matches!(f.svc.delete(id).await, Err(AccountError::NotFound)));
    }

    #[tokio::test]
    async fn view_matches_email_regardless_of_case() {
        let f = fixture();
        let mut form = ann();
        form.email = Some("Ann@Example.com".into());
        let id = f.svc.register(form, UploadDescriptor::absent()).await.unwrap();

        f.svc.authenticate(" ANN@example.COM ", "correct-horse").await.unwrap();
        let view = f
            .svc
            .view(&AccountKey::Email(" ANN@example.COM ".into()))
            .await
            .unwrap();
        assert_eq!(view.id, id);
        assert_eq!(view.email, "ann@example.com");
    }

    #[tokio::test]
    async fn delete_survives_blob_failure() {
        let f = fixture();
        let id = f.svc.register(ann(), upload("image/png")).await.unwrap();
        let path = format!("avatar{id}.png");
        f.store.fail_deletes.store(true, Ordering::SeqCst);

        f.svc.delete(id).await.unwrap();
        assert_eq!(f.repo.len().await, 0);
        assert!(f.store.contains(&path).await);
        assert!(matches!(f.svc.delete(id).await, Err(AccountError::NotFound)));
    }

    #[tokio::test]
    async fn register_reports_id_when_avatar_cannot_be_linked() {
        let f = fixture();
        f.repo.fail_updates.store(true, Ordering::SeqCst);
        let err = f.svc.register(ann(), upload("image/png")).await.unwrap_err();
        assert!(matches!(err, AccountError::AvatarNotLinked { .. }));
        let id = err.account_id().expect("row id reported");

        let view = f.svc.view(&AccountKey::Id(id)).await.unwrap();
        assert_eq!(view.avatar_path, None);
        assert!(!f.store.contains(&format!("avatar{id}.png")).await);

        f.repo.fail_updates.store(false, Ordering::SeqCst);
        let view = f.svc.attach_avatar(id, upload("image/png")).await.unwrap();
        assert_eq!(view.avatar_path, Some(format!("avatar{id}.png")));
    }

    #[tokio::test]
    async fn list_all_keeps_insertion_order_and_hides_hashes() {
        let f = fixture();
        let first = f.svc.register(ann(), UploadDescriptor::absent()).await.unwrap();
        let mut bob = ann();
        bob.email = Some("bob@example.com".into());
        let second = f.svc.register(bob, UploadDescriptor::absent()).await.unwrap();

        let all = f.svc.list_all().await.unwrap();
        let ids: Vec<i64> = all.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![first, second]);
        assert!(!serde_json::to_string(&all).unwrap().contains("argon2"));
    }
}
