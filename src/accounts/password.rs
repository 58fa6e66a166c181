use std::sync::Arc;

use anyhow::Context;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use tracing::{debug, error, warn};

use super::{
    dto::normalize_email,
    error::{AccountError, AccountResult},
    repo::AccountRepository,
    repo_types::Account,
};
use crate::config::PasswordConfig;

/// Argon2 with a fixed, configured salt: the same password always produces
/// the same digest.
pub struct PasswordAuthenticator {
    repo: Arc<dyn AccountRepository>,
    argon: Argon2<'static>,
    salt: SaltString,
}

impl PasswordAuthenticator {
    pub fn new(repo: Arc<dyn AccountRepository>, cfg: &PasswordConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(cfg.salt.len() >= 8, "password salt must be at least 8 bytes");
        let salt = SaltString::encode_b64(cfg.salt.as_bytes())
            .map_err(|e| anyhow::anyhow!("password salt rejected: {e}"))?;
        let params = Params::new(cfg.memory_kib, cfg.iterations, Params::DEFAULT_P_COST, None)
            .map_err(|e| anyhow::anyhow!("argon2 params rejected: {e}"))?;
        Ok(Self {
            repo,
            argon: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            salt,
        })
    }

    pub fn hash(&self, plain: &str) -> anyhow::Result<String> {
        let hash = self
            .argon
            .hash_password(plain.as_bytes(), &self.salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    /// Re-derives the digest with the parameters recorded in `stored` and
    /// compares the outputs in constant time.
    pub fn verify(&self, plain: &str, stored: &str) -> anyhow::Result<bool> {
        let parsed = PasswordHash::new(stored).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            anyhow::anyhow!(e.to_string())
        })?;
        Ok(self.argon.verify_password(plain.as_bytes(), &parsed).is_ok())
    }

    pub async fn authenticate(&self, email: &str, plain: &str) -> AccountResult<Account> {
        let email = normalize_email(email);
        let account = self
            .repo
            .find_by_email(&email)
            .await
            .context("find account by email")?;

        let Some(account) = account else {
            // keep the unknown-email path as expensive as a real check
            let _ = self.hash(plain);
            warn!("login with unknown email");
            return Err(AccountError::AuthenticationFailed);
        };

        if !self.verify(plain, &account.password_hash)? {
            warn!(account_id = ?account.id, "login with invalid password");
            return Err(AccountError::AuthenticationFailed);
        }

        debug!(account_id = ?account.id, "credentials accepted");
        Ok(account)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> PasswordConfig {
    PasswordConfig {
        salt: "unit-test-salt".into(),
        memory_kib: 1024,
        iterations: 1,
    }
}
