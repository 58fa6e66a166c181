use thiserror::Error;

/// Field that carries a uniqueness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Email,
    Phone,
}

impl std::fmt::Display for UniqueField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            UniqueField::Email => "email",
            UniqueField::Phone => "phone",
        })
    }
}

/// Failures reported by an `AccountRepository`.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("duplicate {0}")]
    Duplicate(UniqueField),

    #[error("account {0} does not exist")]
    Missing(i64),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Everything an account operation can report to the presentation layer.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("invalid {field}: {message}")]
    InvalidInput {
        field: &'static str,
        message: String,
    },

    #[error("an account with this {0} already exists")]
    Conflict(UniqueField),

    #[error("account not found")]
    NotFound,

    #[error("invalid credentials")]
    AuthenticationFailed,

    #[error("unsupported avatar type {mime_type:?}")]
    UnsupportedMediaType { mime_type: String, account_id: i64 },

    #[error("avatar storage failed: {source}")]
    Storage {
        #[source]
        source: anyhow::Error,
        account_id: i64,
    },

    #[error("avatar for account {account_id} was stored but not linked: {source}")]
    AvatarNotLinked {
        #[source]
        source: anyhow::Error,
        account_id: i64,
    },

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AccountError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            message: message.into(),
        }
    }

    pub fn missing(field: &'static str) -> Self {
        Self::invalid(field, "is required")
    }

    /// Account the failed avatar belongs to, when the row already exists.
    pub fn account_id(&self) -> Option<i64> {
        match self {
            Self::UnsupportedMediaType { account_id, .. }
            | Self::Storage { account_id, .. }
            | Self::AvatarNotLinked { account_id, .. } => Some(*account_id),
            _ => None,
        }
    }
}

impl From<RepoError> for AccountError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::Duplicate(field) => AccountError::Conflict(field),
            RepoError::Missing(_) => AccountError::NotFound,
            RepoError::Other(e) => AccountError::Internal(e),
        }
    }
}

pub type AccountResult<T> = Result<T, AccountError>;
