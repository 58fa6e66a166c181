use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::Date;

use super::repo_types::{Account, Role};
use crate::storage::SourceHandle;

/// Raw field set from the presentation layer. Nothing is validated yet;
/// `None` and `Some("")` mean the same thing.
#[derive(Default, Clone)]
pub struct AccountForm {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub middle_name: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

impl AccountForm {
    /// Builds a form from key/value pairs; unknown keys are ignored.
    pub fn from_map(mut map: HashMap<String, String>) -> Self {
        Self {
            first_name: map.remove("first_name"),
            last_name: map.remove("last_name"),
            middle_name: map.remove("middle_name"),
            gender: map.remove("gender"),
            birth_date: map.remove("birth_date"),
            email: map.remove("email"),
            phone: map.remove("phone"),
            password: map.remove("password"),
            role: map.remove("role"),
        }
    }
}

impl std::fmt::Debug for AccountForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountForm")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("middle_name", &self.middle_name)
            .field("gender", &self.gender)
            .field("birth_date", &self.birth_date)
            .field("email", &self.email)
            .field("phone", &self.phone)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("role", &self.role)
            .finish()
    }
}

/// Request body for login.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Ok,
    NoFile,
    OtherError,
}

/// A client-submitted file transfer attempt.
#[derive(Debug, Clone)]
pub struct UploadDescriptor {
    pub present: bool,
    pub status: TransferStatus,
    pub mime_type: String,
    pub source: SourceHandle,
}

impl UploadDescriptor {
    /// No file part was sent at all.
    pub fn absent() -> Self {
        Self {
            present: false,
            status: TransferStatus::NoFile,
            mime_type: String::new(),
            source: SourceHandle::empty(),
        }
    }

    pub fn received(mime_type: impl Into<String>, source: SourceHandle) -> Self {
        Self {
            present: true,
            status: TransferStatus::Ok,
            mime_type: mime_type.into(),
            source,
        }
    }

    pub fn failed(status: TransferStatus) -> Self {
        Self {
            present: true,
            status,
            ..Self::absent()
        }
    }
}

/// Lookup key for `view`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountKey {
    Id(i64),
    Email(String),
}

impl AccountKey {
    /// Digits are an id, anything else an email.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<i64>() {
            Ok(id) => AccountKey::Id(id),
            Err(_) => AccountKey::Email(normalize_email(raw)),
        }
    }
}

/// Emails are stored trimmed and lower-cased and looked up the same way.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Public part of an account; never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountProjection {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: Option<String>,
    pub gender: String,
    #[serde(with = "date_only::option")]
    pub birth_date: Option<Date>,
    pub email: String,
    pub phone: Option<String>,
    pub avatar_path: Option<String>,
    pub role: Role,
}

impl AccountProjection {
    pub fn from_account(a: &Account) -> Option<Self> {
        Some(Self {
            id: a.id?,
            first_name: a.first_name.clone(),
            last_name: a.last_name.clone(),
            middle_name: a.middle_name.clone(),
            gender: a.gender.clone(),
            birth_date: a.birth_date.map(|d| d.date()),
            email: a.email.clone(),
            phone: a.phone.clone(),
            avatar_path: a.avatar_path.clone(),
            role: a.role,
        })
    }
}

time::serde::format_description!(date_only, Date, "[year]-[month]-[day]");
