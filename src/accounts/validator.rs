use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use time::{macros::format_description, Date, PrimitiveDateTime};

use super::{
    dto::{normalize_email, AccountForm},
    error::{AccountError, AccountResult, UniqueField},
    repo::AccountRepository,
    repo_types::{Account, Role},
};

/// Mutable profile fields after trimming, parsing and normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileFields {
    pub first_name: String,
    pub last_name: String,
    pub middle_name: Option<String>,
    pub gender: String,
    pub birth_date: Option<PrimitiveDateTime>,
    pub email: String,
    pub phone: Option<String>,
}

/// Output of `validate_for_create`.
pub struct NewAccountFields {
    pub profile: ProfileFields,
    pub password: String,
    pub role: Role,
}

/// Output of `validate_for_update`; `None` keeps the stored value.
pub struct UpdateFields {
    pub current: Account,
    pub profile: ProfileFields,
    pub password: Option<String>,
    pub role: Option<Role>,
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Parses `YYYY-MM-DD` and pins the time to midnight.
pub fn parse_birth_date(raw: &str) -> AccountResult<PrimitiveDateTime> {
    let fmt = format_description!("[year]-[month]-[day]");
    Date::parse(raw, &fmt)
        .map(|d| d.midnight())
        .map_err(|_| AccountError::invalid("birth_date", "expected a date as YYYY-MM-DD"))
}

/// Empty and whitespace-only input is the same as no input.
fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required(value: &Option<String>, field: &'static str) -> AccountResult<String> {
    optional(value).ok_or_else(|| AccountError::missing(field))
}

fn parse_role(raw: &str) -> AccountResult<Role> {
    raw.parse::<Role>()
        .map_err(|_| AccountError::invalid("role", "must be 0 (guest), 1 (member) or 2 (admin)"))
}

fn profile(form: &AccountForm) -> AccountResult<ProfileFields> {
    let first_name = required(&form.first_name, "first_name")?;
    let last_name = required(&form.last_name, "last_name")?;
    let gender = required(&form.gender, "gender")?;
    let email = normalize_email(&required(&form.email, "email")?);
    if !is_valid_email(&email) {
        return Err(AccountError::invalid("email", "is not a valid address"));
    }
    let birth_date = optional(&form.birth_date)
        .map(|raw| parse_birth_date(&raw))
        .transpose()?;

    Ok(ProfileFields {
        first_name,
        last_name,
        middle_name: optional(&form.middle_name),
        gender,
        birth_date,
        email,
        phone: optional(&form.phone),
    })
}

/// Field checks plus uniqueness lookups. Pure checks run first so malformed
/// input never reaches the repository.
pub struct AccountValidator {
    repo: Arc<dyn AccountRepository>,
}

impl AccountValidator {
    pub fn new(repo: Arc<dyn AccountRepository>) -> Self {
        Self { repo }
    }

    pub async fn validate_for_create(&self, form: &AccountForm) -> AccountResult<NewAccountFields> {
        let profile = profile(form)?;
        // presence is checked before parsing so a missing password is
        // reported as missing rather than invalid
        let password = form
            .password
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AccountError::missing("password"))?;
        let role = parse_role(&required(&form.role, "role")?)?;

        self.ensure_unique(&profile, None).await?;
        Ok(NewAccountFields {
            profile,
            password,
            role,
        })
    }

    pub async fn validate_for_update(
        &self,
        id: i64,
        form: &AccountForm,
    ) -> AccountResult<UpdateFields> {
        let current = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or(AccountError::NotFound)?;
        let profile = profile(form)?;
        let password = form.password.clone().filter(|p| !p.is_empty());
        let role = optional(&form.role).map(|r| parse_role(&r)).transpose()?;

        self.ensure_unique(&profile, Some(id)).await?;
        Ok(UpdateFields {
            current,
            profile,
            password,
            role,
        })
    }

    /// A holder with the same id as `owner` is not a conflict.
    async fn ensure_unique(&self, p: &ProfileFields, owner: Option<i64>) -> AccountResult<()> {
        if let Some(holder) = self.repo.find_by_email(&p.email).await? {
            if holder.id != owner {
                return Err(AccountError::Conflict(UniqueField::Email));
            }
        }
        if let Some(phone) = &p.phone {
            if let Some(holder) = self.repo.find_by_phone(phone).await? {
                if holder.id != owner {
                    return Err(AccountError::Conflict(UniqueField::Phone));
                }
            }
        }
        Ok(())
    }
}
