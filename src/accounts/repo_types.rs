use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sqlx::FromRow;
use time::PrimitiveDateTime;

/// Access level. The integer code is stable and is used both in the
/// database and on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Guest = 0,
    Member = 1,
    Admin = 2,
}

impl Role {
    pub fn code(self) -> i16 {
        self as i16
    }
}

impl TryFrom<i16> for Role {
    type Error = i16;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Role::Guest),
            1 => Ok(Role::Member),
            2 => Ok(Role::Admin),
            other => Err(other),
        }
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i16(self.code())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = i16::deserialize(deserializer)?;
        Role::try_from(code).map_err(|c| de::Error::custom(format!("unknown role code {c}")))
    }
}

/// Accepts the integer code or the role name.
impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "guest" => Ok(Role::Guest),
            "1" | "member" => Ok(Role::Member),
            "2" | "admin" => Ok(Role::Admin),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Guest => "guest",
            Role::Member => "member",
            Role::Admin => "admin",
        };
        f.write_str(name)
    }
}

/// Account record. `id` is `None` until the repository assigns one.
#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    pub id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: Option<String>,
    pub gender: String,
    pub birth_date: Option<PrimitiveDateTime>, // always at 00:00:00
    pub email: String,
    pub phone: Option<String>,
    pub avatar_path: Option<String>,
    pub password_hash: String,
    pub role: Role,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("middle_name", &self.middle_name)
            .field("gender", &self.gender)
            .field("birth_date", &self.birth_date)
            .field("email", &self.email)
            .field("phone", &self.phone)
            .field("avatar_path", &self.avatar_path)
            .field("password_hash", &"<redacted>")
            .field("role", &self.role)
            .finish()
    }
}

/// Row as stored in the `accounts` table.
#[derive(Debug, FromRow)]
pub struct AccountRow {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: Option<String>,
    pub gender: String,
    pub birth_date: Option<PrimitiveDateTime>,
    pub email: String,
    pub phone: Option<String>,
    pub avatar_path: Option<String>,
    pub password_hash: String,
    pub role: i16,
}

impl TryFrom<AccountRow> for Account {
    type Error = anyhow::Error;

    fn try_from(r: AccountRow) -> Result<Self, Self::Error> {
        let role = Role::try_from(r.role)
            .map_err(|code| anyhow::anyhow!("account {} has unknown role code {}", r.id, code))?;
        Ok(Self {
            id: Some(r.id),
            first_name: r.first_name,
            last_name: r.last_name,
            middle_name: r.middle_name,
            gender: r.gender,
            birth_date: r.birth_date,
            email: r.email,
            phone: r.phone,
            avatar_path: r.avatar_path,
            password_hash: r.password_hash,
            role,
        })
    }
}
