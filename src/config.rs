use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    pub salt: String,
    pub memory_kib: u32,
    pub iterations: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub prefix: String,
}

/// Where avatar images end up.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum BlobConfig {
    Fs { root: String },
    S3(S3Config),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub password: PasswordConfig,
    pub blob: BlobConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let password = PasswordConfig {
            salt: std::env::var("PASSWORD_SALT").context("PASSWORD_SALT is not set")?,
            memory_kib: env_parse("PASSWORD_MEMORY_KIB").unwrap_or(argon2::Params::DEFAULT_M_COST),
            iterations: env_parse("PASSWORD_ITERATIONS").unwrap_or(argon2::Params::DEFAULT_T_COST),
        };

        let backend = std::env::var("BLOB_BACKEND").unwrap_or_else(|_| "fs".into());
        let blob = match backend.as_str() {
            "fs" => BlobConfig::Fs {
                root: std::env::var("AVATAR_DIR").unwrap_or_else(|_| "./uploads/avatar".into()),
            },
            "s3" => BlobConfig::S3(S3Config {
                endpoint: std::env::var("S3_ENDPOINT").context("S3_ENDPOINT is not set")?,
                bucket: std::env::var("S3_BUCKET").context("S3_BUCKET is not set")?,
                access_key: std::env::var("S3_ACCESS_KEY").context("S3_ACCESS_KEY is not set")?,
                secret_key: std::env::var("S3_SECRET_KEY").context("S3_SECRET_KEY is not set")?,
                region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
                prefix: std::env::var("S3_PREFIX").unwrap_or_default(),
            }),
            other => anyhow::bail!("unknown BLOB_BACKEND {other:?}, expected \"fs\" or \"s3\""),
        };

        Ok(Self {
            database_url,
            password,
            blob,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
