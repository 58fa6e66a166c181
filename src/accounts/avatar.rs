use std::sync::Arc;

use tracing::{debug, warn};

use super::{
    dto::{TransferStatus, UploadDescriptor},
    error::{AccountError, AccountResult},
};
use crate::storage::BlobStore;

/// What an ingestion did to the avatar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvatarChange {
    Keep,
    Stored(String),
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    let essence = ct.split(';').next().unwrap_or_default().trim();
    match essence.to_ascii_lowercase().as_str() {
        "image/png" => Some("png"),
        "image/jpeg" => Some("jpeg"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

/// Relative blob path for an account's avatar.
pub fn avatar_path(account_id: i64, ext: &str) -> String {
    format!("avatar{}.{}", account_id, ext)
}

pub struct AvatarIngester {
    store: Arc<dyn BlobStore>,
}

impl AvatarIngester {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    pub async fn ingest(
        &self,
        account_id: i64,
        upload: UploadDescriptor,
    ) -> AccountResult<AvatarChange> {
        if !upload.present {
            return Ok(AvatarChange::Keep);
        }
        match upload.status {
            TransferStatus::NoFile => return Ok(AvatarChange::Keep),
            TransferStatus::OtherError => {
                warn!(account_id, "avatar transfer failed upstream; keeping current avatar");
                return Ok(AvatarChange::Keep);
            }
            TransferStatus::Ok => {}
        }

        let Some(ext) = ext_from_mime(&upload.mime_type) else {
            return Err(AccountError::UnsupportedMediaType {
                mime_type: upload.mime_type,
                account_id,
            });
        };

        let path = avatar_path(account_id, ext);
        let content_type = format!("image/{ext}");
        self.store
            .move_to(upload.source, &path, &content_type)
            .await
            .map_err(|source| AccountError::Storage { source, account_id })?;

        debug!(account_id, %path, "avatar ingested");
        Ok(AvatarChange::Stored(path))
    }

    /// Best-effort removal; failures are logged and swallowed.
    pub async fn discard(&self, path: &str) {
        if let Err(e) = self.store.delete(path).await {
            warn!(error = %e, %path, "avatar blob left behind");
        }
    }
}
