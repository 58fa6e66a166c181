use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;
use tracing::debug;

use crate::config::S3Config;

/// Where the content of an uploaded file currently lives.
#[derive(Debug, Clone)]
pub enum SourceHandle {
    Bytes(Bytes),
    TempFile(PathBuf),
}

impl SourceHandle {
    pub fn empty() -> Self {
        SourceHandle::Bytes(Bytes::new())
    }

    async fn into_bytes(self) -> anyhow::Result<Bytes> {
        match self {
            SourceHandle::Bytes(b) => Ok(b),
            SourceHandle::TempFile(path) => {
                let data = tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("read upload {}", path.display()))?;
                remove_if_exists(&path).await?;
                Ok(Bytes::from(data))
            }
        }
    }
}

/// Stores and removes avatar blobs by relative path.
///
/// `delete` must succeed when the path does not exist, so a retried
/// cleanup never fails.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn move_to(
        &self,
        source: SourceHandle,
        destination: &str,
        content_type: &str,
    ) -> anyhow::Result<()>;
    async fn delete(&self, path: &str) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3BlobStore {
    pub async fn new(cfg: &S3Config) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(Credentials::new(
                &cfg.access_key,
                &cfg.secret_key,
                None,
                None,
                "static",
            ))
            .endpoint_url(&cfg.endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&cfg.endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
            prefix: cfg.prefix.clone(),
        })
    }

    fn key(&self, path: &str) -> String {
        format!("{}{}", self.prefix, path)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn move_to(
        &self,
        source: SourceHandle,
        destination: &str,
        content_type: &str,
    ) -> anyhow::Result<()> {
        let key = self.key(destination);
        let body = source.into_bytes().await?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .with_context(|| format!("s3 put_object {}", key))?;
        debug!(%key, %content_type, "avatar stored in s3");
        Ok(())
    }

    // S3 answers 204 for missing keys, so this is already idempotent.
    async fn delete(&self, path: &str) -> anyhow::Result<()> {
        let key = self.key(path);
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .with_context(|| format!("s3 delete_object {}", key))?;
        Ok(())
    }
}

/// Keeps avatars as plain files under one directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub async fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("create avatar dir {}", root.display()))?;
        Ok(Self { root })
    }

    fn resolve(&self, path: &str) -> anyhow::Result<PathBuf> {
        let rel = Path::new(path);
        anyhow::ensure!(
            rel.components().count() == 1 && rel.file_name().is_some(),
            "blob path {path:?} must be a bare file name"
        );
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    // the file extension already carries the type
    async fn move_to(
        &self,
        source: SourceHandle,
        destination: &str,
        _content_type: &str,
    ) -> anyhow::Result<()> {
        let target = self.resolve(destination)?;
        match source {
            SourceHandle::Bytes(body) => {
                tokio::fs::write(&target, &body)
                    .await
                    .with_context(|| format!("write {}", target.display()))?;
            }
            SourceHandle::TempFile(path) => {
                // rename fails across filesystems; fall back to copy + unlink
                if tokio::fs::rename(&path, &target).await.is_err() {
                    tokio::fs::copy(&path, &target)
                        .await
                        .with_context(|| format!("copy {} -> {}", path.display(), target.display()))?;
                    remove_if_exists(&path).await?;
                }
            }
        }
        debug!(path = %target.display(), "avatar stored on disk");
        Ok(())
    }

    async fn delete(&self, path: &str) -> anyhow::Result<()> {
        let target = self.resolve(path)?;
        remove_if_exists(&target).await
    }
}

async fn remove_if_exists(path: &Path) -> anyhow::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
    }
}
