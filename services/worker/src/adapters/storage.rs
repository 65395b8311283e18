//! services/worker/src/adapters/storage.rs
//!
//! Object storage adapters implementing the `ObjectStorage` port: a local
//! filesystem store with signed URLs, and an in-memory store.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use doomlearn_core::ports::{ObjectStorage, PortError, PortResult};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

//=========================================================================================
// Filesystem Storage
//=========================================================================================

/// Stores objects as files under a root directory.
#[derive(Clone)]
pub struct FsObjectStorage {
    root: PathBuf,
    public_base_url: String,
    signing_secret: String,
}

impl FsObjectStorage {
    pub fn new(
        root: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
        signing_secret: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
            signing_secret: signing_secret.into(),
        }
    }

    /// Resolves a key to a path inside the root, rejecting anything that could escape it.
    fn path_for(&self, key: &str) -> PortResult<PathBuf> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && !key.contains('\\')
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(PortError::Unexpected(format!("Invalid object key '{}'", key)));
        }
        Ok(self.root.join(relative))
    }

    /// HMAC-SHA256 over `key\nexpires`, hex encoded.
    fn signature(&self, key: &str, expires: i64) -> PortResult<String> {
        let mut mac = HmacSha256::new_from_slice(self.signing_secret.as_bytes())
            .map_err(|e| PortError::Unexpected(format!("Invalid signing secret: {}", e)))?;
        mac.update(format!("{}\n{}", key, expires).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

#[async_trait]
impl ObjectStorage for FsObjectStorage {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> PortResult<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PortError::Unexpected(e.to_string()))?;
        }
        debug!(key, content_type, bytes = data.len(), "Storing object");
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))
    }

    async fn get(&self, key: &str) -> PortResult<Bytes> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PortError::NotFound(format!("Object {} not found", key)))
            }
            Err(e) => Err(PortError::Unexpected(e.to_string())),
        }
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> PortResult<String> {
        self.path_for(key)?;
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        let signature = self.signature(key, expires)?;
        Ok(format!(
            "{}/{}?expires={}&signature={}",
            self.public_base_url.trim_end_matches('/'),
            key,
            expires,
            signature
        ))
    }
}

//=========================================================================================
// In-Memory Storage
//=========================================================================================

#[derive(Default)]
pub struct MemoryObjectStorage {
    objects: RwLock<HashMap<String, (Bytes, String)>>,
}

impl MemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects.read().await.get(key).map(|(_, ct)| ct.clone())
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> PortResult<()> {
        self.objects
            .write()
            .await
            .insert(key.to_string(), (data, content_type.to_string()));
        Ok(())
    }

    async fn get(&self, key: &str) -> PortResult<Bytes> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| PortError::NotFound(format!("Object {} not found", key)))
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> PortResult<String> {
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        Ok(format!("memory://{}?expires={}", key, expires))
    }
}
