use async_trait::async_trait;
use domain::Identity;
use std::sync::atomic::{AtomicU64, Ordering};

/// Supplies the acting user. `None` means nobody is signed in.
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<Identity>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(Option<Identity>);

impl StaticIdentity {
    pub fn signed_in(identity: Identity) -> Self {
        Self(Some(identity))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<Identity> {
        self.0.clone()
    }
}

#[derive(Debug, Clone)]
pub struct PendingFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum Attachment {
    Url(String),
    File(PendingFile),
}

/// Turns a file into a URL. The engine records the URL and never looks at
/// the bytes.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, file: &PendingFile) -> anyhow::Result<String>;
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    uploaded: AtomicU64,
}

impl MemoryBlobStore {
    pub fn uploaded(&self) -> u64 {
        self.uploaded.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, file: &PendingFile) -> anyhow::Result<String> {
        let n = self.uploaded.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("memory://blobs/{}/{}", n, file.name))
    }
}
