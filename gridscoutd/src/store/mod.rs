//! Durable key/blob persistence behind the grid.
//!
//! The grid writes whole collections through a [`BlobStore`] on every
//! mutation, so implementations must make `set` durable before returning.

pub mod db;
pub mod hash;

use std::collections::HashMap;
use std::sync::Mutex;
use anyhow::{anyhow, Result};

pub use db::SqliteBlobStore;

pub trait BlobStore: Send + 'static {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;
}

/// Process-local store, for tests and throwaway runs
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let blobs = self.blobs.lock().map_err(|_| anyhow!("blob map poisoned"))?;
        Ok(blobs.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut blobs = self.blobs.lock().map_err(|_| anyhow!("blob map poisoned"))?;
        blobs.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

impl<S: BlobStore + Sync> BlobStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        (**self).set(key, value)
    }
}

/// Blob key holding a tenant's ordered sighting list
pub fn sightings_key(tenant_id: &str) -> String {
    format!("sightings:{}", tenant_id)
}

/// Blob key holding a tenant's local report history
pub fn local_reports_key(tenant_id: &str) -> String {
    format!("local_reports:{}", tenant_id)
}

/// Blob key holding the standing icon ids a tenant's scouts have reported
pub fn standing_icons_key(tenant_id: &str) -> String {
    format!("standing_icons:{}", tenant_id)
}
