//! Object-store side of the registry: credentials and prefix listing.
//!
//! The bulk-copy protocol itself is warehouse-side (the warehouse pulls from
//! the store); all the orchestrator needs from the store is credential
//! material for the copy statement and a listing to detect empty sources.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// Credential pair handed to the warehouse's copy statement.
///
/// Opaque to the core — nothing in the engine interprets these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Listing + credential access for one named object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Keys under `prefix` in `bucket`. An empty result means the source
    /// does not exist for this run.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Credentials for warehouse-side copy statements.
    fn credentials(&self) -> &StoreCredentials;
}

/// An object store backed by a fixed inventory of keys per bucket.
///
/// Used by tests and by the CLI's resource config, where the deployment
/// supplies the inventory up front instead of a live listing endpoint.
/// A live store plugs in through the [`ObjectStore`] trait.
pub struct StaticStore {
    credentials: StoreCredentials,
    buckets: Mutex<HashMap<String, Vec<String>>>,
}

impl StaticStore {
    pub fn new(credentials: StoreCredentials) -> Self {
        Self {
            credentials,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Build a store from a bucket → keys inventory map.
    pub fn with_inventory(
        credentials: StoreCredentials,
        inventory: HashMap<String, Vec<String>>,
    ) -> Self {
        Self {
            credentials,
            buckets: Mutex::new(inventory),
        }
    }

    /// Add a single key to a bucket's inventory.
    pub fn put_object(&self, bucket: impl Into<String>, key: impl Into<String>) {
        self.buckets
            .lock()
            .unwrap()
            .entry(bucket.into())
            .or_default()
            .push(key.into());
    }
}

#[async_trait]
impl ObjectStore for StaticStore {
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let buckets = self.buckets.lock().unwrap();
        let keys = match buckets.get(bucket) {
            Some(keys) => keys
                .iter()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        Ok(keys)
    }

    fn credentials(&self) -> &StoreCredentials {
        &self.credentials
    }
}
