//! Deployment resource configuration.
//!
//! A resources file maps registry names to connection material: warehouse
//! URLs and object-store credentials plus their key inventory.  Pipeline
//! definitions reference these names only; swapping a deployment means
//! swapping this file, not the pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use connections::{PostgresWarehouse, ResourceRegistry, StaticStore, StoreCredentials};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct WarehouseConfig {
    /// Postgres/Redshift connection URL.
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize)]
pub struct ObjectStoreConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Bucket → known keys. Staging operators list against this inventory.
    #[serde(default)]
    pub inventory: HashMap<String, Vec<String>>,
}

/// Top-level resources file.
#[derive(Debug, Default, Deserialize)]
pub struct ResourcesConfig {
    #[serde(default)]
    pub warehouses: HashMap<String, WarehouseConfig>,
    #[serde(default)]
    pub object_stores: HashMap<String, ObjectStoreConfig>,
}

impl ResourcesConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Connect every configured resource and freeze the registry.
    pub async fn build_registry(self) -> anyhow::Result<ResourceRegistry> {
        let mut builder = ResourceRegistry::builder();
        for (name, cfg) in self.warehouses {
            let warehouse = PostgresWarehouse::connect(&cfg.url, cfg.max_connections)
                .await
                .with_context(|| format!("cannot connect warehouse '{name}'"))?;
            builder = builder.warehouse(name, Arc::new(warehouse));
        }
        for (name, cfg) in self.object_stores {
            let store = StaticStore::with_inventory(
                StoreCredentials {
                    access_key_id: cfg.access_key_id,
                    secret_access_key: cfg.secret_access_key,
                },
                cfg.inventory,
            );
            builder = builder.object_store(name, Arc::new(store));
        }
        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_resources_file() {
        let cfg = ResourcesConfig::from_json(
            r#"{
                "warehouses": {
                    "redshift": { "url": "postgres://localhost/dw", "max_connections": 8 }
                },
                "object_stores": {
                    "aws_credentials": {
                        "access_key_id": "AKIATEST",
                        "secret_access_key": "secret",
                        "inventory": { "data-lake": ["log_data/events.json"] }
                    }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.warehouses["redshift"].max_connections, 8);
        assert_eq!(
            cfg.object_stores["aws_credentials"].inventory["data-lake"],
            vec!["log_data/events.json"]
        );
    }

    #[test]
    fn max_connections_defaults_when_omitted() {
        let cfg = ResourcesConfig::from_json(
            r#"{ "warehouses": { "dw": { "url": "postgres://localhost/dw" } } }"#,
        )
        .unwrap();
        assert_eq!(cfg.warehouses["dw"].max_connections, 5);
    }

    #[tokio::test]
    async fn empty_config_builds_an_empty_registry() {
        let registry = ResourcesConfig::default().build_registry().await.unwrap();
        assert!(registry.is_empty());
    }
}
