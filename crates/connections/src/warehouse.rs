//! The `WarehouseClient` trait — the contract every warehouse backend must fulfil.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::object_store::StoreCredentials;
use crate::WarehouseError;

/// Shape of the records being bulk-loaded from object storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordFormat {
    /// Newline-delimited JSON, optionally with a jsonpaths manifest that
    /// maps document fields onto table columns.
    Json {
        #[serde(default)]
        jsonpaths: Option<String>,
    },
    /// Delimited text records.
    Csv {
        #[serde(default = "default_delimiter")]
        delimiter: char,
    },
}

fn default_delimiter() -> char {
    ','
}

impl Default for RecordFormat {
    fn default() -> Self {
        Self::Json { jsonpaths: None }
    }
}

/// A resolved bulk-load source: the object keys that matched a (rendered)
/// prefix, plus the record shape they carry.
///
/// Built by the staging operator after listing the store, so the warehouse
/// never needs to re-discover the source.
#[derive(Debug, Clone)]
pub struct StageManifest {
    pub bucket: String,
    pub prefix: String,
    pub objects: Vec<String>,
    pub format: RecordFormat,
}

impl StageManifest {
    /// Location string used in statements and log lines.
    pub fn location(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix)
    }
}

/// The core warehouse trait.
///
/// Operators talk to the warehouse exclusively through this interface; the
/// registry hands out `Arc<dyn WarehouseClient>` so any number of tasks can
/// share one connection pool.
#[async_trait]
pub trait WarehouseClient: Send + Sync {
    /// Run a DDL statement. Definitions are expected to be idempotent
    /// (`CREATE TABLE IF NOT EXISTS …`), so re-running is a no-op.
    async fn run_ddl(&self, ddl: &str) -> Result<(), WarehouseError>;

    /// Append the result of `select` into `table`. Returns rows inserted.
    async fn insert_from_select(&self, table: &str, select: &str) -> Result<u64, WarehouseError>;

    /// Empty `table` completely, following dependent relations.
    async fn truncate_table(&self, table: &str) -> Result<(), WarehouseError>;

    /// Bulk-copy the manifest's objects into `table`. Returns rows loaded.
    async fn copy_from_object_store(
        &self,
        table: &str,
        manifest: &StageManifest,
        credentials: &StoreCredentials,
    ) -> Result<u64, WarehouseError>;

    /// Total row count of `table`.
    async fn count_rows(&self, table: &str) -> Result<i64, WarehouseError>;

    /// Number of NULLs in `table.column`.
    async fn count_nulls(&self, table: &str, column: &str) -> Result<i64, WarehouseError>;
}
