//! Postgres-backed warehouse client.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::object_store::StoreCredentials;
use crate::warehouse::{RecordFormat, StageManifest, WarehouseClient};
use crate::WarehouseError;

/// A warehouse connection backed by a shared sqlx Postgres pool.
///
/// Also speaks to Redshift, which is why bulk loads are issued as a
/// warehouse-side `COPY … FROM` statement rather than streamed through
/// this process.
pub struct PostgresWarehouse {
    pool: PgPool,
}

impl PostgresWarehouse {
    /// Connect a new pool to `database_url`.
    ///
    /// `max_connections` controls the pool ceiling; one pool is shared by
    /// every task that resolves this registry entry.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, WarehouseError> {
        info!("Connecting to warehouse (max_connections={})", max_connections);
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| WarehouseError::Query(format!("cannot connect: {e}")))?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn render_copy(
        table: &str,
        manifest: &StageManifest,
        credentials: &StoreCredentials,
    ) -> String {
        let format_clause = match &manifest.format {
            RecordFormat::Json { jsonpaths } => match jsonpaths {
                Some(paths) => format!("FORMAT AS JSON '{paths}'"),
                None => "FORMAT AS JSON 'auto'".to_string(),
            },
            RecordFormat::Csv { delimiter } => format!("FORMAT AS CSV DELIMITER '{delimiter}'"),
        };

        format!(
            "COPY {table}\nFROM '{location}'\nACCESS_KEY_ID '{key}'\nSECRET_ACCESS_KEY '{secret}'\n{format_clause}",
            location = manifest.location(),
            key = credentials.access_key_id,
            secret = credentials.secret_access_key,
        )
    }
}

#[async_trait]
impl WarehouseClient for PostgresWarehouse {
    async fn run_ddl(&self, ddl: &str) -> Result<(), WarehouseError> {
        debug!("running DDL");
        sqlx::query(ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| WarehouseError::Schema(e.to_string()))?;
        Ok(())
    }

    async fn insert_from_select(&self, table: &str, select: &str) -> Result<u64, WarehouseError> {
        let statement = format!("INSERT INTO {table}\n{select}");
        let result = sqlx::query(&statement)
            .execute(&self.pool)
            .await
            .map_err(|e| WarehouseError::Query(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn truncate_table(&self, table: &str) -> Result<(), WarehouseError> {
        sqlx::query(&format!("TRUNCATE TABLE {table} CASCADE"))
            .execute(&self.pool)
            .await
            .map_err(|e| WarehouseError::Query(e.to_string()))?;
        Ok(())
    }

    async fn copy_from_object_store(
        &self,
        table: &str,
        manifest: &StageManifest,
        credentials: &StoreCredentials,
    ) -> Result<u64, WarehouseError> {
        let statement = Self::render_copy(table, manifest, credentials);
        debug!("copying {} objects from {}", manifest.objects.len(), manifest.location());
        let result = sqlx::query(&statement)
            .execute(&self.pool)
            .await
            .map_err(|e| WarehouseError::Load(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn count_rows(&self, table: &str) -> Result<i64, WarehouseError> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| WarehouseError::Query(e.to_string()))?;
        Ok(count)
    }

    async fn count_nulls(&self, table: &str, column: &str) -> Result<i64, WarehouseError> {
        let count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table} WHERE {column} IS NULL"))
                .fetch_one(&self.pool)
                .await
                .map_err(|e| WarehouseError::Query(e.to_string()))?;
        Ok(count)
    }
}
