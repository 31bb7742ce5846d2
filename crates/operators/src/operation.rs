//! The closed set of built-in operations and their dispatch.

use connections::{StageManifest, WarehouseClient};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::ExecutionContext;
use crate::path::render_prefix;
use crate::OperatorError;

pub use connections::RecordFormat;

/// Idempotently ensure a relation exists per the supplied DDL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTable {
    /// Registry name of the warehouse connection.
    pub warehouse: String,
    /// Target relation, for logging only — the DDL names it authoritatively.
    pub table: String,
    /// `CREATE TABLE IF NOT EXISTS …` text.
    pub ddl: String,
}

/// Bulk-load object-store data into a staging relation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageToWarehouse {
    pub warehouse: String,
    /// Registry name of the object store holding the source.
    pub object_store: String,
    pub table: String,
    pub bucket: String,
    /// Source prefix; supports `{ds}`/`{year}`/`{month}`/`{day}`/`{hour}`
    /// placeholders rendered against the run's execution date.
    pub prefix: String,
    #[serde(default)]
    pub format: RecordFormat,
}

/// Append-only insert-from-select into a fact relation.
///
/// Running the same select twice appends its rows twice.  That is by design:
/// fact loads are incremental, and dedup belongs in the select logic, not in
/// the loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadFact {
    pub warehouse: String,
    pub table: String,
    pub select: String,
}

/// Insert-from-select into a dimension relation, optionally full-refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadDimension {
    pub warehouse: String,
    pub table: String,
    pub select: String,
    /// When set, the target is emptied immediately before inserting,
    /// giving truncate-then-reload semantics instead of append.
    #[serde(default)]
    pub truncate_table: bool,
}

/// One quality assertion against one relation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityCheck {
    pub table: String,
    /// A column that must contain no NULLs, if given.
    #[serde(default)]
    pub not_null: Option<String>,
}

/// Assert that a set of relations is non-empty (and NULL-free where asked).
///
/// Every check runs even after one fails, so a single run surfaces every
/// broken relation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataQualityCheck {
    pub warehouse: String,
    pub checks: Vec<QualityCheck>,
}

/// A unit of warehouse work, dispatched by variant tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    CreateTable(CreateTable),
    StageToWarehouse(StageToWarehouse),
    LoadFact(LoadFact),
    LoadDimension(LoadDimension),
    DataQualityCheck(DataQualityCheck),
    /// Graph sentinel (begin/end markers); succeeds immediately.
    NoOp,
}

impl Operation {
    /// Variant tag, for logging and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateTable(_) => "create_table",
            Self::StageToWarehouse(_) => "stage_to_warehouse",
            Self::LoadFact(_) => "load_fact",
            Self::LoadDimension(_) => "load_dimension",
            Self::DataQualityCheck(_) => "data_quality_check",
            Self::NoOp => "no_op",
        }
    }

    /// Execute the operation against the run's resources.
    pub async fn execute(&self, ctx: &ExecutionContext) -> Result<(), OperatorError> {
        match self {
            Self::CreateTable(op) => op.run(ctx).await,
            Self::StageToWarehouse(op) => op.run(ctx).await,
            Self::LoadFact(op) => op.run(ctx).await,
            Self::LoadDimension(op) => op.run(ctx).await,
            Self::DataQualityCheck(op) => op.run(ctx).await,
            Self::NoOp => Ok(()),
        }
    }
}

impl CreateTable {
    async fn run(&self, ctx: &ExecutionContext) -> Result<(), OperatorError> {
        let warehouse = ctx.resources.warehouse(&self.warehouse)?;
        warehouse.run_ddl(&self.ddl).await?;
        info!("ensured relation '{}' exists", self.table);
        Ok(())
    }
}

impl StageToWarehouse {
    async fn run(&self, ctx: &ExecutionContext) -> Result<(), OperatorError> {
        let warehouse = ctx.resources.warehouse(&self.warehouse)?;
        let store = ctx.resources.object_store(&self.object_store)?;

        let prefix = render_prefix(&self.prefix, &ctx.execution_date);
        let objects = store.list(&self.bucket, &prefix).await?;
        if objects.is_empty() {
            return Err(OperatorError::SourceNotFound(format!(
                "s3://{}/{}",
                self.bucket, prefix
            )));
        }

        let manifest = StageManifest {
            bucket: self.bucket.clone(),
            prefix,
            objects,
            format: self.format.clone(),
        };
        let loaded = warehouse
            .copy_from_object_store(&self.table, &manifest, store.credentials())
            .await?;
        info!(
            "staged {} rows from {} into '{}'",
            loaded,
            manifest.location(),
            self.table
        );
        Ok(())
    }
}

impl LoadFact {
    async fn run(&self, ctx: &ExecutionContext) -> Result<(), OperatorError> {
        let warehouse = ctx.resources.warehouse(&self.warehouse)?;
        let inserted = warehouse
            .insert_from_select(&self.table, &self.select)
            .await?;
        info!("appended {} rows into fact '{}'", inserted, self.table);
        Ok(())
    }
}

impl LoadDimension {
    async fn run(&self, ctx: &ExecutionContext) -> Result<(), OperatorError> {
        let warehouse = ctx.resources.warehouse(&self.warehouse)?;
        if self.truncate_table {
            warehouse.truncate_table(&self.table).await?;
            info!("truncated dimension '{}' for full refresh", self.table);
        }
        let inserted = warehouse
            .insert_from_select(&self.table, &self.select)
            .await?;
        info!("loaded {} rows into dimension '{}'", inserted, self.table);
        Ok(())
    }
}

impl DataQualityCheck {
    async fn run(&self, ctx: &ExecutionContext) -> Result<(), OperatorError> {
        let warehouse = ctx.resources.warehouse(&self.warehouse)?;

        let mut failures = Vec::new();
        for check in &self.checks {
            self.run_check(warehouse.as_ref(), check, &mut failures)
                .await?;
        }

        if failures.is_empty() {
            info!("all {} quality checks passed", self.checks.len());
            Ok(())
        } else {
            Err(OperatorError::DataQuality(failures.join("; ")))
        }
    }

    async fn run_check(
        &self,
        warehouse: &dyn WarehouseClient,
        check: &QualityCheck,
        failures: &mut Vec<String>,
    ) -> Result<(), OperatorError> {
        let rows = warehouse.count_rows(&check.table).await?;
        if rows == 0 {
            failures.push(format!("relation '{}' contains no rows", check.table));
            return Ok(());
        }
        if let Some(column) = &check.not_null {
            let nulls = warehouse.count_nulls(&check.table, column).await?;
            if nulls > 0 {
                failures.push(format!(
                    "relation '{}' has {} NULLs in required column '{}'",
                    check.table, nulls, column
                ));
            }
        }
        Ok(())
    }
}
