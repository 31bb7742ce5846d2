//! `MemoryWarehouse` — an in-process warehouse double.
//!
//! Useful in unit and integration tests where a real warehouse is either
//! unavailable or irrelevant.  Tracks per-table row counts, records every
//! operation it receives, and can be primed to fail a number of times —
//! which is how scheduler tests exercise retry behaviour.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::object_store::StoreCredentials;
use crate::warehouse::{StageManifest, WarehouseClient};
use crate::WarehouseError;

#[derive(Debug, Default, Clone)]
struct TableState {
    rows: u64,
    null_counts: HashMap<String, i64>,
}

/// In-memory warehouse with seeded behaviour and a call log.
#[derive(Default)]
pub struct MemoryWarehouse {
    tables: Mutex<HashMap<String, TableState>>,
    select_rows: Mutex<HashMap<String, u64>>,
    failures: Mutex<HashMap<String, (WarehouseError, u32)>>,
    latency: Mutex<Option<Duration>>,
    log: Mutex<Vec<String>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create a table with `rows` rows.
    pub fn seed_table(&self, table: impl Into<String>, rows: u64) {
        self.tables.lock().unwrap().insert(
            table.into(),
            TableState {
                rows,
                null_counts: HashMap::new(),
            },
        );
    }

    /// Declare how many rows the given select statement produces.
    /// Unseeded selects fail with a query error, standing in for malformed
    /// select logic or a missing source relation.
    pub fn seed_select(&self, select: impl Into<String>, rows: u64) {
        self.select_rows.lock().unwrap().insert(select.into(), rows);
    }

    /// Declare the NULL count for a column, for quality-check tests.
    pub fn seed_nulls(&self, table: &str, column: impl Into<String>, count: i64) {
        let mut tables = self.tables.lock().unwrap();
        tables
            .entry(table.to_owned())
            .or_default()
            .null_counts
            .insert(column.into(), count);
    }

    /// Make the next `times` operations against `table` fail with `error`.
    pub fn fail_times(&self, table: impl Into<String>, error: WarehouseError, times: u32) {
        self.failures
            .lock()
            .unwrap()
            .insert(table.into(), (error, times));
    }

    /// Give every subsequent operation a fixed execution time, so a test can
    /// cancel or race a run while an attempt is genuinely in flight.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    /// Current row count of a table, if it exists.
    pub fn rows(&self, table: &str) -> Option<u64> {
        self.tables.lock().unwrap().get(table).map(|t| t.rows)
    }

    /// Every operation received, in call order (e.g. `"insert:songplays"`).
    pub fn operations(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Whether any operation has touched `table`.
    pub fn touched(&self, table: &str) -> bool {
        let suffix = format!(":{table}");
        self.log
            .lock()
            .unwrap()
            .iter()
            .any(|op| op.ends_with(&suffix) || op.contains(&format!(":{table}.")))
    }

    fn take_failure(&self, table: &str) -> Option<WarehouseError> {
        let mut failures = self.failures.lock().unwrap();
        if let Some((error, remaining)) = failures.get_mut(table) {
            if *remaining > 0 {
                *remaining -= 1;
                return Some(error.clone());
            }
        }
        None
    }

    fn record(&self, op: &str, table: &str) {
        self.log.lock().unwrap().push(format!("{op}:{table}"));
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

/// Extract the target relation from `CREATE TABLE [IF NOT EXISTS] <name> …`.
fn table_from_ddl(ddl: &str) -> Option<String> {
    let mut words = ddl.split_whitespace();
    if !words.next()?.eq_ignore_ascii_case("create") {
        return None;
    }
    if !words.next()?.eq_ignore_ascii_case("table") {
        return None;
    }
    let mut next = words.next()?;
    if next.eq_ignore_ascii_case("if") {
        if !words.next()?.eq_ignore_ascii_case("not") {
            return None;
        }
        if !words.next()?.eq_ignore_ascii_case("exists") {
            return None;
        }
        next = words.next()?;
    }
    let name = next.split('(').next()?.trim();
    (!name.is_empty()).then(|| name.to_owned())
}

#[async_trait]
impl WarehouseClient for MemoryWarehouse {
    async fn run_ddl(&self, ddl: &str) -> Result<(), WarehouseError> {
        self.simulate_latency().await;
        let table = table_from_ddl(ddl).ok_or_else(|| {
            WarehouseError::Schema(format!("cannot determine target relation in DDL: {ddl}"))
        })?;
        if let Some(error) = self.take_failure(&table) {
            return Err(error);
        }
        self.record("create", &table);
        // CREATE TABLE IF NOT EXISTS semantics: existing state is kept.
        self.tables.lock().unwrap().entry(table).or_default();
        Ok(())
    }

    async fn insert_from_select(&self, table: &str, select: &str) -> Result<u64, WarehouseError> {
        self.simulate_latency().await;
        if let Some(error) = self.take_failure(table) {
            return Err(error);
        }
        let produced = self
            .select_rows
            .lock()
            .unwrap()
            .get(select)
            .copied()
            .ok_or_else(|| WarehouseError::Query(format!("cannot plan select: {select}")))?;
        self.record("insert", table);
        let mut tables = self.tables.lock().unwrap();
        tables.entry(table.to_owned()).or_default().rows += produced;
        Ok(produced)
    }

    async fn truncate_table(&self, table: &str) -> Result<(), WarehouseError> {
        self.simulate_latency().await;
        if let Some(error) = self.take_failure(table) {
            return Err(error);
        }
        self.record("truncate", table);
        let mut tables = self.tables.lock().unwrap();
        let state = tables
            .get_mut(table)
            .ok_or_else(|| WarehouseError::Query(format!("relation {table} does not exist")))?;
        state.rows = 0;
        state.null_counts.clear();
        Ok(())
    }

    async fn copy_from_object_store(
        &self,
        table: &str,
        manifest: &StageManifest,
        _credentials: &StoreCredentials,
    ) -> Result<u64, WarehouseError> {
        self.simulate_latency().await;
        if let Some(error) = self.take_failure(table) {
            return Err(error);
        }
        self.record("copy", table);
        let loaded = manifest.objects.len() as u64;
        let mut tables = self.tables.lock().unwrap();
        tables.entry(table.to_owned()).or_default().rows += loaded;
        Ok(loaded)
    }

    async fn count_rows(&self, table: &str) -> Result<i64, WarehouseError> {
        self.simulate_latency().await;
        if let Some(error) = self.take_failure(table) {
            return Err(error);
        }
        self.record("count", table);
        let tables = self.tables.lock().unwrap();
        tables
            .get(table)
            .map(|t| t.rows as i64)
            .ok_or_else(|| WarehouseError::Query(format!("relation {table} does not exist")))
    }

    async fn count_nulls(&self, table: &str, column: &str) -> Result<i64, WarehouseError> {
        self.simulate_latency().await;
        if let Some(error) = self.take_failure(table) {
            return Err(error);
        }
        self.log
            .lock()
            .unwrap()
            .push(format!("count_nulls:{table}.{column}"));
        let tables = self.tables.lock().unwrap();
        let state = tables
            .get(table)
            .ok_or_else(|| WarehouseError::Query(format!("relation {table} does not exist")))?;
        Ok(state.null_counts.get(column).copied().unwrap_or(0))
    }
}
