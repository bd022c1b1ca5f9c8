//! Idempotent bulk loading
//!
//! `insert_many` skips the load entirely when the target table already holds
//! rows, so seeding can run on every start-up.

use crate::error::{FlowError, FlowResult};
use crate::storage::value::{Record, ScalarValue};
use crate::storage::{Store, StoreConnection};
use tracing::info;

/// Creates `table` with the given columns unless it exists.
pub fn create_table(store: &dyn Store, table: &str, columns: &[&str]) -> FlowResult<()> {
    let ddl = format!(
        "CREATE TABLE IF NOT EXISTS {table} ({})",
        columns
            .iter()
            .map(|c| format!("{c} TEXT"))
            .collect::<Vec<_>>()
            .join(", ")
    );
    let mut conn = store.connect()?;
    let result = conn.execute(&ddl, &[]).and_then(|_| conn.commit());
    conn.close()?;
    result
}

/// Inserts `records` into `table` in one transaction.
///
/// Returns the number of rows inserted, `0` when the table was already
/// populated. Every record must carry the same columns as the first one.
pub fn insert_many(store: &dyn Store, table: &str, records: &[Record]) -> FlowResult<usize> {
    let mut conn = store.connect()?;
    let result = load(conn.as_mut(), table, records);
    let result = match result {
        Ok(n) => conn.commit().map(|_| n),
        Err(e) => {
            conn.rollback()?;
            Err(e)
        }
    };
    conn.close()?;
    result
}

fn load(conn: &mut dyn StoreConnection, table: &str, records: &[Record]) -> FlowResult<usize> {
    conn.execute(&format!("SELECT COUNT(*) FROM {table}"), &[])?;
    let existing = conn
        .fetch_one()?
        .and_then(|row| row.value(0).and_then(ScalarValue::as_i64))
        .unwrap_or(0);
    if existing > 0 {
        info!(table, existing, "seed skipped, table already populated");
        return Ok(0);
    }

    let Some(first) = records.first() else {
        return Ok(0);
    };
    let columns = first.columns();
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        columns.join(", "),
        vec!["?"; columns.len()].join(", ")
    );
    for record in records {
        if record.columns() != columns {
            return Err(FlowError::ConstraintViolation(format!(
                "seed record columns {:?} differ from {:?}",
                record.columns(),
                columns
            )));
        }
        conn.execute(&sql, record.values())?;
    }
    info!(table, rows = records.len(), "seed loaded");
    Ok(records.len())
}
