//! In-memory reference store
//!
//! 트랜잭션 내 쓰기는 연결 로컬 테이블 사본에 반영되고, `commit()` 시
//! 공유 테이블에 원자적으로 재적용됩니다. 다른 연결은 커밋 전의 쓰기를
//! 볼 수 없습니다 (read-your-writes only).
//!
//! Table rows are `Arc`-shared, so an open cursor holds a cheap snapshot and
//! walks it lazily; writers copy on write.

use crate::error::{FlowError, FlowResult};
use crate::storage::sql::{self, Expr, Projection, RowContext, SortKey, StorePlan};
use crate::storage::value::{Record, ScalarValue};
use crate::storage::{Executed, Store, StoreConnection};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info};

type Row = Vec<ScalarValue>;

#[derive(Debug, Clone)]
struct Table {
    columns: Arc<[String]>,
    rows: Arc<Vec<Row>>,
}

impl Table {
    fn new(columns: Vec<String>) -> Self {
        Self {
            columns: columns.into(),
            rows: Arc::new(Vec::new()),
        }
    }

    fn column_index(&self, table: &str, column: &str) -> FlowResult<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| FlowError::ColumnNotFound {
                table: table.to_string(),
                column: column.to_string(),
            })
    }
}

/// Injection points for [`MemoryStore::fail_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Connect,
    Execute,
    Fetch,
    Commit,
    Rollback,
}

/// Snapshot of the store's operation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub connects: u64,
    pub closes: u64,
    pub executes: u64,
    /// `fetch_one` / `fetch_many` / `fetch_all` calls
    pub fetches: u64,
    pub rows_fetched: u64,
    pub commits: u64,
    pub rollbacks: u64,
}

impl StoreStats {
    /// Connections opened and not yet closed.
    pub fn open_connections(&self) -> u64 {
        self.connects.saturating_sub(self.closes)
    }
}

#[derive(Default)]
struct Counters {
    connects: AtomicU64,
    closes: AtomicU64,
    executes: AtomicU64,
    fetches: AtomicU64,
    rows_fetched: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
}

#[derive(Default)]
struct Shared {
    tables: RwLock<HashMap<String, Table>>,
    counters: Counters,
    faults: Mutex<HashMap<FaultPoint, usize>>,
    unreachable: AtomicBool,
}

impl Shared {
    fn trip(&self, point: FaultPoint) -> bool {
        let mut faults = self.faults.lock();
        if let Some(n) = faults.get_mut(&point)
            && *n > 0
        {
            *n -= 1;
            return true;
        }
        false
    }
}

/// In-process row store speaking the SQL subset in [`crate::storage::sql`].
///
/// Cloning is cheap; clones share tables, counters and fault settings.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> StoreStats {
        let c = &self.shared.counters;
        let closes = c.closes.load(Ordering::Acquire);
        StoreStats {
            connects: c.connects.load(Ordering::Acquire),
            closes,
            executes: c.executes.load(Ordering::Relaxed),
            fetches: c.fetches.load(Ordering::Relaxed),
            rows_fetched: c.rows_fetched.load(Ordering::Relaxed),
            commits: c.commits.load(Ordering::Relaxed),
            rollbacks: c.rollbacks.load(Ordering::Relaxed),
        }
    }

    /// Makes every following `connect()` fail until reset.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.shared.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Fails the next `times` operations at `point`.
    pub fn fail_next(&self, point: FaultPoint, times: usize) {
        *self.shared.faults.lock().entry(point).or_insert(0) += times;
    }

    /// Committed row count of `table`.
    pub fn table_len(&self, table: &str) -> Option<usize> {
        self.shared.tables.read().get(table).map(|t| t.rows.len())
    }
}

impl Store for MemoryStore {
    fn connect(&self) -> FlowResult<Box<dyn StoreConnection>> {
        if self.shared.unreachable.load(Ordering::SeqCst) || self.shared.trip(FaultPoint::Connect)
        {
            return Err(FlowError::Connection("memory store unreachable".to_string()));
        }
        self.shared.counters.connects.fetch_add(1, Ordering::Relaxed);
        debug!("memory store connection opened");
        Ok(Box::new(MemoryConnection {
            shared: Arc::clone(&self.shared),
            local: HashMap::new(),
            pending: Vec::new(),
            cursor: None,
            closed: false,
        }))
    }
}

/// 트랜잭션 내 쓰기 작업 로그 (commit 시 재적용)
#[derive(Debug, Clone)]
struct PendingWrite {
    plan: StorePlan,
    params: Vec<ScalarValue>,
}

struct MemoryConnection {
    shared: Arc<Shared>,
    /// Copies of the tables this transaction has written
    local: HashMap<String, Table>,
    pending: Vec<PendingWrite>,
    cursor: Option<Cursor>,
    closed: bool,
}

impl MemoryConnection {
    fn ensure_open(&self) -> FlowResult<()> {
        if self.closed {
            return Err(FlowError::Connection("connection is closed".to_string()));
        }
        Ok(())
    }

    fn snapshot(&self, table: &str) -> FlowResult<Table> {
        if let Some(t) = self.local.get(table) {
            return Ok(t.clone());
        }
        self.shared
            .tables
            .read()
            .get(table)
            .cloned()
            .ok_or_else(|| FlowError::TableNotFound(table.to_string()))
    }

    fn write(&mut self, plan: StorePlan, params: &[ScalarValue]) -> FlowResult<usize> {
        let table = write_target(&plan).to_string();
        if !self.local.contains_key(&table)
            && let Some(t) = self.shared.tables.read().get(&table)
        {
            self.local.insert(table.clone(), t.clone());
        }
        let affected = apply_write(&mut self.local, &plan, params)?;
        self.pending.push(PendingWrite {
            plan,
            params: params.to_vec(),
        });
        Ok(affected)
    }

    fn discard(&mut self) {
        self.local.clear();
        self.pending.clear();
    }
}

impl StoreConnection for MemoryConnection {
    fn execute(&mut self, query: &str, params: &[ScalarValue]) -> FlowResult<Executed> {
        self.ensure_open()?;
        self.shared.counters.executes.fetch_add(1, Ordering::Relaxed);
        if self.shared.trip(FaultPoint::Execute) {
            return Err(FlowError::fetch("injected execute fault", query));
        }
        self.cursor = None;

        let plan = sql::parse(query)?;
        if let StorePlan::Select {
            table,
            projection,
            filter,
            order_by,
            limit,
            offset,
        } = plan
        {
            let snapshot = self.snapshot(&table)?;
            let parts = SelectParts {
                query,
                table,
                projection,
                filter,
                order_by,
                limit,
                offset,
            };
            self.cursor = Some(Cursor::open(snapshot, parts, params)?);
            Ok(Executed::Rows)
        } else {
            self.write(plan, params).map(Executed::Affected)
        }
    }

    fn fetch_one(&mut self) -> FlowResult<Option<Record>> {
        self.ensure_open()?;
        let counters = &self.shared.counters;
        counters.fetches.fetch_add(1, Ordering::Relaxed);
        if self.shared.trip(FaultPoint::Fetch) {
            let query = self.cursor.as_ref().map(|c| c.query.clone()).unwrap_or_default();
            return Err(FlowError::fetch("injected fetch fault", query));
        }
        let Some(cursor) = self.cursor.as_mut() else {
            return Err(FlowError::fetch("no active cursor", ""));
        };
        let row = cursor.next_row()?;
        if row.is_some() {
            counters.rows_fetched.fetch_add(1, Ordering::Relaxed);
        }
        Ok(row)
    }

    fn fetch_many(&mut self, n: usize) -> FlowResult<Vec<Record>> {
        self.ensure_open()?;
        let counters = &self.shared.counters;
        counters.fetches.fetch_add(1, Ordering::Relaxed);
        if self.shared.trip(FaultPoint::Fetch) {
            let query = self.cursor.as_ref().map(|c| c.query.clone()).unwrap_or_default();
            return Err(FlowError::fetch("injected fetch fault", query));
        }
        let Some(cursor) = self.cursor.as_mut() else {
            return Err(FlowError::fetch("no active cursor", ""));
        };
        let mut rows = Vec::with_capacity(n.min(1024));
        while rows.len() < n {
            match cursor.next_row()? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        counters
            .rows_fetched
            .fetch_add(rows.len() as u64, Ordering::Relaxed);
        Ok(rows)
    }

    fn fetch_all(&mut self) -> FlowResult<Vec<Record>> {
        self.fetch_many(usize::MAX)
    }

    fn commit(&mut self) -> FlowResult<()> {
        self.ensure_open()?;
        if self.shared.trip(FaultPoint::Commit) {
            return Err(FlowError::fetch("injected commit fault", "COMMIT"));
        }
        if !self.pending.is_empty() {
            // 변경된 테이블만 복사 → 재적용 → 교체 (all or nothing)
            let mut tables = self.shared.tables.write();
            let mut staged: HashMap<String, Table> = HashMap::new();
            for write in &self.pending {
                let name = write_target(&write.plan);
                if !staged.contains_key(name)
                    && let Some(t) = tables.get(name)
                {
                    staged.insert(name.to_string(), t.clone());
                }
            }
            for write in &self.pending {
                apply_write(&mut staged, &write.plan, &write.params)?;
            }
            let written = self.pending.len();
            tables.extend(staged);
            info!(writes = written, "memory store transaction committed");
        }
        self.discard();
        self.shared.counters.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn rollback(&mut self) -> FlowResult<()> {
        self.ensure_open()?;
        if self.shared.trip(FaultPoint::Rollback) {
            return Err(FlowError::fetch("injected rollback fault", "ROLLBACK"));
        }
        if !self.pending.is_empty() {
            info!(
                writes = self.pending.len(),
                "memory store transaction rolled back"
            );
        }
        self.discard();
        self.shared.counters.rollbacks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn close(&mut self) -> FlowResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.cursor = None;
        self.discard();
        self.shared.counters.closes.fetch_add(1, Ordering::Release);
        debug!("memory store connection closed");
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn write_target(plan: &StorePlan) -> &str {
    match plan {
        StorePlan::CreateTable { table, .. }
        | StorePlan::Insert { table, .. }
        | StorePlan::Select { table, .. }
        | StorePlan::Update { table, .. }
        | StorePlan::Delete { table, .. } => table,
    }
}

/// Applies one mutation to `tables`, returning the affected-row count.
fn apply_write(
    tables: &mut HashMap<String, Table>,
    plan: &StorePlan,
    params: &[ScalarValue],
) -> FlowResult<usize> {
    match plan {
        StorePlan::CreateTable {
            table,
            columns,
            if_not_exists,
        } => {
            if tables.contains_key(table) {
                if *if_not_exists {
                    return Ok(0);
                }
                return Err(FlowError::ConstraintViolation(format!(
                    "table '{table}' already exists"
                )));
            }
            tables.insert(table.clone(), Table::new(columns.clone()));
            Ok(0)
        }
        StorePlan::Insert {
            table,
            columns,
            rows,
        } => {
            let t = tables
                .get_mut(table)
                .ok_or_else(|| FlowError::TableNotFound(table.clone()))?;
            let targets: Vec<usize> = if columns.is_empty() {
                (0..t.columns.len()).collect()
            } else {
                columns
                    .iter()
                    .map(|c| t.column_index(table, c))
                    .collect::<FlowResult<_>>()?
            };
            let mut built = Vec::with_capacity(rows.len());
            for exprs in rows {
                if exprs.len() != targets.len() {
                    return Err(FlowError::ConstraintViolation(format!(
                        "{} values for {} columns in INSERT INTO {table}",
                        exprs.len(),
                        targets.len()
                    )));
                }
                let mut row = vec![ScalarValue::Null; t.columns.len()];
                for (expr, &idx) in exprs.iter().zip(&targets) {
                    row[idx] = expr.eval_const(params)?;
                }
                built.push(row);
            }
            let inserted = built.len();
            Arc::make_mut(&mut t.rows).extend(built);
            Ok(inserted)
        }
        StorePlan::Update {
            table,
            assignments,
            filter,
        } => {
            let t = tables
                .get_mut(table)
                .ok_or_else(|| FlowError::TableNotFound(table.clone()))?;
            let targets: Vec<usize> = assignments
                .iter()
                .map(|(c, _)| t.column_index(table, c))
                .collect::<FlowResult<_>>()?;
            let columns = Arc::clone(&t.columns);
            let mut affected = 0;
            for row in Arc::make_mut(&mut t.rows).iter_mut() {
                let ctx = RowContext {
                    table,
                    columns: &columns,
                    row,
                    params,
                };
                if let Some(f) = filter
                    && !f.matches(&ctx)?
                {
                    continue;
                }
                let values = assignments
                    .iter()
                    .map(|(_, e)| e.eval(&ctx))
                    .collect::<FlowResult<Vec<_>>>()?;
                for (idx, value) in targets.iter().zip(values) {
                    row[*idx] = value;
                }
                affected += 1;
            }
            Ok(affected)
        }
        StorePlan::Delete { table, filter } => {
            let t = tables
                .get_mut(table)
                .ok_or_else(|| FlowError::TableNotFound(table.clone()))?;
            let keep = match filter {
                None => vec![false; t.rows.len()],
                Some(f) => t
                    .rows
                    .iter()
                    .map(|row| {
                        f.matches(&RowContext {
                            table,
                            columns: &t.columns,
                            row,
                            params,
                        })
                        .map(|hit| !hit)
                    })
                    .collect::<FlowResult<Vec<bool>>>()?,
            };
            let before = t.rows.len();
            let mut idx = 0;
            Arc::make_mut(&mut t.rows).retain(|_| {
                let k = keep[idx];
                idx += 1;
                k
            });
            Ok(before - t.rows.len())
        }
        StorePlan::Select { .. } => Err(FlowError::InvalidArgument(
            "SELECT is not a write".to_string(),
        )),
    }
}

struct SelectParts<'q> {
    query: &'q str,
    table: String,
    projection: Projection,
    filter: Option<Expr>,
    order_by: Vec<SortKey>,
    limit: Option<Expr>,
    offset: Option<Expr>,
}

/// Active result set of one connection.
struct Cursor {
    query: String,
    source: CursorSource,
}

enum CursorSource {
    Scan(ScanCursor),
    Buffered(VecDeque<Record>),
}

/// Lazy walk over a table snapshot; filter, offset and limit are applied
/// row by row as the cursor advances.
struct ScanCursor {
    table: String,
    table_columns: Arc<[String]>,
    out_columns: Arc<[String]>,
    projection: Option<Vec<usize>>,
    rows: Arc<Vec<Row>>,
    /// Pre-sorted, pre-filtered row indices when ORDER BY was given
    order: Option<Vec<usize>>,
    filter: Option<Expr>,
    params: Vec<ScalarValue>,
    pos: usize,
    skip: usize,
    remaining: Option<usize>,
}

impl Cursor {
    fn open(snapshot: Table, parts: SelectParts<'_>, params: &[ScalarValue]) -> FlowResult<Self> {
        let SelectParts {
            query,
            table,
            projection,
            filter,
            order_by,
            limit,
            offset,
        } = parts;

        if let Some(f) = &filter {
            check_columns(f, &snapshot, &table)?;
        }
        let limit = limit.map(|e| window_bound(&e, params, "LIMIT")).transpose()?;
        let skip = offset
            .map(|e| window_bound(&e, params, "OFFSET"))
            .transpose()?
            .unwrap_or(0);

        if let Projection::Count(name) = &projection {
            let mut count = 0i64;
            for row in snapshot.rows.iter() {
                let hit = match &filter {
                    Some(f) => f.matches(&RowContext {
                        table: &table,
                        columns: &snapshot.columns,
                        row,
                        params,
                    })?,
                    None => true,
                };
                if hit {
                    count += 1;
                }
            }
            let record = Record::new(Arc::from(vec![name.clone()]), vec![ScalarValue::Integer(count)]);
            let mut rows: VecDeque<Record> = VecDeque::from(vec![record]);
            if skip > 0 || limit == Some(0) {
                rows.clear();
            }
            return Ok(Self {
                query: query.to_string(),
                source: CursorSource::Buffered(rows),
            });
        }

        let (out_columns, projection) = match projection {
            Projection::All => (Arc::clone(&snapshot.columns), None),
            Projection::Columns(cols) => {
                let idx = cols
                    .iter()
                    .map(|c| snapshot.column_index(&table, c))
                    .collect::<FlowResult<Vec<_>>>()?;
                (Arc::from(cols), Some(idx))
            }
            Projection::Count(_) => unreachable!("handled above"),
        };

        let (order, filter) = if order_by.is_empty() {
            (None, filter)
        } else {
            let keys = order_by
                .iter()
                .map(|k| snapshot.column_index(&table, &k.column).map(|i| (i, k.asc)))
                .collect::<FlowResult<Vec<_>>>()?;
            let mut indices = Vec::with_capacity(snapshot.rows.len());
            for (i, row) in snapshot.rows.iter().enumerate() {
                let hit = match &filter {
                    Some(f) => f.matches(&RowContext {
                        table: &table,
                        columns: &snapshot.columns,
                        row,
                        params,
                    })?,
                    None => true,
                };
                if hit {
                    indices.push(i);
                }
            }
            let rows = &snapshot.rows;
            indices.sort_by(|&a, &b| {
                keys.iter()
                    .map(|&(col, asc)| {
                        let ord = rows[a][col].sort_cmp(&rows[b][col]);
                        if asc { ord } else { ord.reverse() }
                    })
                    .find(|o| o.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            (Some(indices), None)
        };

        Ok(Self {
            query: query.to_string(),
            source: CursorSource::Scan(ScanCursor {
                table,
                table_columns: snapshot.columns,
                out_columns,
                projection,
                rows: snapshot.rows,
                order,
                filter,
                params: params.to_vec(),
                pos: 0,
                skip,
                remaining: limit,
            }),
        })
    }

    fn next_row(&mut self) -> FlowResult<Option<Record>> {
        match &mut self.source {
            CursorSource::Buffered(rows) => Ok(rows.pop_front()),
            CursorSource::Scan(scan) => scan.next_row(),
        }
    }
}

impl ScanCursor {
    fn next_row(&mut self) -> FlowResult<Option<Record>> {
        if self.remaining == Some(0) {
            return Ok(None);
        }
        loop {
            let row_idx = match &self.order {
                Some(order) => match order.get(self.pos) {
                    Some(&i) => i,
                    None => return Ok(None),
                },
                None if self.pos < self.rows.len() => self.pos,
                None => return Ok(None),
            };
            self.pos += 1;
            let row = &self.rows[row_idx];

            if let Some(f) = &self.filter
                && !f.matches(&RowContext {
                    table: &self.table,
                    columns: &self.table_columns,
                    row,
                    params: &self.params,
                })?
            {
                continue;
            }
            if self.skip > 0 {
                self.skip -= 1;
                continue;
            }
            if let Some(r) = self.remaining.as_mut() {
                *r -= 1;
            }

            let values = match &self.projection {
                None => row.clone(),
                Some(idx) => idx.iter().map(|&i| row[i].clone()).collect(),
            };
            return Ok(Some(Record::new(Arc::clone(&self.out_columns), values)));
        }
    }
}

fn window_bound(expr: &Expr, params: &[ScalarValue], clause: &str) -> FlowResult<usize> {
    match expr.eval_const(params)? {
        ScalarValue::Integer(n) if n >= 0 => Ok(n as usize),
        other => Err(FlowError::InvalidArgument(format!(
            "{clause} must be a non-negative integer, got {other}"
        ))),
    }
}

fn check_columns(expr: &Expr, table: &Table, name: &str) -> FlowResult<()> {
    match expr {
        Expr::Column(c) => table.column_index(name, c).map(|_| ()),
        Expr::BinaryOp { left, right, .. } => {
            check_columns(left, table, name)?;
            check_columns(right, table, name)
        }
        Expr::IsNull(inner) | Expr::IsNotNull(inner) => check_columns(inner, table, name),
        Expr::Literal(_) | Expr::Param(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_users() -> MemoryStore {
        let store = MemoryStore::new();
        let mut conn = store.connect().unwrap();
        conn.execute("CREATE TABLE users (id INTEGER, name TEXT, age INTEGER)", &[])
            .unwrap();
        conn.execute(
            "INSERT INTO users (id, name, age) VALUES (1, 'Alice', 28), (2, 'Bob', 35), (3, 'Charlie', 42), (4, 'Diana', NULL)",
            &[],
        )
        .unwrap();
        conn.commit().unwrap();
        store
    }

    fn names(rows: &[Record]) -> Vec<String> {
        rows.iter()
            .map(|r| r.get("name").unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_select_window_keeps_insertion_order() {
        let store = store_with_users();
        let mut conn = store.connect().unwrap();
        assert_eq!(
            conn.execute("SELECT * FROM users LIMIT 2 OFFSET 1", &[]).unwrap(),
            Executed::Rows
        );
        let rows = conn.fetch_all().unwrap();
        assert_eq!(names(&rows), vec!["Bob", "Charlie"]);
    }

    #[test]
    fn test_select_filter_order_and_projection() {
        let store = store_with_users();
        let mut conn = store.connect().unwrap();
        conn.execute(
            "SELECT name, age FROM users WHERE age >= ? ORDER BY age DESC",
            &[ScalarValue::Integer(30)],
        )
        .unwrap();
        let rows = conn.fetch_all().unwrap();
        assert_eq!(names(&rows), vec!["Charlie", "Bob"]);
        assert_eq!(rows[0].columns(), &["name".to_string(), "age".to_string()]);
    }

    #[test]
    fn test_count_star() {
        let store = store_with_users();
        let mut conn = store.connect().unwrap();
        conn.execute("SELECT COUNT(*) FROM users WHERE age IS NULL", &[])
            .unwrap();
        let row = conn.fetch_one().unwrap().unwrap();
        assert_eq!(row.value(0), Some(&ScalarValue::Integer(1)));
        assert!(conn.fetch_one().unwrap().is_none());
    }

    #[test]
    fn test_fetch_one_is_lazy() {
        let store = store_with_users();
        let mut conn = store.connect().unwrap();
        conn.execute("SELECT * FROM users", &[]).unwrap();
        conn.fetch_one().unwrap();
        assert_eq!(store.stats().rows_fetched, 1);
    }

    #[test]
    fn test_uncommitted_writes_invisible_to_other_connections() {
        let store = store_with_users();
        let mut writer = store.connect().unwrap();
        let affected = writer
            .execute("UPDATE users SET age = 99 WHERE name = 'Alice'", &[])
            .unwrap();
        assert_eq!(affected, Executed::Affected(1));

        // read-your-writes
        writer
            .execute("SELECT age FROM users WHERE name = 'Alice'", &[])
            .unwrap();
        assert_eq!(
            writer.fetch_one().unwrap().unwrap().value(0),
            Some(&ScalarValue::Integer(99))
        );

        let mut reader = store.connect().unwrap();
        reader
            .execute("SELECT age FROM users WHERE name = 'Alice'", &[])
            .unwrap();
        assert_eq!(
            reader.fetch_one().unwrap().unwrap().value(0),
            Some(&ScalarValue::Integer(28))
        );

        writer.commit().unwrap();
        reader
            .execute("SELECT age FROM users WHERE name = 'Alice'", &[])
            .unwrap();
        assert_eq!(
            reader.fetch_one().unwrap().unwrap().value(0),
            Some(&ScalarValue::Integer(99))
        );
    }

    #[test]
    fn test_rollback_discards_and_close_discards() {
        let store = store_with_users();
        let mut conn = store.connect().unwrap();
        conn.execute("DELETE FROM users WHERE age > 30", &[]).unwrap();
        conn.rollback().unwrap();
        assert_eq!(store.table_len("users"), Some(4));

        conn.execute("DELETE FROM users", &[]).unwrap();
        conn.close().unwrap();
        assert_eq!(store.table_len("users"), Some(4));
        assert!(matches!(
            conn.execute("SELECT * FROM users", &[]),
            Err(FlowError::Connection(_))
        ));
    }

    #[test]
    fn test_errors() {
        let store = store_with_users();
        let mut conn = store.connect().unwrap();
        assert!(matches!(
            conn.execute("SELECT * FROM missing", &[]),
            Err(FlowError::TableNotFound(_))
        ));
        assert!(matches!(
            conn.execute("SELECT * FROM users WHERE nope = 1", &[]),
            Err(FlowError::ColumnNotFound { .. })
        ));
        assert!(matches!(
            conn.execute("INSERT INTO users (id, name) VALUES (1)", &[]),
            Err(FlowError::ConstraintViolation(_))
        ));
        assert!(matches!(
            conn.execute("SELECT * FROM users LIMIT ?", &[ScalarValue::Integer(-1)]),
            Err(FlowError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_fault_injection_and_stats() {
        let store = store_with_users();
        store.fail_next(FaultPoint::Execute, 1);
        let mut conn = store.connect().unwrap();
        assert!(matches!(
            conn.execute("SELECT * FROM users", &[]),
            Err(FlowError::Fetch { .. })
        ));
        conn.execute("SELECT * FROM users", &[]).unwrap();
        store.fail_next(FaultPoint::Fetch, 1);
        assert!(conn.fetch_one().is_err());
        assert!(conn.fetch_one().unwrap().is_some());
        drop(conn);

        store.set_unreachable(true);
        assert!(matches!(store.connect(), Err(FlowError::Connection(_))));
        store.set_unreachable(false);

        let stats = store.stats();
        assert_eq!(stats.open_connections(), 0);
        assert_eq!(stats.connects, 2);
    }
}
