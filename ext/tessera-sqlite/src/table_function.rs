//!
//! Table Functions
//!
//! A table function is a parameterized, read-only virtual table whose rows
//! come from a host-supplied `RowSource`:
//!
//! ```sql
//! SELECT value FROM series(0, 5, 2);
//! SELECT value FROM series WHERE start = 0 AND stop = 5;
//! ```
//!
//! Parameters are declared as HIDDEN columns after the output columns, so
//! positional call arguments bind to them in order. This module holds the
//! engine-independent parts of the protocol:
//!
//! - `TableFunction` - name, output columns, parameter names, source factory
//! - `TableFunction::plan` - the `xBestIndex` cost model
//! - `CursorState` - the per-scan state machine behind `xFilter`/`xNext`/`xColumn`
//!
//! The rusqlite module glue lives in `vtab.rs`.
//!

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tessera_core::{encode_index_names, validate_identifier, ExtError, ExtResult, SqlValue};

/// Result of one `RowSource::iterate` call.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Row(Vec<SqlValue>),
    Done,
}

/// Host iterator behind a table function. A fresh instance is created for
/// every scan.
pub trait RowSource: Send {
    /// Receives only the parameters the query actually bound.
    fn initialize(&mut self, params: &HashMap<String, SqlValue>) -> ExtResult<()>;

    /// Produces the row at `idx` (0, 1, 2, ...) or `Step::Done`. Errors abort
    /// the driving statement.
    fn iterate(&mut self, idx: i64) -> ExtResult<Step>;
}

type SourceFactory = dyn Fn() -> Box<dyn RowSource> + Send + Sync;

/// Planner cost for a fully bound call.
pub const COST_ALL_BOUND: f64 = 1.0;
/// Planner cost per missing parameter.
pub const COST_PER_MISSING_PARAM: f64 = 1e13;

pub struct TableFunction {
    name: String,
    columns: Vec<String>,
    params: Vec<String>,
    factory: Arc<SourceFactory>,
}

impl TableFunction {
    pub fn new<F, S>(name: &str, columns: &[&str], params: &[&str], factory: F) -> ExtResult<Self>
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: RowSource + 'static,
    {
        validate_identifier(name)?;
        if columns.is_empty() {
            return Err(ExtError::Validation(format!(
                "table function '{}' must declare at least one column",
                name
            )));
        }
        let mut seen: Vec<&str> = Vec::with_capacity(columns.len() + params.len());
        for ident in columns.iter().chain(params.iter()) {
            validate_identifier(ident)?;
            if seen.iter().any(|s| s.eq_ignore_ascii_case(ident)) {
                return Err(ExtError::Validation(format!(
                    "duplicate column or parameter '{}' in table function '{}'",
                    ident, name
                )));
            }
            seen.push(*ident);
        }

        Ok(Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            params: params.iter().map(|p| p.to_string()).collect(),
            factory: Arc::new(move || Box::new(factory()) as Box<dyn RowSource>),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn new_source(&self) -> Box<dyn RowSource> {
        (self.factory)()
    }

    /// Schema handed to `sqlite3_declare_vtab`.
    pub fn declaration(&self) -> String {
        let mut defs: Vec<String> = self.columns.iter().map(|c| format!("\"{}\"", c)).collect();
        defs.extend(self.params.iter().map(|p| format!("\"{}\" HIDDEN", p)));
        format!("CREATE TABLE x({})", defs.join(", "))
    }

    /// Chooses which constraints feed parameters. Pure: the planner may
    /// call this many times per statement.
    pub fn plan(&self, constraints: &[ConstraintInfo]) -> IndexPlan {
        let ncols = self.columns.len() as i32;
        let nparams = self.params.len();
        let mut bound = vec![false; nparams];
        let mut usages = Vec::new();
        let mut names: Vec<&str> = Vec::new();

        for (i, constraint) in constraints.iter().enumerate() {
            if !constraint.usable || !constraint.is_eq {
                continue;
            }
            let param = constraint.column - ncols;
            if param < 0 || param as usize >= nparams {
                continue;
            }
            let param = param as usize;
            // Duplicates stay with the engine to check.
            if bound[param] {
                continue;
            }
            bound[param] = true;
            usages.push(ConstraintUsage {
                constraint: i,
                argv_index: usages.len() as i32 + 1,
            });
            names.push(&self.params[param]);
        }

        let nbound = usages.len();
        let (estimated_cost, estimated_rows) = if nbound == nparams {
            (COST_ALL_BOUND, 10)
        } else if nbound > 0 {
            let missing = (nparams - nbound) as u32;
            (
                COST_PER_MISSING_PARAM * missing as f64,
                10i64.saturating_pow(missing),
            )
        } else {
            (f64::MAX, i64::MAX)
        };

        IndexPlan {
            idx_str: if names.is_empty() {
                None
            } else {
                Some(encode_index_names(&names))
            },
            usages,
            estimated_cost,
            estimated_rows,
        }
    }
}

impl fmt::Debug for TableFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableFunction")
            .field("name", &self.name)
            .field("columns", &self.columns)
            .field("params", &self.params)
            .finish()
    }
}

/// One `aConstraint` entry as the planner presents it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstraintInfo {
    pub column: i32,
    pub is_eq: bool,
    pub usable: bool,
}

/// Consumed constraint: engine omits its check and passes the value in
/// `argv[argv_index - 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstraintUsage {
    pub constraint: usize,
    pub argv_index: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexPlan {
    pub usages: Vec<ConstraintUsage>,
    pub idx_str: Option<String>,
    pub estimated_cost: f64,
    pub estimated_rows: i64,
}

/// `xColumn` index the engine uses for the rowid.
pub const ROWID_COLUMN: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorPhase {
    Opened,
    Iterating,
    Exhausted,
    Closed,
}

pub struct CursorState {
    function: Arc<TableFunction>,
    source: Option<Box<dyn RowSource>>,
    params: HashMap<String, SqlValue>,
    row: Option<Vec<SqlValue>>,
    idx: i64,
    phase: CursorPhase,
    filtered: bool,
}

impl CursorState {
    pub fn open(function: Arc<TableFunction>) -> Self {
        let source = function.new_source();
        Self {
            function,
            source: Some(source),
            params: HashMap::new(),
            row: None,
            idx: 0,
            phase: CursorPhase::Opened,
            filtered: false,
        }
    }

    pub fn phase(&self) -> CursorPhase {
        self.phase
    }

    /// Starts a scan. `names` is the decoded index string and `values` the
    /// matching argv entries.
    pub fn filter(&mut self, names: Vec<String>, values: Vec<SqlValue>) -> ExtResult<()> {
        if self.phase == CursorPhase::Closed {
            return Err(ExtError::State("cursor is closed".to_string()));
        }
        if names.len() != values.len() {
            return Err(ExtError::engine(format!(
                "{}: expected {} arguments, got {}",
                self.function.name(),
                names.len(),
                values.len()
            )));
        }
        // A re-filtered cursor starts over with a fresh source.
        if self.filtered {
            self.source = Some(self.function.new_source());
        }
        self.filtered = true;
        self.params = names.into_iter().zip(values).collect();
        self.row = None;
        self.idx = 0;

        let source = self
            .source
            .as_mut()
            .ok_or_else(|| ExtError::State("cursor is closed".to_string()))?;
        source.initialize(&self.params)?;
        let step = source.iterate(0)?;
        self.accept(step);
        Ok(())
    }

    pub fn next(&mut self) -> ExtResult<()> {
        match self.phase {
            CursorPhase::Closed => return Err(ExtError::State("cursor is closed".to_string())),
            CursorPhase::Exhausted => return Ok(()),
            CursorPhase::Opened => {
                return Err(ExtError::State("cursor advanced before filter".to_string()));
            }
            CursorPhase::Iterating => {}
        }
        self.row = None;
        let idx = self.idx;
        let step = self.source_mut()?.iterate(idx)?;
        self.accept(step);
        Ok(())
    }

    pub fn eof(&self) -> bool {
        self.phase != CursorPhase::Iterating
    }

    pub fn rowid(&self) -> i64 {
        self.idx
    }

    pub fn column(&self, i: i32) -> ExtResult<SqlValue> {
        if i == ROWID_COLUMN {
            return Ok(SqlValue::Integer(self.idx));
        }
        if i < 0 {
            return Err(ExtError::engine(format!("invalid column index {}", i)));
        }
        let i = i as usize;
        let ncols = self.function.columns().len();
        if i < ncols {
            let row = self
                .row
                .as_ref()
                .ok_or_else(|| ExtError::State("no current row".to_string()))?;
            return row.get(i).cloned().ok_or_else(|| {
                ExtError::engine(format!(
                    "{}: row has {} values, column {} requested",
                    self.function.name(),
                    row.len(),
                    i
                ))
            });
        }
        match self.function.params().get(i - ncols) {
            Some(name) => Ok(self.params.get(name).cloned().unwrap_or(SqlValue::Null)),
            None => Err(ExtError::engine(format!("invalid column index {}", i))),
        }
    }

    pub fn close(&mut self) {
        self.source = None;
        self.row = None;
        self.params.clear();
        self.phase = CursorPhase::Closed;
    }

    fn accept(&mut self, step: Step) {
        match step {
            Step::Row(values) => {
                self.row = Some(values);
                self.idx += 1;
                self.phase = CursorPhase::Iterating;
            }
            Step::Done => {
                self.row = None;
                self.phase = CursorPhase::Exhausted;
            }
        }
    }

    fn source_mut(&mut self) -> ExtResult<&mut Box<dyn RowSource>> {
        self.source
            .as_mut()
            .ok_or_else(|| ExtError::State("cursor is closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        limit: i64,
    }

    impl RowSource for Counter {
        fn initialize(&mut self, params: &HashMap<String, SqlValue>) -> ExtResult<()> {
            if let Some(limit) = params.get("limit") {
                self.limit = limit
                    .as_i64()
                    .ok_or_else(|| ExtError::Validation("limit must be an integer".to_string()))?;
            }
            Ok(())
        }

        fn iterate(&mut self, idx: i64) -> ExtResult<Step> {
            if idx >= self.limit {
                Ok(Step::Done)
            } else {
                Ok(Step::Row(vec![SqlValue::Integer(idx * 10)]))
            }
        }
    }

    fn counter() -> Arc<TableFunction> {
        Arc::new(TableFunction::new("counter", &["n"], &["limit", "offset"], || Counter { limit: 3 }).unwrap())
    }

    fn eq(column: i32) -> ConstraintInfo {
        ConstraintInfo {
            column,
            is_eq: true,
            usable: true,
        }
    }

    #[test]
    fn test_declaration() {
        insta::assert_snapshot!(
            counter().declaration(),
            @r#"CREATE TABLE x("n", "limit" HIDDEN, "offset" HIDDEN)"#
        );
    }

    #[test]
    fn test_invalid_descriptors() {
        assert!(TableFunction::new("bad name", &["a"], &[], || Counter { limit: 0 }).is_err());
        assert!(TableFunction::new("f", &[], &["p"], || Counter { limit: 0 }).is_err());
        assert!(TableFunction::new("f", &["a"], &["A"], || Counter { limit: 0 }).is_err());
        assert!(TableFunction::new("f", &["a,b"], &[], || Counter { limit: 0 }).is_err());
    }

    #[test]
    fn test_plan_all_bound() {
        let plan = counter().plan(&[eq(2), eq(1)]);
        assert_eq!(plan.estimated_cost, COST_ALL_BOUND);
        assert_eq!(plan.estimated_rows, 10);
        assert_eq!(plan.idx_str.as_deref(), Some("offset,limit"));
        assert_eq!(
            plan.usages,
            vec![
                ConstraintUsage { constraint: 0, argv_index: 1 },
                ConstraintUsage { constraint: 1, argv_index: 2 },
            ]
        );
    }

    #[test]
    fn test_plan_cost_ordering() {
        let f = counter();
        let full = f.plan(&[eq(1), eq(2)]);
        let partial = f.plan(&[eq(1)]);
        let none = f.plan(&[]);
        assert!(full.estimated_cost < partial.estimated_cost);
        assert!(partial.estimated_cost < none.estimated_cost);
        assert_eq!(partial.estimated_cost, COST_PER_MISSING_PARAM);
        assert_eq!(partial.estimated_rows, 10);
        assert_eq!(none.estimated_cost, f64::MAX);
        assert!(none.idx_str.is_none());
    }

    #[test]
    fn test_plan_skips_unusable_and_non_eq() {
        let f = counter();
        let constraints = [
            ConstraintInfo { column: 1, is_eq: true, usable: false },
            ConstraintInfo { column: 2, is_eq: false, usable: true },
            eq(0),
            eq(1),
            eq(1),
        ];
        let plan = f.plan(&constraints);
        assert_eq!(plan.usages, vec![ConstraintUsage { constraint: 3, argv_index: 1 }]);
        assert_eq!(plan.idx_str.as_deref(), Some("limit"));
    }

    #[test]
    fn test_plan_is_idempotent() {
        let f = counter();
        let constraints = [eq(2), eq(1)];
        assert_eq!(f.plan(&constraints), f.plan(&constraints));
    }

    #[test]
    fn test_plan_without_params() {
        let f = TableFunction::new("fixed", &["a"], &[], || Counter { limit: 1 }).unwrap();
        let plan = f.plan(&[]);
        assert_eq!(plan.estimated_cost, COST_ALL_BOUND);
        assert!(plan.idx_str.is_none());
    }

    #[test]
    fn test_cursor_iteration() {
        let mut cursor = CursorState::open(counter());
        assert_eq!(cursor.phase(), CursorPhase::Opened);

        cursor.filter(vec!["limit".into()], vec![SqlValue::Integer(2)]).unwrap();
        assert!(!cursor.eof());
        assert_eq!(cursor.rowid(), 1);
        assert_eq!(cursor.column(0).unwrap(), SqlValue::Integer(0));
        assert_eq!(cursor.column(1).unwrap(), SqlValue::Integer(2));
        assert_eq!(cursor.column(2).unwrap(), SqlValue::Null);
        assert_eq!(cursor.column(ROWID_COLUMN).unwrap(), SqlValue::Integer(1));

        cursor.next().unwrap();
        assert_eq!(cursor.rowid(), 2);
        assert_eq!(cursor.column(0).unwrap(), SqlValue::Integer(10));

        cursor.next().unwrap();
        assert!(cursor.eof());
        assert_eq!(cursor.phase(), CursorPhase::Exhausted);
        assert!(cursor.column(0).is_err());

        cursor.close();
        assert!(matches!(cursor.next(), Err(ExtError::State(_))));
    }

    #[test]
    fn test_cursor_refilter_restarts() {
        let mut cursor = CursorState::open(counter());
        cursor.filter(vec![], vec![]).unwrap();
        cursor.next().unwrap();
        cursor.next().unwrap();
        cursor.next().unwrap();
        assert!(cursor.eof());

        cursor.filter(vec!["limit".into()], vec![SqlValue::Integer(1)]).unwrap();
        assert!(!cursor.eof());
        assert_eq!(cursor.rowid(), 1);
    }

    #[test]
    fn test_cursor_errors_surface() {
        let mut cursor = CursorState::open(counter());
        let err = cursor
            .filter(vec!["limit".into()], vec![SqlValue::Text("x".into())])
            .unwrap_err();
        assert!(matches!(err, ExtError::Validation(_)));

        let err = cursor.filter(vec!["limit".into()], vec![]).unwrap_err();
        assert!(matches!(err, ExtError::Engine { .. }));
    }

    #[test]
    fn test_next_before_filter() {
        let mut cursor = CursorState::open(counter());
        assert!(matches!(cursor.next(), Err(ExtError::State(_))));
        assert!(cursor.eof());
    }
}
