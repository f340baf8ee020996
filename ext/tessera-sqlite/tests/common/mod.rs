#![allow(dead_code)]

///
/// Shared fixtures for the tessera-sqlite integration tests.
///
/// `series(start, stop, step)` yields `start, start + step, ...` up to and
/// including `stop`. Every parameter is optional: start defaults to 0, step
/// to 1 and stop to 100.
///

use std::collections::HashMap;

use tessera_core::{ExtError, ExtResult, ExtensionConfig, SqlValue};
use tessera_sqlite::{ExtConnection, RowSource, Step, TableFunction};

pub struct Series {
    start: i64,
    stop: i64,
    step: i64,
}

impl Default for Series {
    fn default() -> Self {
        Self {
            start: 0,
            stop: 100,
            step: 1,
        }
    }
}

fn int_param(params: &HashMap<String, SqlValue>, name: &str) -> ExtResult<Option<i64>> {
    match params.get(name) {
        None | Some(SqlValue::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| ExtError::Validation(format!("{} must be an integer, got {}", name, value))),
    }
}

impl RowSource for Series {
    fn initialize(&mut self, params: &HashMap<String, SqlValue>) -> ExtResult<()> {
        if let Some(start) = int_param(params, "start")? {
            self.start = start;
        }
        if let Some(stop) = int_param(params, "stop")? {
            self.stop = stop;
        }
        if let Some(step) = int_param(params, "step")? {
            self.step = step;
        }
        if self.step <= 0 {
            return Err(ExtError::Validation(format!("step must be positive, got {}", self.step)));
        }
        Ok(())
    }

    fn iterate(&mut self, idx: i64) -> ExtResult<Step> {
        let value = idx
            .checked_mul(self.step)
            .and_then(|offset| offset.checked_add(self.start));
        match value {
            Some(v) if v <= self.stop => Ok(Step::Row(vec![SqlValue::Integer(v)])),
            _ => Ok(Step::Done),
        }
    }
}

pub fn series() -> TableFunction {
    TableFunction::new("series", &["value"], &["start", "stop", "step"], Series::default).unwrap()
}

pub fn memory_db() -> ExtConnection {
    let mut conn = ExtConnection::open_in_memory(ExtensionConfig::default()).unwrap();
    conn.register_table_function(series()).unwrap();
    conn
}

pub fn query_i64(conn: &ExtConnection, sql: &str) -> Vec<i64> {
    let mut stmt = conn.connection().prepare(sql).unwrap();
    stmt.query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<Vec<i64>, _>>()
        .unwrap()
}
