///
/// Eponymous virtual table module backing every registered `TableFunction`.
///
/// The module is eponymous-only: it exists under the function's name in
/// every schema without a CREATE VIRTUAL TABLE, and cannot be created as a
/// regular virtual table. The descriptor travels as the module's aux data,
/// so one module type serves all table functions.
///
/// Errors from the row source surface as `rusqlite::Error::ModuleError`,
/// which the engine reports as a failure of the driving statement.
///

use std::marker::PhantomData;
use std::os::raw::c_int;
use std::sync::Arc;

use rusqlite::ffi;
use rusqlite::vtab::{
    eponymous_only_module, Context, IndexConstraintOp, IndexInfo, VTab, VTabConnection,
    VTabCursor, Values,
};
use rusqlite::Connection;
use tracing::{debug, trace};

use tessera_core::{decode_index_names, ExtError, ExtResult, SqlValue};

use crate::table_function::{ConstraintInfo, CursorState, TableFunction};

#[repr(C)]
pub(crate) struct TableFunctionTab {
    /// Base class. Must be first
    base: ffi::sqlite3_vtab,
    function: Arc<TableFunction>,
}

unsafe impl<'vtab> VTab<'vtab> for TableFunctionTab {
    type Aux = Arc<TableFunction>;
    type Cursor = TableFunctionCursor<'vtab>;

    fn connect(
        _db: &mut VTabConnection,
        aux: Option<&Self::Aux>,
        _args: &[&[u8]],
    ) -> rusqlite::Result<(String, Self)> {
        let function = aux.cloned().ok_or_else(|| {
            rusqlite::Error::ModuleError("table function module has no descriptor".to_string())
        })?;
        let schema = function.declaration();
        trace!(name = function.name(), %schema, "table function connected");
        Ok((
            schema,
            TableFunctionTab {
                base: ffi::sqlite3_vtab::default(),
                function,
            },
        ))
    }

    fn best_index(&self, info: &mut IndexInfo) -> rusqlite::Result<()> {
        let constraints: Vec<ConstraintInfo> = info
            .constraints()
            .map(|c| ConstraintInfo {
                column: c.column(),
                is_eq: c.operator() == IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_EQ,
                usable: c.is_usable(),
            })
            .collect();

        let plan = self.function.plan(&constraints);
        for usage in &plan.usages {
            let mut constraint_usage = info.constraint_usage(usage.constraint);
            constraint_usage.set_argv_index(usage.argv_index);
            constraint_usage.set_omit(true);
        }
        if let Some(idx_str) = &plan.idx_str {
            info.set_idx_str(idx_str);
        }
        info.set_estimated_cost(plan.estimated_cost);
        info.set_estimated_rows(plan.estimated_rows);
        Ok(())
    }

    fn open(&'vtab mut self) -> rusqlite::Result<TableFunctionCursor<'vtab>> {
        Ok(TableFunctionCursor {
            base: ffi::sqlite3_vtab_cursor::default(),
            state: CursorState::open(self.function.clone()),
            phantom: PhantomData,
        })
    }
}

#[repr(C)]
pub(crate) struct TableFunctionCursor<'vtab> {
    /// Base class. Must be first
    base: ffi::sqlite3_vtab_cursor,
    state: CursorState,
    phantom: PhantomData<&'vtab TableFunctionTab>,
}

unsafe impl VTabCursor for TableFunctionCursor<'_> {
    fn filter(
        &mut self,
        _idx_num: c_int,
        idx_str: Option<&str>,
        args: &Values<'_>,
    ) -> rusqlite::Result<()> {
        let names = idx_str.map(decode_index_names).unwrap_or_default();
        let values: Vec<SqlValue> = args.iter().map(SqlValue::from_value_ref).collect();
        self.state
            .filter(names, values)
            .map_err(ExtError::into_module_error)
    }

    fn next(&mut self) -> rusqlite::Result<()> {
        self.state.next().map_err(ExtError::into_module_error)
    }

    fn eof(&self) -> bool {
        self.state.eof()
    }

    fn column(&self, ctx: &mut Context, i: c_int) -> rusqlite::Result<()> {
        let value = self.state.column(i).map_err(ExtError::into_module_error)?;
        ctx.set_result(&value)
    }

    fn rowid(&self) -> rusqlite::Result<i64> {
        Ok(self.state.rowid())
    }
}

impl Drop for TableFunctionCursor<'_> {
    fn drop(&mut self) {
        self.state.close();
    }
}

/// Registers `function` under its own name on `conn`.
pub(crate) fn register_module(conn: &Connection, function: Arc<TableFunction>) -> ExtResult<()> {
    let name = function.name().to_string();
    conn.create_module(
        &name,
        eponymous_only_module::<TableFunctionTab>(),
        Some(function),
    )?;
    debug!(name = %name, "registered table function");
    Ok(())
}
