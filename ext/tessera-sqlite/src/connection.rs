///
/// Extension-aware connection wrapper.
///
/// `ExtConnection` owns the physical `rusqlite::Connection` together with
/// everything that has to be installed on it: the busy policy, the hook
/// slots, the SQL function groups and the registered table functions.
/// `reconnect` swaps in a fresh physical connection and installs all of
/// it again, so host code never has to remember what was registered.
///
/// Reconnecting an in-memory target yields a new, empty database.
///

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::Connection;
use tracing::debug;

use tessera_core::{ExtError, ExtResult, ExtensionConfig};

use crate::backup::{self, BackupOptions, ProgressFn};
use crate::blob::BlobStream;
use crate::busy::{self, BusyPolicy};
use crate::functions::register_functions;
use crate::hooks::{CommitDecision, HookSlots, UpdateKind};
use crate::status::{db_status, StatusMetric, StatusSnapshot};
use crate::table_function::TableFunction;
use crate::vtab::register_module;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionTarget {
    Memory,
    Path(PathBuf),
}

impl ConnectionTarget {
    fn open(&self) -> ExtResult<Connection> {
        let conn = match self {
            ConnectionTarget::Memory => Connection::open_in_memory()?,
            ConnectionTarget::Path(path) => Connection::open(path)?,
        };
        Ok(conn)
    }
}

pub struct ExtConnection {
    // Declared first so the engine connection closes before the busy
    // policy it points at is freed.
    conn: Connection,
    busy: Option<Box<BusyPolicy>>,
    target: ConnectionTarget,
    config: ExtensionConfig,
    hooks: HookSlots,
    table_functions: Vec<Arc<TableFunction>>,
}

impl ExtConnection {
    pub fn open(path: impl AsRef<Path>, config: ExtensionConfig) -> ExtResult<Self> {
        Self::open_target(ConnectionTarget::Path(path.as_ref().to_path_buf()), config)
    }

    pub fn open_in_memory(config: ExtensionConfig) -> ExtResult<Self> {
        Self::open_target(ConnectionTarget::Memory, config)
    }

    pub fn open_target(target: ConnectionTarget, config: ExtensionConfig) -> ExtResult<Self> {
        config.validate()?;
        let conn = target.open()?;
        let busy = match config.connection.busy_timeout_ms {
            0 => None,
            ms => Some(Box::new(BusyPolicy::new(ms))),
        };
        let ext = Self {
            conn,
            busy,
            target,
            config,
            hooks: HookSlots::default(),
            table_functions: Vec::new(),
        };
        ext.install_all(&ext.conn)?;
        debug!(db = ?ext.target, "connection opened");
        Ok(ext)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Direct access for transactions and other `&mut` APIs. Hooks and
    /// functions installed through the raw connection are not reapplied on
    /// reconnect.
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    pub fn config(&self) -> &ExtensionConfig {
        &self.config
    }

    pub fn hooks(&self) -> &HookSlots {
        &self.hooks
    }

    /// Closes the physical connection and opens a new one with the same
    /// busy policy, hooks, functions and table functions.
    pub fn reconnect(&mut self) -> ExtResult<()> {
        let fresh = self.target.open()?;
        self.install_all(&fresh)?;
        let old = std::mem::replace(&mut self.conn, fresh);
        old.close().map_err(|(_, e)| ExtError::from(e))?;
        debug!(db = ?self.target, "reconnected");
        Ok(())
    }

    fn install_all(&self, conn: &Connection) -> ExtResult<()> {
        match &self.busy {
            Some(policy) => busy::install(conn, policy)?,
            None => busy::clear(conn)?,
        }
        self.hooks.apply(conn);
        register_functions(conn, &self.config)?;
        for function in &self.table_functions {
            register_module(conn, function.clone())?;
        }
        Ok(())
    }

    /// Replaces the busy policy. 0 removes the handler so lock conflicts
    /// fail immediately.
    pub fn set_busy_timeout(&mut self, timeout_ms: u32) -> ExtResult<()> {
        busy::clear(&self.conn)?;
        self.busy = None;
        if timeout_ms > 0 {
            let policy = Box::new(BusyPolicy::new(timeout_ms));
            busy::install(&self.conn, &policy)?;
            self.busy = Some(policy);
        }
        self.config.connection.busy_timeout_ms = timeout_ms;
        debug!(timeout_ms, "busy timeout set");
        Ok(())
    }

    pub fn busy_timeout_ms(&self) -> u32 {
        self.busy.as_ref().map(|p| p.timeout_ms()).unwrap_or(0)
    }

    pub fn set_commit_hook<F>(&mut self, hook: F)
    where
        F: Fn() -> CommitDecision + Send + Sync + 'static,
    {
        self.hooks.set_commit(Some(Arc::new(hook)));
        self.hooks.apply_commit(&self.conn);
    }

    pub fn clear_commit_hook(&mut self) {
        self.hooks.set_commit(None);
        self.hooks.apply_commit(&self.conn);
    }

    pub fn set_rollback_hook<F>(&mut self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.hooks.set_rollback(Some(Arc::new(hook)));
        self.hooks.apply_rollback(&self.conn);
    }

    pub fn clear_rollback_hook(&mut self) {
        self.hooks.set_rollback(None);
        self.hooks.apply_rollback(&self.conn);
    }

    pub fn set_update_hook<F>(&mut self, hook: F)
    where
        F: Fn(UpdateKind, &str, &str, i64) + Send + Sync + 'static,
    {
        self.hooks.set_update(Some(Arc::new(hook)));
        self.hooks.apply_update(&self.conn);
    }

    pub fn clear_update_hook(&mut self) {
        self.hooks.set_update(None);
        self.hooks.apply_update(&self.conn);
    }

    pub fn register_table_function(&mut self, function: TableFunction) -> ExtResult<()> {
        if self
            .table_functions
            .iter()
            .any(|f| f.name().eq_ignore_ascii_case(function.name()))
        {
            return Err(ExtError::Validation(format!(
                "table function '{}' is already registered",
                function.name()
            )));
        }
        let function = Arc::new(function);
        register_module(&self.conn, function.clone())?;
        self.table_functions.push(function);
        Ok(())
    }

    pub fn table_functions(&self) -> impl Iterator<Item = &TableFunction> {
        self.table_functions.iter().map(|f| f.as_ref())
    }

    pub fn execute_batch(&self, sql: &str) -> ExtResult<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    pub fn changes(&self) -> u64 {
        self.conn.changes()
    }

    pub fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    pub fn blob_open(
        &self,
        table: &str,
        column: &str,
        rowid: i64,
        read_only: bool,
    ) -> ExtResult<BlobStream<'_>> {
        BlobStream::open(&self.conn, "main", table, column, rowid, read_only)
    }

    pub fn backup_options(&self) -> BackupOptions {
        BackupOptions::from(&self.config.backup)
    }

    /// Copies this database into `dest`, replacing its main schema.
    pub fn backup_to(&self, dest: &mut ExtConnection, progress: Option<ProgressFn<'_>>) -> ExtResult<()> {
        debug!(from = ?self.target, to = ?dest.target, "backup started");
        backup::backup(&self.conn, &mut dest.conn, &self.backup_options(), progress)
    }

    pub fn backup_to_file(&self, path: impl AsRef<Path>, progress: Option<ProgressFn<'_>>) -> ExtResult<()> {
        let path = path.as_ref();
        debug!(from = ?self.target, to = %path.display(), "backup started");
        backup::backup_to_file(&self.conn, path, &self.backup_options(), progress)
    }

    pub fn status(&self, metric: StatusMetric, reset: bool) -> ExtResult<StatusSnapshot> {
        db_status(&self.conn, metric, reset)
    }
}

impl std::fmt::Debug for ExtConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtConnection")
            .field("target", &self.target)
            .field("busy_timeout_ms", &self.busy_timeout_ms())
            .field("hooks", &self.hooks)
            .field("table_functions", &self.table_functions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_registers_functions() {
        let conn = ExtConnection::open_in_memory(ExtensionConfig::default()).unwrap();
        let hash: i64 = conn
            .connection()
            .query_row("SELECT murmurhash('abc')", [], |r| r.get(0))
            .unwrap();
        assert_eq!(hash, 324500635);
        assert_eq!(conn.busy_timeout_ms(), 5000);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = ExtensionConfig::default();
        config.bloom.default_size = 0;
        let err = ExtConnection::open_in_memory(config).unwrap_err();
        assert!(matches!(err, ExtError::Config(_)));
    }

    #[test]
    fn test_changes_and_last_insert_rowid() {
        let conn = ExtConnection::open_in_memory(ExtensionConfig::default()).unwrap();
        conn.execute_batch("CREATE TABLE t (x); INSERT INTO t VALUES (1), (2);")
            .unwrap();
        assert_eq!(conn.changes(), 2);
        assert_eq!(conn.last_insert_rowid(), 2);
    }

    #[test]
    fn test_set_busy_timeout() {
        let mut conn = ExtConnection::open_in_memory(ExtensionConfig::default()).unwrap();
        conn.set_busy_timeout(0).unwrap();
        assert_eq!(conn.busy_timeout_ms(), 0);
        conn.set_busy_timeout(150).unwrap();
        assert_eq!(conn.busy_timeout_ms(), 150);
        assert_eq!(conn.config().connection.busy_timeout_ms, 150);
    }

    #[test]
    fn test_status_snapshot() {
        let conn = ExtConnection::open_in_memory(ExtensionConfig::default()).unwrap();
        conn.execute_batch("CREATE TABLE t (x)").unwrap();
        let snapshot = conn.status(StatusMetric::SchemaUsed, false).unwrap();
        assert!(snapshot.current > 0);
    }

    #[test]
    fn test_debug_output() {
        let mut conn = ExtConnection::open_in_memory(ExtensionConfig::default()).unwrap();
        conn.set_rollback_hook(|| {});
        let debug = format!("{:?}", conn);
        assert!(debug.contains("Memory"));
        assert!(debug.contains("rollback: true"));
    }
}
