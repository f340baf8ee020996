///
/// tessera-sqlite - SQLite Extension Layer
///
/// Everything that talks to the engine through rusqlite lives here:
///
/// - `ExtConnection`: owns a connection and reinstalls hooks, busy policy,
///   SQL functions and table functions after every reconnect
/// - Table functions: host `RowSource` iterators exposed as eponymous
///   virtual tables (`SELECT * FROM series(0, 10, 2)`)
/// - `BlobStream`: offset-addressed reads and writes on a single BLOB cell
/// - `backup` / `backup_to_file`: stepwise online backup with progress
/// - `HookSlots`: commit, rollback and update hooks
/// - `BusyPolicy`: jittered lock-retry handler
/// - `db_status`: per-connection runtime counters
/// - `register_functions`: hash, ranking and Bloom filter SQL functions
///
/// Everything here is confined to the thread that owns the connection.
/// Callbacks run synchronously on that thread.
///

pub mod backup;
pub mod blob;
pub mod busy;
pub mod connection;
pub mod functions;
pub mod hooks;
pub mod status;
pub mod table_function;
mod vtab;

pub use backup::{backup, backup_to_file, BackupOptions, BackupProgress, ProgressFn};
pub use blob::{BlobStream, Whence};
pub use busy::BusyPolicy;
pub use connection::{ConnectionTarget, ExtConnection};
pub use functions::register_functions;
pub use hooks::{CommitDecision, HookSlots, UpdateKind};
pub use status::{db_status, StatusMetric, StatusSnapshot};
pub use table_function::{RowSource, Step, TableFunction};
