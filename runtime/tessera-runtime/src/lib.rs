///
/// tessera-runtime - C ABI for host runtimes
///
/// Exposes the extension core through handle-based `extern "C"` entry points.
/// Two registries back the handles:
/// - CONN_REGISTRY: maps i64 handle → Arc<Mutex<ExtConnection>>
/// - BLOOM_REGISTRY: maps i64 handle → BloomFilter
///
/// Error handling:
/// - On success: return value normally and clear the thread's last error
/// - On failure: record the error in thread-local storage and return a
///   sentinel (-1 for handles and counts, 0 for booleans)
/// - Hosts read the failure back with `tessera_last_error_kind`,
///   `tessera_last_error_code` and `tessera_last_error_message`
///
/// The registry lock is only held long enough to look a handle up. Each
/// connection has its own lock, held for the whole call, so a busy handler
/// sleeping on one connection never blocks another. Hook callbacks run while
/// their connection is locked and must not call back into `tessera_conn_*`
/// with the same handle.
///

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::{Arc, LazyLock, Mutex};

use tessera_bloom::BloomFilter;
use tessera_core::{ExtError, ExtensionConfig};
use tessera_sqlite::{CommitDecision, ExtConnection, StatusMetric, UpdateKind};
use tracing::Level;

thread_local! {
    static LAST_ERROR_KIND: Cell<i32> = const { Cell::new(0) };
    static LAST_ERROR_CODE: Cell<i64> = const { Cell::new(0) };
    static LAST_ERROR_MESSAGE: RefCell<String> = const { RefCell::new(String::new()) };
}

fn set_last_error(err: &ExtError) {
    LAST_ERROR_KIND.with(|k| k.set(err.kind() as i32));
    LAST_ERROR_CODE.with(|c| c.set(err.engine_code()));
    LAST_ERROR_MESSAGE.with(|m| *m.borrow_mut() = err.to_string());
}

fn clear_last_error() {
    LAST_ERROR_KIND.with(|k| k.set(0));
    LAST_ERROR_CODE.with(|c| c.set(0));
    LAST_ERROR_MESSAGE.with(|m| m.borrow_mut().clear());
}

fn invalid_handle(kind: &str, handle: i64) -> ExtError {
    ExtError::State(format!("invalid {} handle {}", kind, handle))
}

unsafe fn bytes_from_raw<'a>(ptr: *const u8, len: usize) -> &'a [u8] {
    if ptr.is_null() || len == 0 {
        return &[];
    }
    unsafe { std::slice::from_raw_parts(ptr, len) }
}

unsafe fn string_from_raw(ptr: *const u8, len: usize) -> String {
    let bytes = unsafe { bytes_from_raw(ptr, len) };
    String::from_utf8_lossy(bytes).into_owned()
}

/// Copies `src` into the caller's buffer and returns the full length.
unsafe fn copy_out(src: &[u8], buf: *mut u8, cap: usize) -> usize {
    if !buf.is_null() {
        let n = src.len().min(cap);
        unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), buf, n) };
    }
    src.len()
}

type SharedConn = Arc<Mutex<ExtConnection>>;

struct ConnRegistry {
    connections: HashMap<i64, SharedConn>,
    next_id: i64,
}

impl ConnRegistry {
    fn new() -> Self {
        Self {
            connections: HashMap::new(),
            next_id: 1,
        }
    }

    fn insert(&mut self, conn: ExtConnection) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        self.connections.insert(id, Arc::new(Mutex::new(conn)));
        id
    }

    fn get(&self, handle: i64) -> Option<SharedConn> {
        self.connections.get(&handle).cloned()
    }
}

struct BloomRegistry {
    filters: HashMap<i64, BloomFilter>,
    next_id: i64,
}

impl BloomRegistry {
    fn new() -> Self {
        Self {
            filters: HashMap::new(),
            next_id: 1,
        }
    }

    fn insert(&mut self, filter: BloomFilter) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        self.filters.insert(id, filter);
        id
    }
}

static CONN_REGISTRY: LazyLock<Mutex<ConnRegistry>> = LazyLock::new(|| Mutex::new(ConnRegistry::new()));

static BLOOM_REGISTRY: LazyLock<Mutex<BloomRegistry>> =
    LazyLock::new(|| Mutex::new(BloomRegistry::new()));

/// Runs `f` against a registered connection, translating errors into the
/// thread-local slot. Returns `None` on failure.
///
/// The registry is released before the connection is locked.
fn with_conn<T>(handle: i64, f: impl FnOnce(&mut ExtConnection) -> Result<T, ExtError>) -> Option<T> {
    let shared = CONN_REGISTRY.lock().unwrap().get(handle);
    let result = match shared {
        Some(conn) => f(&mut *conn.lock().unwrap()),
        None => Err(invalid_handle("connection", handle)),
    };
    match result {
        Ok(value) => {
            clear_last_error();
            Some(value)
        }
        Err(e) => {
            set_last_error(&e);
            None
        }
    }
}

fn with_bloom<T>(handle: i64, f: impl FnOnce(&mut BloomFilter) -> Result<T, ExtError>) -> Option<T> {
    let mut reg = BLOOM_REGISTRY.lock().unwrap();
    let result = match reg.filters.get_mut(&handle) {
        Some(filter) => f(filter),
        None => Err(invalid_handle("bloom filter", handle)),
    };
    match result {
        Ok(value) => {
            clear_last_error();
            Some(value)
        }
        Err(e) => {
            set_last_error(&e);
            None
        }
    }
}

fn register_conn(result: Result<ExtConnection, ExtError>) -> i64 {
    match result {
        Ok(conn) => {
            clear_last_error();
            CONN_REGISTRY.lock().unwrap().insert(conn)
        }
        Err(e) => {
            set_last_error(&e);
            -1
        }
    }
}

unsafe fn load_config(ptr: *const u8, len: usize) -> Result<ExtensionConfig, ExtError> {
    if ptr.is_null() {
        return Ok(ExtensionConfig::default());
    }
    let toml = unsafe { string_from_raw(ptr, len) };
    ExtensionConfig::from_toml_str(&toml)
}

// ========================================
// Diagnostics
// ========================================

/// Installs a stderr `tracing` subscriber. Level 0 is error through 4 for
/// trace. Returns 1 if this call installed it, 0 if one already existed.
#[unsafe(no_mangle)]
pub extern "C" fn tessera_init_logging(level: i32) -> i32 {
    let level = match level {
        i32::MIN..=0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let installed = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_max_level(level)
        .try_init()
        .is_ok();
    installed as i32
}

/// Error kind of the last failed call on this thread, 0 if it succeeded.
#[unsafe(no_mangle)]
pub extern "C" fn tessera_last_error_kind() -> i32 {
    LAST_ERROR_KIND.with(|k| k.get())
}

/// SQLite result code of the last failed call, -1 for non-engine errors.
#[unsafe(no_mangle)]
pub extern "C" fn tessera_last_error_code() -> i64 {
    LAST_ERROR_CODE.with(|c| c.get())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_last_error_message(buf: *mut u8, cap: usize) -> usize {
    LAST_ERROR_MESSAGE.with(|m| unsafe { copy_out(m.borrow().as_bytes(), buf, cap) })
}

// ========================================
// Connections
// ========================================

/// Opens a file database. `config` is optional TOML; null uses defaults.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_conn_open(
    path: *const u8,
    path_len: usize,
    config: *const u8,
    config_len: usize,
) -> i64 {
    let path = unsafe { string_from_raw(path, path_len) };
    if path.is_empty() {
        set_last_error(&ExtError::Validation("database path is empty".into()));
        return -1;
    }
    register_conn(unsafe { load_config(config, config_len) }.and_then(|c| ExtConnection::open(&path, c)))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_conn_open_memory(config: *const u8, config_len: usize) -> i64 {
    register_conn(unsafe { load_config(config, config_len) }.and_then(ExtConnection::open_in_memory))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_conn_close(handle: i64) {
    let mut reg = CONN_REGISTRY.lock().unwrap();
    reg.connections.remove(&handle);
}

/// Returns 0 on success, -1 on failure.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_conn_exec(handle: i64, sql: *const u8, sql_len: usize) -> i32 {
    let sql = unsafe { string_from_raw(sql, sql_len) };
    with_conn(handle, |conn| conn.execute_batch(&sql)).map_or(-1, |_| 0)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_conn_changes(handle: i64) -> i64 {
    with_conn(handle, |conn| Ok(conn.changes() as i64)).unwrap_or(-1)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_conn_last_insert_rowid(handle: i64) -> i64 {
    with_conn(handle, |conn| Ok(conn.last_insert_rowid())).unwrap_or(-1)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_conn_reconnect(handle: i64) -> i32 {
    with_conn(handle, |conn| conn.reconnect()).map_or(-1, |_| 0)
}

/// A timeout of 0 removes the busy handler.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_conn_set_busy_timeout(handle: i64, timeout_ms: u32) -> i32 {
    with_conn(handle, |conn| conn.set_busy_timeout(timeout_ms)).map_or(-1, |_| 0)
}

/// Writes the metric's current and highwater values. Returns 0 on success.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_conn_status(
    handle: i64,
    metric: i32,
    reset: i32,
    current: *mut i64,
    highwater: *mut i64,
) -> i32 {
    let snapshot = with_conn(handle, |conn| {
        let metric = StatusMetric::from_code(metric)
            .ok_or_else(|| ExtError::Validation(format!("unknown status metric {}", metric)))?;
        conn.status(metric, reset != 0)
    });
    match snapshot {
        Some(snapshot) => {
            unsafe {
                if !current.is_null() {
                    *current = snapshot.current;
                }
                if !highwater.is_null() {
                    *highwater = snapshot.highwater;
                }
            }
            0
        }
        None => -1,
    }
}

/// Copies the whole database into the file at `path`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_backup_to_file(handle: i64, path: *const u8, path_len: usize) -> i32 {
    let path = unsafe { string_from_raw(path, path_len) };
    with_conn(handle, |conn| conn.backup_to_file(&path, None)).map_or(-1, |_| 0)
}

// ========================================
// Hooks
// ========================================

#[derive(Clone, Copy)]
struct UserData(*mut c_void);

unsafe impl Send for UserData {}
unsafe impl Sync for UserData {}

impl UserData {
    fn ptr(self) -> *mut c_void {
        self.0
    }
}

/// Nonzero return aborts the commit.
pub type CommitCallback = unsafe extern "C" fn(userdata: *mut c_void) -> i32;
pub type RollbackCallback = unsafe extern "C" fn(userdata: *mut c_void);
/// `kind` is 1 insert, 2 update, 3 delete. Strings are not NUL-terminated.
pub type UpdateCallback = unsafe extern "C" fn(
    userdata: *mut c_void,
    kind: i32,
    db: *const u8,
    db_len: usize,
    table: *const u8,
    table_len: usize,
    rowid: i64,
);

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_conn_set_commit_hook(
    handle: i64,
    callback: Option<CommitCallback>,
    userdata: *mut c_void,
) -> i32 {
    let userdata = UserData(userdata);
    with_conn(handle, |conn| {
        match callback {
            Some(cb) => conn.set_commit_hook(move || {
                if unsafe { cb(userdata.ptr()) } != 0 {
                    CommitDecision::Abort
                } else {
                    CommitDecision::Proceed
                }
            }),
            None => conn.clear_commit_hook(),
        }
        Ok(())
    })
    .map_or(-1, |_| 0)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_conn_set_rollback_hook(
    handle: i64,
    callback: Option<RollbackCallback>,
    userdata: *mut c_void,
) -> i32 {
    let userdata = UserData(userdata);
    with_conn(handle, |conn| {
        match callback {
            Some(cb) => conn.set_rollback_hook(move || unsafe { cb(userdata.ptr()) }),
            None => conn.clear_rollback_hook(),
        }
        Ok(())
    })
    .map_or(-1, |_| 0)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_conn_set_update_hook(
    handle: i64,
    callback: Option<UpdateCallback>,
    userdata: *mut c_void,
) -> i32 {
    let userdata = UserData(userdata);
    with_conn(handle, |conn| {
        match callback {
            Some(cb) => conn.set_update_hook(move |kind: UpdateKind, db: &str, table: &str, rowid: i64| unsafe {
                cb(
                    userdata.ptr(),
                    kind.code(),
                    db.as_ptr(),
                    db.len(),
                    table.as_ptr(),
                    table.len(),
                    rowid,
                )
            }),
            None => conn.clear_update_hook(),
        }
        Ok(())
    })
    .map_or(-1, |_| 0)
}

// ========================================
// Bloom filters
// ========================================

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_bloom_new(size_bytes: usize) -> i64 {
    match BloomFilter::new(size_bytes) {
        Ok(filter) => {
            clear_last_error();
            BLOOM_REGISTRY.lock().unwrap().insert(filter)
        }
        Err(e) => {
            set_last_error(&e);
            -1
        }
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_bloom_from_buffer(buf: *const u8, len: usize) -> i64 {
    let bytes = unsafe { bytes_from_raw(buf, len) };
    match BloomFilter::from_buffer(bytes) {
        Ok(filter) => {
            clear_last_error();
            BLOOM_REGISTRY.lock().unwrap().insert(filter)
        }
        Err(e) => {
            set_last_error(&e);
            -1
        }
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_bloom_free(handle: i64) {
    let mut reg = BLOOM_REGISTRY.lock().unwrap();
    reg.filters.remove(&handle);
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_bloom_add(handle: i64, key: *const u8, key_len: usize) -> i32 {
    let key = unsafe { bytes_from_raw(key, key_len) };
    with_bloom(handle, |filter| {
        filter.add(key);
        Ok(())
    })
    .map_or(-1, |_| 0)
}

/// 1 if the key may be present, 0 if it is definitely absent, -1 on error.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_bloom_contains(handle: i64, key: *const u8, key_len: usize) -> i32 {
    let key = unsafe { bytes_from_raw(key, key_len) };
    with_bloom(handle, |filter| Ok(filter.contains(key) as i32)).unwrap_or(-1)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_bloom_size(handle: i64) -> i64 {
    with_bloom(handle, |filter| Ok(filter.size_bytes() as i64)).unwrap_or(-1)
}

/// Copies the filter bits into `buf` and returns the full size. Pass a null
/// buffer to query the size first.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_bloom_to_buffer(handle: i64, buf: *mut u8, cap: usize) -> i64 {
    with_bloom(handle, |filter| Ok(unsafe { copy_out(filter.as_bytes(), buf, cap) } as i64)).unwrap_or(-1)
}

/// Filter size in bits for `n` items at false-positive rate `p`. Divide by 8,
/// rounding up, before passing it to `tessera_bloom_new`.
#[unsafe(no_mangle)]
pub extern "C" fn tessera_bloom_calculate_size(n: f64, p: f64) -> i64 {
    match BloomFilter::calculate_size(n, p) {
        Ok(size) => {
            clear_last_error();
            size as i64
        }
        Err(e) => {
            set_last_error(&e);
            -1
        }
    }
}

// ========================================
// Hashing
// ========================================

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tessera_murmurhash(key: *const u8, key_len: usize, seed: u32) -> u32 {
    let key = unsafe { bytes_from_raw(key, key_len) };
    tessera_hash::murmurhash2(key, seed)
}
