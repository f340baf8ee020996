///
/// Jittered busy handler.
///
/// When a lock cannot be taken the engine calls the busy handler with the
/// number of prior attempts `n`. The handler either sleeps and asks for a
/// retry, or gives up so the statement fails with SQLITE_BUSY.
///
/// Sleep bands (milliseconds, `r` a fresh random number):
///
/// | attempts | sleep          | estimated time already slept |
/// |----------|----------------|------------------------------|
/// | n < 20   | 25 - r % 10    | 20 n                         |
/// | n < 40   | 50 - r % 20    | 400 + 40 (n - 20)            |
/// | n >= 40  | 120 - r % 40   | 1200 + 100 (n - 40)          |
///
/// If sleeping the full amount would pass the timeout, only the remainder
/// is slept; once nothing remains the handler gives up.
///

use std::os::raw::{c_int, c_void};
use std::time::Duration;

use rand::Rng;
use rusqlite::{ffi, Connection};
use tracing::{trace, warn};

use tessera_core::{ExtError, ExtResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyPolicy {
    timeout_ms: u32,
}

impl BusyPolicy {
    pub fn new(timeout_ms: u32) -> Self {
        Self { timeout_ms }
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    /// Milliseconds to sleep before retry `attempt`, or `None` to give up.
    pub fn sleep_for(&self, attempt: i32, random: u32) -> Option<u32> {
        let n = attempt.max(0) as i64;
        let (current, total) = if n < 20 {
            (25 - (random % 10) as i64, 20 * n)
        } else if n < 40 {
            (50 - (random % 20) as i64, 400 + 40 * (n - 20))
        } else {
            (120 - (random % 40) as i64, 1200 + 100 * (n - 40))
        };

        let timeout = self.timeout_ms as i64;
        let current = if total + current > timeout {
            timeout - total
        } else {
            current
        };

        if current > 0 {
            Some(current as u32)
        } else {
            None
        }
    }

    pub fn next_sleep<R: Rng>(&self, attempt: i32, rng: &mut R) -> Option<Duration> {
        self.sleep_for(attempt, rng.r#gen::<u32>())
            .map(|ms| Duration::from_millis(ms as u64))
    }
}

unsafe extern "C" fn busy_callback(policy: *mut c_void, attempt: c_int) -> c_int {
    if policy.is_null() {
        return 0;
    }
    let policy = unsafe { &*(policy as *const BusyPolicy) };
    match policy.next_sleep(attempt, &mut rand::thread_rng()) {
        Some(sleep) => {
            trace!(attempt, sleep_ms = sleep.as_millis() as u64, "database busy, retrying");
            std::thread::sleep(sleep);
            1
        }
        None => {
            warn!(attempt, timeout_ms = policy.timeout_ms, "busy timeout exhausted");
            0
        }
    }
}

/// Installs `policy` as the busy handler of `conn`.
///
/// The engine keeps a raw pointer to `policy`: the caller must keep it
/// alive until the handler is cleared or the connection is closed.
pub(crate) fn install(conn: &Connection, policy: &BusyPolicy) -> ExtResult<()> {
    let rc = unsafe {
        ffi::sqlite3_busy_handler(
            conn.handle(),
            Some(busy_callback),
            policy as *const BusyPolicy as *mut c_void,
        )
    };
    if rc != ffi::SQLITE_OK {
        return Err(ExtError::Engine {
            code: rc,
            message: "failed to install busy handler".to_string(),
        });
    }
    Ok(())
}

pub(crate) fn clear(conn: &Connection) -> ExtResult<()> {
    let rc = unsafe { ffi::sqlite3_busy_handler(conn.handle(), None, std::ptr::null_mut()) };
    if rc != ffi::SQLITE_OK {
        return Err(ExtError::Engine {
            code: rc,
            message: "failed to clear busy handler".to_string(),
        });
    }
    Ok(())
}
