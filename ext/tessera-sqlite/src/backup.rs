///
/// Online backup.
///
/// Copies a database page by page into another connection while the
/// source stays usable. Each step copies `pages_per_step` pages (`-1` for
/// all remaining) and reports progress. A busy or locked source makes the
/// coordinator sleep for `retry_sleep` and try again; only completion, an
/// engine error, or an error returned by the progress callback ends the
/// loop. On every exit path the engine backup handle is finished before
/// control returns.
///

use std::path::Path;
use std::thread;
use std::time::Duration;

use rusqlite::backup::{Backup, StepResult};
use rusqlite::{Connection, DatabaseName};
use tracing::{debug, trace, warn};

use tessera_core::{BackupConfig, ExtResult};

use crate::blob::database_name;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOptions {
    pub pages_per_step: i32,
    /// Source schema (`main`, `temp` or an attached name).
    pub schema: String,
    pub retry_sleep: Duration,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            pages_per_step: -1,
            schema: "main".to_string(),
            retry_sleep: Duration::from_millis(250),
        }
    }
}

impl From<&BackupConfig> for BackupOptions {
    fn from(config: &BackupConfig) -> Self {
        Self {
            pages_per_step: config.pages_per_step,
            retry_sleep: config.retry_sleep(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupProgress {
    pub remaining: i32,
    pub total: i32,
    pub done: bool,
}

pub type ProgressFn<'a> = &'a mut dyn FnMut(BackupProgress) -> ExtResult<()>;

pub fn backup(
    src: &Connection,
    dst: &mut Connection,
    options: &BackupOptions,
    mut progress: Option<ProgressFn<'_>>,
) -> ExtResult<()> {
    let handle = Backup::new_with_names(
        src,
        database_name(&options.schema),
        dst,
        DatabaseName::Main,
    )?;
    let mut steps = 0u64;

    loop {
        let result = handle.step(options.pages_per_step)?;
        steps += 1;

        let p = handle.progress();
        let done = matches!(result, StepResult::Done);
        let report = BackupProgress {
            remaining: p.remaining,
            total: p.pagecount,
            done,
        };
        trace!(step = steps, remaining = p.remaining, total = p.pagecount, "backup step");

        if let Some(callback) = progress.as_mut() {
            if let Err(e) = callback(report) {
                drop(handle);
                warn!(step = steps, error = %e, "backup stopped by progress callback");
                return Err(e);
            }
        }

        match result {
            StepResult::Done => break,
            StepResult::More => {}
            StepResult::Busy | StepResult::Locked => {
                trace!(retry_ms = options.retry_sleep.as_millis() as u64, "backup source busy");
                thread::sleep(options.retry_sleep);
            }
            #[allow(unreachable_patterns)]
            _ => {}
        }
    }

    debug!(steps, schema = %options.schema, "backup complete");
    Ok(())
}

/// Backs up into a fresh connection on `path`, closed on return.
pub fn backup_to_file(
    src: &Connection,
    path: &Path,
    options: &BackupOptions,
    progress: Option<ProgressFn<'_>>,
) -> ExtResult<()> {
    let mut dst = Connection::open(path)?;
    backup(src, &mut dst, options, progress)
}
