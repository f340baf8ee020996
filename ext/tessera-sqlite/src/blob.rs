///
/// Incremental blob streaming.
///
/// `BlobStream` is a cursor over one BLOB cell addressed by
/// (schema, table, column, rowid). The length is fixed at open time:
/// writes never grow the cell, so callers allocate it first with
/// `zeroblob(n)` and then fill it in.
///
/// - Reads past the end return fewer bytes (or none), never an error.
/// - Writes past the end are rejected before touching the engine.
/// - If the row changes underneath an open handle the engine aborts the
///   next read; the handle is closed and the error surfaces.
/// - Any use after `close` is a state error.
///

use rusqlite::blob::Blob;
use rusqlite::{Connection, DatabaseName};
use tracing::{trace, warn};

use tessera_core::{ExtError, ExtResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

impl Whence {
    /// Maps the POSIX `SEEK_SET`/`SEEK_CUR`/`SEEK_END` codes.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Whence::Start),
            1 => Some(Whence::Current),
            2 => Some(Whence::End),
            _ => None,
        }
    }
}

pub struct BlobStream<'conn> {
    blob: Option<Blob<'conn>>,
    table: String,
    column: String,
    rowid: i64,
    read_only: bool,
    length: usize,
    offset: usize,
}

pub(crate) fn database_name(schema: &str) -> DatabaseName<'_> {
    match schema {
        "" | "main" => DatabaseName::Main,
        "temp" => DatabaseName::Temp,
        other => DatabaseName::Attached(other),
    }
}

/// The engine reports missing rows, tables and columns as plain errors
/// whose message starts with "no such".
fn map_open_error(err: rusqlite::Error) -> ExtError {
    if let rusqlite::Error::SqliteFailure(_, Some(message)) = &err {
        if message.starts_with("no such") {
            return ExtError::NotFound {
                what: message.clone(),
            };
        }
    }
    ExtError::from(err)
}

impl<'conn> BlobStream<'conn> {
    pub fn open(
        conn: &'conn Connection,
        schema: &str,
        table: &str,
        column: &str,
        rowid: i64,
        read_only: bool,
    ) -> ExtResult<Self> {
        let blob = conn
            .blob_open(database_name(schema), table, column, rowid, read_only)
            .map_err(map_open_error)?;
        let length = blob.len();
        trace!(table, column, rowid, length, read_only, "blob opened");
        Ok(Self {
            blob: Some(blob),
            table: table.to_string(),
            column: column.to_string(),
            rowid,
            read_only,
            length,
            offset: 0,
        })
    }

    pub fn len(&self) -> ExtResult<usize> {
        self.live()?;
        Ok(self.length)
    }

    pub fn is_empty(&self) -> ExtResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn tell(&self) -> ExtResult<usize> {
        self.live()?;
        Ok(self.offset)
    }

    pub fn rowid(&self) -> i64 {
        self.rowid
    }

    pub fn is_closed(&self) -> bool {
        self.blob.is_none()
    }

    /// Reads up to `n` bytes from the current offset.
    pub fn read(&mut self, n: usize) -> ExtResult<Vec<u8>> {
        self.live()?;
        let take = n.min(self.length - self.offset);
        if take == 0 {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; take];
        let result = match &self.blob {
            Some(blob) => blob.read_at_exact(&mut buf, self.offset),
            None => return Err(closed()),
        };
        if let Err(e) = result {
            warn!(table = %self.table, rowid = self.rowid, error = %e, "blob read failed, closing handle");
            self.blob = None;
            return Err(ExtError::from(e));
        }
        self.offset += take;
        Ok(buf)
    }

    /// Reads from the current offset to the end.
    pub fn read_all(&mut self) -> ExtResult<Vec<u8>> {
        self.live()?;
        let remaining = self.length - self.offset;
        self.read(remaining)
    }

    pub fn seek(&mut self, offset: i64, whence: Whence) -> ExtResult<usize> {
        self.live()?;
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => self.offset as i64,
            Whence::End => self.length as i64,
        };
        let target = base.checked_add(offset).ok_or_else(|| {
            ExtError::Validation(format!("seek offset {} overflows", offset))
        })?;
        if target < 0 || target as usize > self.length {
            return Err(ExtError::Validation(format!(
                "seek position {} outside blob of length {}",
                target, self.length
            )));
        }
        self.offset = target as usize;
        Ok(self.offset)
    }

    pub fn write(&mut self, data: &[u8]) -> ExtResult<()> {
        self.live()?;
        if self.read_only {
            return Err(ExtError::State("blob was opened read-only".to_string()));
        }
        let end = self.offset.checked_add(data.len());
        if end.map(|end| end > self.length).unwrap_or(true) {
            return Err(ExtError::Validation(format!(
                "write of {} bytes at offset {} exceeds blob length {}",
                data.len(),
                self.offset,
                self.length
            )));
        }
        if data.is_empty() {
            return Ok(());
        }
        let result = match self.blob.as_mut() {
            Some(blob) => blob.write_at(data, self.offset),
            None => return Err(closed()),
        };
        if let Err(e) = result {
            warn!(table = %self.table, rowid = self.rowid, error = %e, "blob write failed, closing handle");
            self.blob = None;
            return Err(ExtError::from(e));
        }
        self.offset += data.len();
        Ok(())
    }

    /// Closes the handle. Closing twice is a no-op.
    pub fn close(&mut self) -> ExtResult<()> {
        match self.blob.take() {
            Some(blob) => {
                trace!(table = %self.table, rowid = self.rowid, "blob closed");
                blob.close().map_err(ExtError::from)
            }
            None => Ok(()),
        }
    }

    /// Moves the handle to another row of the same table and column,
    /// resetting the offset. A failed reopen closes the handle.
    pub fn reopen(&mut self, rowid: i64) -> ExtResult<()> {
        let blob = self.blob.as_mut().ok_or_else(closed)?;
        match blob.reopen(rowid) {
            Ok(()) => {
                self.length = blob.len();
                self.rowid = rowid;
                self.offset = 0;
                trace!(table = %self.table, column = %self.column, rowid, "blob reopened");
                Ok(())
            }
            Err(e) => {
                // The engine handle is aborted after a failed reopen.
                self.blob = None;
                Err(map_open_error(e))
            }
        }
    }

    fn live(&self) -> ExtResult<()> {
        if self.blob.is_none() {
            return Err(closed());
        }
        Ok(())
    }
}

fn closed() -> ExtError {
    ExtError::State("blob handle is closed".to_string())
}
