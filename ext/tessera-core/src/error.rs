///
/// Extension error types.
///
/// Every fallible tessera operation returns `ExtError`. Validation and state
/// errors are raised synchronously and never retried. `Busy` is only retried
/// by the busy handler and the backup coordinator; everything the engine
/// reports otherwise arrives as `Engine` with the engine's own message.
///

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtError {
    #[error("Invalid argument: {0}")]
    Validation(String),

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Invalid state: {0}")]
    State(String),

    #[error("SQLite error {code}: {message}")]
    Engine { code: i32, message: String },

    #[error("Database is busy or locked")]
    Busy,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

pub type ExtResult<T> = Result<T, ExtError>;

/// Coarse error class, stable across the C ABI.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation = 1,
    NotFound = 2,
    State = 3,
    Engine = 4,
    Busy = 5,
    Config = 6,
    Io = 7,
}

impl ExtError {
    pub fn engine(message: impl Into<String>) -> Self {
        ExtError::Engine {
            code: rusqlite::ffi::SQLITE_ERROR,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtError::Validation(_) => ErrorKind::Validation,
            ExtError::NotFound { .. } => ErrorKind::NotFound,
            ExtError::State(_) => ErrorKind::State,
            ExtError::Engine { .. } => ErrorKind::Engine,
            ExtError::Busy => ErrorKind::Busy,
            ExtError::Config(_) => ErrorKind::Config,
            ExtError::Io(_) => ErrorKind::Io,
        }
    }

    /// Extended SQLite result code for engine errors, -1 otherwise.
    pub fn engine_code(&self) -> i64 {
        match self {
            ExtError::Engine { code, .. } => *code as i64,
            ExtError::Busy => rusqlite::ffi::SQLITE_BUSY as i64,
            _ => -1,
        }
    }

    /// Error reported from inside a virtual table callback.
    pub fn into_module_error(self) -> rusqlite::Error {
        rusqlite::Error::ModuleError(self.to_string())
    }
}

impl From<rusqlite::Error> for ExtError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(err, message) => match err.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => ExtError::Busy,
                _ => ExtError::Engine {
                    code: err.extended_code,
                    message: message.unwrap_or_else(|| err.to_string()),
                },
            },
            other => ExtError::engine(other.to_string()),
        }
    }
}

/// Errors returned from scalar and aggregate functions abort the calling
/// statement with the error's message.
impl From<ExtError> for rusqlite::Error {
    fn from(e: ExtError) -> Self {
        rusqlite::Error::UserFunctionError(Box::new(e))
    }
}
