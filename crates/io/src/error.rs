use std::fmt;
use std::path::PathBuf;

/// A statement failed. Reported to the user as-is, never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError {
    /// Primary SQLite result code name (`SQLITE_ERROR`, `SQLITE_READONLY`, ...)
    /// when the failure came from the engine itself.
    pub code: Option<String>,
    pub message: String,
}

impl QueryError {
    pub fn new(code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for QueryError {}

impl From<rusqlite::Error> for QueryError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, msg) => Self {
                code: Some(primary_code_name(err.extended_code).to_string()),
                message: msg.clone().unwrap_or_else(|| err.to_string()),
            },
            _ => Self {
                code: None,
                message: e.to_string(),
            },
        }
    }
}

/// Symbolic name of the primary result code inside an extended code.
pub fn primary_code_name(extended_code: i32) -> &'static str {
    match extended_code & 0xff {
        1 => "SQLITE_ERROR",
        2 => "SQLITE_INTERNAL",
        3 => "SQLITE_PERM",
        4 => "SQLITE_ABORT",
        5 => "SQLITE_BUSY",
        6 => "SQLITE_LOCKED",
        7 => "SQLITE_NOMEM",
        8 => "SQLITE_READONLY",
        9 => "SQLITE_INTERRUPT",
        10 => "SQLITE_IOERR",
        11 => "SQLITE_CORRUPT",
        12 => "SQLITE_NOTFOUND",
        13 => "SQLITE_FULL",
        14 => "SQLITE_CANTOPEN",
        15 => "SQLITE_PROTOCOL",
        16 => "SQLITE_EMPTY",
        17 => "SQLITE_SCHEMA",
        18 => "SQLITE_TOOBIG",
        19 => "SQLITE_CONSTRAINT",
        20 => "SQLITE_MISMATCH",
        21 => "SQLITE_MISUSE",
        22 => "SQLITE_NOLFS",
        23 => "SQLITE_AUTH",
        24 => "SQLITE_FORMAT",
        25 => "SQLITE_RANGE",
        26 => "SQLITE_NOTADB",
        27 => "SQLITE_NOTICE",
        28 => "SQLITE_WARNING",
        _ => "SQLITE_UNKNOWN",
    }
}

/// A snapshot could not be opened or locked down.
#[derive(Debug)]
pub enum StorageError {
    /// The user id cannot name a snapshot file
    InvalidUser(String),
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },
    Configure {
        path: PathBuf,
        source: rusqlite::Error,
    },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::InvalidUser(user) => write!(f, "invalid user id {:?}", user),
            StorageError::Open { path, source } => {
                write!(f, "cannot open snapshot {}: {}", path.display(), source)
            }
            StorageError::Configure { path, source } => {
                write!(f, "cannot make snapshot {} read-only: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::InvalidUser(_) => None,
            StorageError::Open { source, .. } | StorageError::Configure { source, .. } => Some(source),
        }
    }
}
