//! Per-user read-only query channels.
//!
//! Each user gets exactly one [`Channel`], opened lazily and cached by the
//! [`ChannelRegistry`] for the life of the process. A channel's connection
//! is read-only at the engine level: opened with `SQLITE_OPEN_READ_ONLY`,
//! `query_only` switched on, and `ATTACH` disabled, so it can neither write
//! nor reach another user's snapshot.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::limits::Limit;
use rusqlite::types::ValueRef;
use rusqlite::{Batch, Connection, OpenFlags};
use zoopeek_core::{CellValue, ResultSet, Row};

use crate::error::{QueryError, StorageError};

/// Stable identity of a logical user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where each user's snapshot lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotLayout {
    /// Every user reads the same snapshot file
    Shared(PathBuf),
    /// `<dir>/<user>.sqlite`
    PerUser { dir: PathBuf },
}

impl SnapshotLayout {
    pub fn path_for(&self, user: &UserId) -> Result<PathBuf, StorageError> {
        match self {
            SnapshotLayout::Shared(path) => Ok(path.clone()),
            SnapshotLayout::PerUser { dir } => {
                let id = user.as_str();
                let valid = !id.is_empty()
                    && id != "."
                    && id != ".."
                    && !id.contains(['/', '\\', '\0']);
                if !valid {
                    return Err(StorageError::InvalidUser(id.to_string()));
                }
                Ok(dir.join(format!("{}.sqlite", id)))
            }
        }
    }
}

/// Message for text that holds only whitespace and comments.
pub const NO_STATEMENT: &str = "no statement to execute";

/// A read-only execution handle bound to one user's snapshot.
///
/// Statements on one channel run one at a time.
#[derive(Debug)]
pub struct Channel {
    user: UserId,
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl Channel {
    /// Open `path` read-only. The file must already exist.
    pub fn open(user: UserId, path: &Path) -> Result<Self, StorageError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags).map_err(|source| StorageError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        conn.pragma_update(None, "query_only", true)
            .map_err(|source| StorageError::Configure {
                path: path.to_path_buf(),
                source,
            })?;
        // Zero attached databases: no ATTACH of another snapshot
        let _ = conn.set_limit(Limit::SQLITE_LIMIT_ATTACHED, 0);

        log::debug!("opened channel for {} on {}", user, path.display());
        Ok(Self {
            user,
            path: path.to_path_buf(),
            conn: Mutex::new(conn),
        })
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run one SQL statement and materialize its result. Text holding no
    /// statement, or more than one, is refused without running anything.
    pub fn execute(&self, sql: &str) -> Result<ResultSet, QueryError> {
        let conn = self.conn.lock();
        let mut batch = Batch::new(&conn, sql);
        let Some(mut stmt) = batch.next()? else {
            return Err(QueryError::new(None, NO_STATEMENT));
        };
        if batch.next()?.is_some() {
            return Err(rusqlite::Error::MultipleStatement.into());
        }

        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let n = columns.len();

        let mut rows: Vec<Row> = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let mut cells = Vec::with_capacity(n);
            for i in 0..n {
                cells.push(cell_value(row.get_ref(i)?));
            }
            rows.push(cells);
        }

        ResultSet::new(columns, rows).map_err(|e| QueryError::new(None, e.to_string()))
    }
}

fn cell_value(v: ValueRef<'_>) -> CellValue {
    match v {
        ValueRef::Null => CellValue::Null,
        ValueRef::Integer(i) => CellValue::Integer(i),
        ValueRef::Real(f) => CellValue::Real(f),
        ValueRef::Text(t) => CellValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => CellValue::Blob(b.to_vec()),
    }
}

/// Lazily opened, cached channels keyed by user.
#[derive(Debug)]
pub struct ChannelRegistry {
    layout: SnapshotLayout,
    channels: Mutex<HashMap<UserId, Arc<Channel>>>,
}

impl ChannelRegistry {
    pub fn new(layout: SnapshotLayout) -> Self {
        Self {
            layout,
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn layout(&self) -> &SnapshotLayout {
        &self.layout
    }

    /// The user's channel, opening it on first use.
    pub fn channel(&self, user: &UserId) -> Result<Arc<Channel>, StorageError> {
        if let Some(ch) = self.channels.lock().get(user) {
            log::debug!("reusing channel for {}", user);
            return Ok(Arc::clone(ch));
        }

        // Open without holding the map lock so other users aren't blocked
        let path = self.layout.path_for(user)?;
        let opened = Arc::new(Channel::open(user.clone(), &path)?);

        // Another request for the same user may have won the race; keep theirs
        let mut channels = self.channels.lock();
        let ch = channels.entry(user.clone()).or_insert(opened);
        Ok(Arc::clone(ch))
    }

    /// Drop the cached channel for `user`. The next request reopens it.
    /// Returns whether a channel was cached.
    pub fn invalidate(&self, user: &UserId) -> bool {
        let removed = self.channels.lock().remove(user).is_some();
        if removed {
            log::debug!("invalidated channel for {}", user);
        }
        removed
    }

    /// Number of cached channels.
    pub fn len(&self) -> usize {
        self.channels.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
