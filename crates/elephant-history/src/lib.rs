//! Durable usage history. Providers record activations per
//! `(query, identifier)` pair and bias their scores with the usage score on
//! later queries. The dispatcher core never touches this store.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rusqlite::Connection;

/// Item action honored by every provider that records history: remove the
/// identifier from the store and do nothing else.
pub const ACTION_DELETE: &str = "delete";

/// Usage entries older than this stop contributing their recency bonus.
const RECENCY_WINDOW_SECS: u64 = 60 * 60 * 24 * 7;

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One provider's usage store.
pub struct History {
    conn: Mutex<Connection>,
}

impl History {
    pub fn open(path: &Path) -> Result<Self, HistoryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn in_memory() -> Self {
        let conn = Connection::open_in_memory().expect("in-memory sqlite");
        Self::init(conn).expect("in-memory schema")
    }

    /// Open the named provider's store under the state directory. Falls back
    /// to an in-memory store when the disk store cannot be opened, so history
    /// failures never take a provider down.
    pub fn load(provider: &str) -> Self {
        let path = state_dir().join(format!("{provider}.db"));
        match Self::open(&path) {
            Ok(h) => h,
            Err(e) => {
                tracing::error!(provider = provider, error = %e, "History store unavailable, using in-memory fallback");
                Self::in_memory()
            }
        }
    }

    fn init(conn: Connection) -> Result<Self, HistoryError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             CREATE TABLE IF NOT EXISTS usage (
                 query TEXT NOT NULL,
                 identifier TEXT NOT NULL,
                 count INTEGER NOT NULL DEFAULT 0,
                 last_used INTEGER NOT NULL,
                 PRIMARY KEY (query, identifier)
             );
             CREATE INDEX IF NOT EXISTS idx_usage_identifier ON usage(identifier);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Record one activation for `(query, identifier)`.
    pub fn save(&self, query: &str, identifier: &str) {
        let conn = self.conn.lock();
        let _ = conn.execute(
            "INSERT INTO usage (query, identifier, count, last_used) VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(query, identifier)
             DO UPDATE SET count = count + 1, last_used = ?3",
            rusqlite::params![query, identifier, now()],
        );
    }

    /// Drop the identifier from the store, across all recorded queries.
    pub fn remove(&self, identifier: &str) {
        let conn = self.conn.lock();
        let _ = conn.execute("DELETE FROM usage WHERE identifier = ?1", [identifier]);
    }

    /// Usage score for biasing a fuzzy score. Exact `(query, identifier)`
    /// matches weigh most, overall identifier usage contributes a smaller
    /// share, and stale entries lose their recency bonus. Zero means the
    /// identifier has no recorded history.
    pub fn usage_score(&self, query: &str, identifier: &str) -> i32 {
        let conn = self.conn.lock();

        let exact: (i64, i64) = conn
            .query_row(
                "SELECT count, last_used FROM usage WHERE query = ?1 AND identifier = ?2",
                rusqlite::params![query, identifier],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap_or((0, 0));

        let total: i64 = conn
            .query_row(
                "SELECT COALESCE(SUM(count), 0) FROM usage WHERE identifier = ?1",
                [identifier],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if total == 0 {
            return 0;
        }

        let mut score = exact.0.min(10) * 10 + total.min(10) * 2;
        let fresh = now().saturating_sub(exact.1) <= RECENCY_WINDOW_SECS as i64;
        if exact.0 > 0 && fresh {
            score += 10;
        }
        score as i32
    }
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_STATE_HOME") {
        if !dir.is_empty() {
            return PathBuf::from(dir).join("elephant");
        }
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home).join(".local").join("state").join("elephant")
}
