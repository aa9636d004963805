use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kvetch_shard::{ShardError, ShardResult};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::debug;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Where a pool's connections point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Location {
    File(PathBuf),
    /// A private in-memory database; only ever one connection wide.
    Memory,
}

/// Fixed set of SQLite connections handed out round-robin.
///
/// Each connection sits behind its own mutex and is only ever touched from
/// blocking worker threads via [`ConnectionPool::run`].
pub struct ConnectionPool {
    location: Location,
    connections: Vec<Arc<Mutex<Connection>>>,
    next: AtomicUsize,
}

impl ConnectionPool {
    /// Open `size` connections to the database file at `path`.
    pub fn open(path: impl AsRef<Path>, size: usize) -> ShardResult<Self> {
        let path = path.as_ref().to_path_buf();
        let size = size.max(1);
        let mut connections = Vec::with_capacity(size);
        for _ in 0..size {
            let conn = Connection::open(&path).map_err(|e| ShardError::backend("open", e))?;
            configure(&conn)?;
            connections.push(Arc::new(Mutex::new(conn)));
        }
        debug!(path = %path.display(), size, "opened sqlite pool");
        Ok(Self {
            location: Location::File(path),
            connections,
            next: AtomicUsize::new(0),
        })
    }

    /// A single connection to a fresh in-memory database.
    pub fn in_memory() -> ShardResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| ShardError::backend("open", e))?;
        Ok(Self {
            location: Location::Memory,
            connections: vec![Arc::new(Mutex::new(conn))],
            next: AtomicUsize::new(0),
        })
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn size(&self) -> usize {
        self.connections.len()
    }

    fn checkout(&self) -> Arc<Mutex<Connection>> {
        let slot = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        Arc::clone(&self.connections[slot])
    }

    /// Run `f` against one connection on the blocking thread pool.
    pub async fn run<T, F>(&self, operation: &'static str, f: F) -> ShardResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> ShardResult<T> + Send + 'static,
    {
        let conn = self.checkout();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| ShardError::backend(operation, "connection lock poisoned"))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| ShardError::backend(operation, e))?
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("location", &self.location)
            .field("size", &self.connections.len())
            .finish()
    }
}

/// Begin a transaction that takes the write lock up front.
///
/// A deferred transaction that reads first and writes later cannot wait on
/// `busy_timeout` when another connection holds the lock; SQLite fails the
/// upgrade at once. Read-modify-write paths must start here.
pub(crate) fn begin_write<'c>(
    conn: &'c mut Connection,
    operation: &'static str,
) -> ShardResult<Transaction<'c>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| ShardError::backend(operation, e))
}

fn configure(conn: &Connection) -> ShardResult<()> {
    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(|e| ShardError::backend("configure", e))?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
        .map_err(|e| ShardError::backend("configure", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_pool_is_one_wide() {
        let pool = ConnectionPool::in_memory().unwrap();
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.location(), &Location::Memory);
        let answer: i64 = pool
            .run("probe", |conn| {
                conn.query_row("SELECT 41 + 1", [], |row| row.get(0))
                    .map_err(|e| ShardError::backend("probe", e))
            })
            .await
            .unwrap();
        assert_eq!(answer, 42);
    }

    #[tokio::test]
    async fn file_pool_rotates_connections() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ConnectionPool::open(dir.path().join("shard.db"), 3).unwrap();
        assert_eq!(pool.size(), 3);
        pool.run("create", |conn| {
            conn.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1);")
                .map_err(|e| ShardError::backend("create", e))
        })
        .await
        .unwrap();
        // every connection sees the committed table
        for _ in 0..3 {
            let count: i64 = pool
                .run("count", |conn| {
                    conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
                        .map_err(|e| ShardError::backend("count", e))
                })
                .await
                .unwrap();
            assert_eq!(count, 1);
        }
    }

    #[test]
    fn zero_width_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ConnectionPool::open(dir.path().join("one.db"), 0).unwrap();
        assert_eq!(pool.size(), 1);
    }
}
