//! libSQL backend: the reference `MessageStore` implementation.
//!
//! The index only records what the pipelines consume: a message id, the
//! path of its file and its tags. Supports local file and in-memory
//! databases.

use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::params::Params;
use libsql::{Connection, Database as LibSqlDatabase, Value, params};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::lock::{WriterLock, lock_path_for};
use crate::store::migrations;
use crate::store::search::SearchExpr;
use crate::store::traits::{AccessMode, Message, MessageCursor, MessageStore, Query, StoreSession};

/// Savepoint name used while a message is frozen.
const TAG_BATCH_SAVEPOINT: &str = "tag_batch";

/// libSQL message index.
///
/// Stores a single connection that is shared by every session and message
/// handle. `libsql::Connection` is `Send + Sync` and cheap to clone.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    /// Lock file guarding writers across processes; `None` in memory.
    lock_path: Option<PathBuf>,
    /// Guards writers within this process.
    writer: Arc<Mutex<()>>,
}

impl LibSqlStore {
    /// Open (or create) a local index file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Open(format!("Failed to create index directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
            lock_path: Some(lock_path_for(path)),
            writer: Arc::new(Mutex::new(())),
        };
        store.init_schema().await?;
        info!(path = %path.display(), "Message index opened");
        Ok(store)
    }

    /// Create an in-memory index (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to create in-memory database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
            lock_path: None,
            writer: Arc::new(Mutex::new(())),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| StoreError::Open(format!("Failed to enable foreign keys: {e}")))?;
        migrations::run_migrations(&self.conn).await
    }

    /// Open a session with its concrete type, for index maintenance.
    pub async fn open_session(&self, mode: AccessMode) -> Result<LibSqlSession, StoreError> {
        let guard = match mode {
            AccessMode::ReadOnly => None,
            AccessMode::ReadWrite => Some(self.acquire_writer()?),
        };
        debug!(%mode, "Store session opened");
        Ok(LibSqlSession {
            conn: self.conn.clone(),
            mode,
            _guard: guard,
        })
    }

    fn acquire_writer(&self) -> Result<WriterGuard, StoreError> {
        let local = Arc::clone(&self.writer)
            .try_lock_owned()
            .map_err(|_| StoreError::Locked {
                path: self
                    .lock_path
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(":memory:")),
            })?;
        let file = match &self.lock_path {
            Some(path) => Some(WriterLock::acquire(path)?),
            None => None,
        };
        Ok(WriterGuard {
            _local: local,
            _file: file,
        })
    }
}

#[async_trait]
impl MessageStore for LibSqlStore {
    async fn open(&self, mode: AccessMode) -> Result<Box<dyn StoreSession>, StoreError> {
        Ok(Box::new(self.open_session(mode).await?))
    }
}

/// Both halves of the writer exclusion; released together on drop.
struct WriterGuard {
    _local: OwnedMutexGuard<()>,
    _file: Option<WriterLock>,
}

/// An open session on the index.
pub struct LibSqlSession {
    conn: Connection,
    mode: AccessMode,
    _guard: Option<WriterGuard>,
}

impl LibSqlSession {
    fn require_writable(&self, operation: &str) -> Result<(), StoreError> {
        require_writable(self.mode, operation)
    }

    /// Record a message with its initial tags.
    ///
    /// Returns `false` without touching anything when the id or the path is
    /// already indexed.
    pub async fn add_message(
        &self,
        id: &str,
        path: &Path,
        tags: &[String],
    ) -> Result<bool, StoreError> {
        self.require_writable("add message")?;

        self.exec("SAVEPOINT add_message", ()).await?;
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO messages (id, path, indexed_at) VALUES (?1, ?2, ?3)",
                params![id, path.to_string_lossy().to_string(), Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("add_message: {e}")));

        let inserted = match inserted {
            Ok(n) => n > 0,
            Err(e) => {
                let _ = self.exec("ROLLBACK TO add_message", ()).await;
                let _ = self.exec("RELEASE add_message", ()).await;
                return Err(e);
            }
        };

        if inserted {
            for tag in tags {
                if let Err(e) = insert_tag(&self.conn, id, tag).await {
                    let _ = self.exec("ROLLBACK TO add_message", ()).await;
                    let _ = self.exec("RELEASE add_message", ()).await;
                    return Err(e);
                }
            }
        }
        self.exec("RELEASE add_message", ()).await?;

        debug!(id, path = %path.display(), inserted, "Message indexed");
        Ok(inserted)
    }

    async fn exec(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<(), StoreError> {
        self.conn
            .execute(sql, params)
            .await
            .map_err(|e| StoreError::Query(format!("{sql}: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl StoreSession for LibSqlSession {
    fn mode(&self) -> AccessMode {
        self.mode
    }

    async fn query(&self, search: &str) -> Result<Query, StoreError> {
        let (condition, values) = SearchExpr::parse(search)?.to_sql();
        let sql = format!("SELECT m.id, m.path FROM messages m WHERE {condition} ORDER BY m.rowid");
        let params = Params::Positional(values.into_iter().map(Value::Text).collect());

        let mut rows = self
            .conn
            .query(&sql, params)
            .await
            .map_err(|e| StoreError::Query(format!("search '{search}': {e}")))?;

        let mut matches = VecDeque::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("search '{search}': {e}")))?
        {
            let id: String = row
                .get(0)
                .map_err(|e| StoreError::Query(format!("row parse: {e}")))?;
            let path: String = row
                .get(1)
                .map_err(|e| StoreError::Query(format!("row parse: {e}")))?;
            matches.push_back((id, PathBuf::from(path)));
        }

        debug!(search, count = matches.len(), "Search complete");
        Ok(Query {
            count: matches.len(),
            messages: Box::new(LibSqlCursor {
                conn: self.conn.clone(),
                mode: self.mode,
                pending: matches,
            }),
        })
    }

    async fn close(self: Box<Self>) -> Result<(), StoreError> {
        debug!(mode = %self.mode, "Store session closed");
        Ok(())
    }
}

/// Cursor over a search snapshot; handles are built as they are pulled.
struct LibSqlCursor {
    conn: Connection,
    mode: AccessMode,
    pending: VecDeque<(String, PathBuf)>,
}

#[async_trait]
impl MessageCursor for LibSqlCursor {
    async fn next(&mut self) -> Result<Option<Box<dyn Message>>, StoreError> {
        Ok(self.pending.pop_front().map(|(id, path)| {
            Box::new(LibSqlMessage {
                conn: self.conn.clone(),
                mode: self.mode,
                id,
                path,
            }) as Box<dyn Message>
        }))
    }
}

/// Handle to one indexed message.
pub struct LibSqlMessage {
    conn: Connection,
    mode: AccessMode,
    id: String,
    path: PathBuf,
}

#[async_trait]
impl Message for LibSqlMessage {
    fn id(&self) -> &str {
        &self.id
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn tags(&self) -> Result<BTreeSet<String>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT tag FROM tags WHERE message_id = ?1 ORDER BY tag",
                params![self.id.as_str()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("tags: {e}")))?;

        let mut tags = BTreeSet::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("tags: {e}")))?
        {
            let tag: String = row
                .get(0)
                .map_err(|e| StoreError::Query(format!("row parse: {e}")))?;
            tags.insert(tag);
        }
        Ok(tags)
    }

    async fn add_tag(&self, tag: &str) -> Result<(), StoreError> {
        require_writable(self.mode, "add tag")?;
        insert_tag(&self.conn, &self.id, tag).await
    }

    async fn remove_tag(&self, tag: &str) -> Result<(), StoreError> {
        require_writable(self.mode, "remove tag")?;
        self.conn
            .execute(
                "DELETE FROM tags WHERE message_id = ?1 AND tag = ?2",
                params![self.id.as_str(), tag],
            )
            .await
            .map_err(|e| StoreError::Query(format!("remove_tag: {e}")))?;
        Ok(())
    }

    async fn freeze(&self) -> Result<(), StoreError> {
        require_writable(self.mode, "freeze message")?;
        self.conn
            .execute(&format!("SAVEPOINT {TAG_BATCH_SAVEPOINT}"), ())
            .await
            .map_err(|e| StoreError::Query(format!("freeze: {e}")))?;
        Ok(())
    }

    async fn thaw(&self) -> Result<(), StoreError> {
        require_writable(self.mode, "thaw message")?;
        self.conn
            .execute(&format!("RELEASE {TAG_BATCH_SAVEPOINT}"), ())
            .await
            .map_err(|e| StoreError::Query(format!("thaw: {e}")))?;
        Ok(())
    }
}

async fn insert_tag(conn: &Connection, id: &str, tag: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR IGNORE INTO tags (message_id, tag) VALUES (?1, ?2)",
        params![id, tag],
    )
    .await
    .map_err(|e| StoreError::Query(format!("add_tag: {e}")))?;
    Ok(())
}

fn require_writable(mode: AccessMode, operation: &str) -> Result<(), StoreError> {
    match mode {
        AccessMode::ReadWrite => Ok(()),
        AccessMode::ReadOnly => Err(StoreError::ReadOnly {
            operation: operation.to_string(),
        }),
    }
}
