//! Adds mail files to the libSQL index.
//!
//! Directories are walked recursively (dot-entries skipped), so a maildir
//! root, a single folder or individual files can all be passed in.

use std::path::{Path, PathBuf};

use mail_parser::MessageParser;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::libsql_backend::LibSqlSession;

/// Totals from one indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub added: usize,
    pub duplicates: usize,
    /// Files that could not be parsed as mail.
    pub skipped: usize,
}

/// Index every mail file under `root`.
pub async fn index_path(
    session: &LibSqlSession,
    root: &Path,
    new_tags: &[String],
) -> Result<IndexReport, StoreError> {
    let root = fs::canonicalize(root).await?;
    let mut report = IndexReport::default();
    let mut stack: Vec<PathBuf> = vec![root];

    while let Some(path) = stack.pop() {
        let metadata = fs::metadata(&path).await?;
        if metadata.is_dir() {
            let mut dir = fs::read_dir(&path).await?;
            let mut children = Vec::new();
            while let Some(entry) = dir.next_entry().await? {
                if entry.file_name().to_string_lossy().starts_with('.') {
                    continue;
                }
                children.push(entry.path());
            }
            // Popped in name order.
            children.sort_unstable_by(|a, b| b.cmp(a));
            stack.extend(children);
        } else if metadata.is_file() {
            index_file(session, &path, new_tags, &mut report).await?;
        }
    }

    Ok(report)
}

async fn index_file(
    session: &LibSqlSession,
    path: &Path,
    new_tags: &[String],
    report: &mut IndexReport,
) -> Result<(), StoreError> {
    let raw = fs::read(path).await?;
    let Some(id) = message_id(&raw) else {
        warn!(path = %path.display(), "Not a mail message, skipping");
        report.skipped += 1;
        return Ok(());
    };

    if session.add_message(&id, path, new_tags).await? {
        report.added += 1;
    } else {
        debug!(id = %id, path = %path.display(), "Already indexed");
        report.duplicates += 1;
    }
    Ok(())
}

/// Message-ID of a raw message, or a generated one when the header is
/// missing. `None` when the bytes do not parse as a message at all.
pub fn message_id(raw: &[u8]) -> Option<String> {
    let parsed = MessageParser::default().parse(raw)?;
    if parsed.headers().is_empty() {
        return None;
    }
    Some(match parsed.message_id() {
        Some(id) if !id.trim().is_empty() => id.trim().to_string(),
        _ => format!("notspam-{}", uuid::Uuid::new_v4()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::libsql_backend::LibSqlStore;
    use crate::store::traits::{AccessMode, StoreSession};

    const MAIL: &str = "From: alice@example.com\r\n\
        To: bob@example.com\r\n\
        Subject: hello\r\n\
        Message-ID: <hello-1@example.com>\r\n\
        \r\n\
        Hi Bob\r\n";

    #[test]
    fn message_id_from_header() {
        assert_eq!(
            message_id(MAIL.as_bytes()).as_deref(),
            Some("hello-1@example.com")
        );
    }

    #[test]
    fn message_id_generated_when_missing() {
        let raw = "From: alice@example.com\r\nSubject: no id\r\n\r\nbody\r\n";
        let id = message_id(raw.as_bytes()).unwrap();
        assert!(id.starts_with("notspam-"));
    }

    #[tokio::test]
    async fn indexes_maildir_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let cur = tmp.path().join("INBOX").join("cur");
        std::fs::create_dir_all(&cur).unwrap();
        std::fs::write(cur.join("1:2,S"), MAIL).unwrap();
        std::fs::write(
            cur.join("2:2,"),
            MAIL.replace("hello-1@example.com", "hello-2@example.com"),
        )
        .unwrap();
        // Same Message-ID as the first file.
        std::fs::write(cur.join("3:2,"), MAIL).unwrap();
        std::fs::write(cur.join(".hidden"), MAIL).unwrap();

        let store = LibSqlStore::new_memory().await.unwrap();
        let session = store.open_session(AccessMode::ReadWrite).await.unwrap();
        let tags = vec!["inbox".to_string(), "unread".to_string()];
        let report = index_path(&session, tmp.path(), &tags).await.unwrap();

        assert_eq!(
            report,
            IndexReport {
                added: 2,
                duplicates: 1,
                skipped: 0,
            }
        );

        let query = session.query("tag:unread").await.unwrap();
        assert_eq!(query.count, 2);
    }

    #[tokio::test]
    async fn indexing_needs_write_access() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("msg");
        std::fs::write(&file, MAIL).unwrap();

        let store = LibSqlStore::new_memory().await.unwrap();
        let session = store.open_session(AccessMode::ReadOnly).await.unwrap();
        let err = index_path(&session, &file, &[]).await.unwrap_err();
        assert!(matches!(err, StoreError::ReadOnly { .. }));
    }
}
