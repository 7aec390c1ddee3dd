//! Message store traits: the interface the pipelines consume.
//!
//! A store hands out scoped sessions; a session runs searches; a search
//! yields a count plus a single-pass cursor of message handles; a handle
//! exposes its id, its payload path and tag mutation with freeze/thaw.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use async_trait::async_trait;

use crate::error::StoreError;

/// How a session is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    /// Holding a read-write session also excludes every other writer.
    ReadWrite,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => f.write_str("read-only"),
            Self::ReadWrite => f.write_str("read-write"),
        }
    }
}

/// A mail store that can be opened for reading or writing.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Open a session. Dropping the session releases it.
    async fn open(&self, mode: AccessMode) -> Result<Box<dyn StoreSession>, StoreError>;
}

/// An open store session.
#[async_trait]
pub trait StoreSession: Send + Sync {
    fn mode(&self) -> AccessMode;

    /// Run a search, returning the match count and a cursor over the matches.
    async fn query(&self, search: &str) -> Result<Query, StoreError>;

    /// Close the session explicitly, surfacing any error from doing so.
    async fn close(self: Box<Self>) -> Result<(), StoreError>;
}

/// Result of a search.
pub struct Query {
    /// Number of matching messages when the search ran.
    pub count: usize,
    /// The matching messages, in store order. Yields exactly `count` items.
    pub messages: Box<dyn MessageCursor>,
}

/// Finite, single-pass sequence of messages.
#[async_trait]
pub trait MessageCursor: Send {
    async fn next(&mut self) -> Result<Option<Box<dyn Message>>, StoreError>;
}

/// Handle to one stored message.
#[async_trait]
pub trait Message: Send + Sync {
    /// Stable message identifier (the Message-ID, without angle brackets).
    fn id(&self) -> &str;

    /// Path of the file holding the raw message.
    fn path(&self) -> &Path;

    async fn tags(&self) -> Result<BTreeSet<String>, StoreError>;

    async fn add_tag(&self, tag: &str) -> Result<(), StoreError>;

    async fn remove_tag(&self, tag: &str) -> Result<(), StoreError>;

    /// Start a batch of tag changes that readers only see once `thaw` runs.
    async fn freeze(&self) -> Result<(), StoreError>;

    /// Publish the tag changes made since `freeze`.
    async fn thaw(&self) -> Result<(), StoreError>;
}
