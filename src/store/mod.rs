//! Message store: the tagged mail index the pipelines read and tag.
//!
//! The pipelines only see the traits in [`traits`]. [`LibSqlStore`] is the
//! bundled implementation: a libSQL index of mail files and their tags.

pub mod index;
pub mod libsql_backend;
pub mod lock;
pub mod migrations;
pub mod search;
pub mod traits;

pub use index::{IndexReport, index_path};
pub use libsql_backend::{LibSqlSession, LibSqlStore};
pub use traits::{AccessMode, Message, MessageCursor, MessageStore, Query, StoreSession};
