//! notspam: train and run external spam filters against a tagged mail index.

pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod store;
