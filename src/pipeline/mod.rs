//! Batch pipelines.
//!
//! Both pipelines run one search, walk the matches in store order and hand
//! each message to the engine before moving on to the next:
//! 1. `train()`: feed messages to a `Trainer`, then sync it once
//! 2. `classify()`: ask a `Classifier` for a verdict, count it, tag the message
//!
//! Only the engine's own per-message error kind is survivable; anything
//! else aborts the batch. A training batch aborted that way is never synced.

pub mod classify;
pub mod report;
pub mod tags;
pub mod train;

pub use classify::{ClassifyOptions, classify};
pub use report::{Reporter, RunStats};
pub use tags::{TagDirective, apply, parse_directives};
pub use train::{TrainOptions, train};
