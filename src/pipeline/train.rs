//! Training pipeline.

use std::time::Instant;

use tracing::{error, info, warn};

use crate::engine::{Engine, Meat};
use crate::error::{EngineError, Result};
use crate::pipeline::report::Reporter;
use crate::pipeline::tags::{self, TagDirective};
use crate::store::{AccessMode, MessageStore, Query};

/// Settings for one training batch.
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub meat: Meat,
    /// Unlearn the other class before learning this one.
    pub retrain: bool,
    /// Applied to each successfully trained message.
    pub tags: Vec<TagDirective>,
    pub dry: bool,
}

/// Train `engine` on every message matching `search` as `options.meat`.
///
/// Returns the number of messages the search matched, not the number the
/// engine accepted. The store is opened read-write even when `dry` is set,
/// since holding the writer lock is what keeps batches from overlapping.
pub async fn train(
    engine: &dyn Engine,
    store: &dyn MessageStore,
    search: &str,
    options: &TrainOptions,
    reporter: &mut Reporter,
) -> Result<usize> {
    let started = Instant::now();
    let mut trainer = engine.trainer(options.meat, options.retrain).await?;

    let session = store.open(AccessMode::ReadWrite).await?;
    let Query {
        count,
        mut messages,
    } = session.query(search).await?;

    info!(
        engine = engine.name(),
        meat = %options.meat,
        retrain = options.retrain,
        dry = options.dry,
        count,
        "Training started"
    );

    let mut n = 0;
    let mut trained = 0;
    while let Some(message) = messages.next().await? {
        n += 1;
        reporter.progress(n, count, message.id());

        let note = match trainer.add(message.as_ref()).await {
            Ok(note) => note,
            Err(EngineError::Training(reason)) => {
                warn!(id = %message.id(), %reason, "Training error");
                reporter.item_error("Training", message.id(), &reason);
                continue;
            }
            Err(e) => {
                error!(id = %message.id(), error = %e, "Training aborted");
                reporter.fatal(message.id(), &e);
                return Err(e.into());
            }
        };

        if !options.dry
            && let Err(e) = tags::apply(message.as_ref(), &options.tags).await
        {
            error!(id = %message.id(), error = %e, "Tagging failed, training aborted");
            reporter.fatal(message.id(), &e);
            return Err(e.into());
        }

        trained += 1;
        reporter.trained(n, count, note.as_deref(), message.id());
    }

    drop(messages);
    session.close().await?;
    trainer.sync().await?;

    info!(engine = engine.name(), count, trained, "Training finished");
    reporter.train_summary(options.meat, count, trained, started.elapsed());
    Ok(count)
}
