//! Classification pipeline.

use std::time::Instant;

use tracing::{error, info, warn};

use crate::engine::{Engine, Verdict};
use crate::error::{EngineError, Result};
use crate::pipeline::report::{Reporter, RunStats};
use crate::pipeline::tags::{self, TagDirective};
use crate::store::{AccessMode, MessageStore, Query};

/// Settings for one classification run.
#[derive(Debug, Clone, Default)]
pub struct ClassifyOptions {
    pub spam_tags: Vec<TagDirective>,
    pub ham_tags: Vec<TagDirective>,
    pub unk_tags: Vec<TagDirective>,
    /// Classify without touching tags; the store is opened read-only.
    pub dry: bool,
}

impl ClassifyOptions {
    pub fn tags_for(&self, verdict: Verdict) -> &[TagDirective] {
        match verdict {
            Verdict::Spam => &self.spam_tags,
            Verdict::Ham => &self.ham_tags,
            Verdict::Unknown => &self.unk_tags,
        }
    }
}

/// Classify every message matching `search` and tag it by verdict.
///
/// Messages the engine cannot classify are reported and left out of every
/// verdict counter.
pub async fn classify(
    engine: &dyn Engine,
    store: &dyn MessageStore,
    search: &str,
    options: &ClassifyOptions,
    reporter: &mut Reporter,
) -> Result<RunStats> {
    let started = Instant::now();
    let classifier = engine.classifier();

    let mode = if options.dry {
        AccessMode::ReadOnly
    } else {
        AccessMode::ReadWrite
    };
    let session = store.open(mode).await?;
    let Query {
        count,
        mut messages,
    } = session.query(search).await?;

    info!(engine = engine.name(), %mode, count, "Classification started");

    let mut stats = RunStats::new(count);
    let mut n = 0;
    while let Some(message) = messages.next().await? {
        n += 1;

        let outcome = match classifier.classify(message.as_ref()).await {
            Ok(outcome) => outcome,
            Err(EngineError::Classification(reason)) => {
                warn!(id = %message.id(), %reason, "Classification error");
                stats.errors += 1;
                reporter.item_error("Classification", message.id(), &reason);
                continue;
            }
            Err(e) => {
                error!(id = %message.id(), error = %e, "Classification aborted");
                reporter.fatal(message.id(), &e);
                return Err(e.into());
            }
        };

        stats.record(outcome.verdict);
        let tags = options.tags_for(outcome.verdict);

        if !options.dry
            && let Err(e) = tags::apply(message.as_ref(), tags).await
        {
            error!(id = %message.id(), error = %e, "Tagging failed, classification aborted");
            reporter.fatal(message.id(), &e);
            return Err(e.into());
        }

        let shown = if options.dry { None } else { Some(tags) };
        reporter.classified(n, count, &outcome, shown, message.id());
    }

    drop(messages);
    session.close().await?;

    info!(
        engine = engine.name(),
        total = stats.total,
        classified = stats.classified(),
        ham = stats.ham,
        spam = stats.spam,
        unknown = stats.unknown,
        errors = stats.errors,
        "Classification finished"
    );
    reporter.classify_summary(&stats, started.elapsed());
    Ok(stats)
}
