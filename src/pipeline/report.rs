//! User-facing pipeline output.
//!
//! The audit log and progress go to the stdout side, per-item diagnostics
//! and run summaries to the stderr side, so the audit log can be piped
//! somewhere without noise mixed in.

use std::fmt::Display;
use std::io::{self, IsTerminal, Write};
use std::time::Duration;

use serde::Serialize;

use crate::engine::{Meat, Outcome, Verdict};
use crate::pipeline::tags::{TagDirective, format_directives};

/// Counters for one classification run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Messages matched by the search.
    pub total: usize,
    pub ham: usize,
    pub spam: usize,
    pub unknown: usize,
    /// Messages skipped after a classification error.
    pub errors: usize,
}

impl RunStats {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn record(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Ham => self.ham += 1,
            Verdict::Spam => self.spam += 1,
            Verdict::Unknown => self.unknown += 1,
        }
    }

    /// Messages that got a verdict.
    pub fn classified(&self) -> usize {
        self.ham + self.spam + self.unknown
    }
}

#[derive(Debug, Serialize)]
struct TrainSummary {
    meat: Meat,
    total: usize,
    trained: usize,
    elapsed_secs: f64,
    rate: f64,
}

#[derive(Debug, Serialize)]
struct ClassifySummary {
    #[serde(flatten)]
    stats: RunStats,
    elapsed_secs: f64,
    rate: f64,
}

/// Writes the audit log, progress, diagnostics and summaries.
pub struct Reporter {
    out: Box<dyn Write + Send>,
    err: Box<dyn Write + Send>,
    audit: bool,
    progress: bool,
    json: bool,
}

impl Reporter {
    /// Reporter with everything off but diagnostics and summaries.
    pub fn new(out: Box<dyn Write + Send>, err: Box<dyn Write + Send>) -> Self {
        Self {
            out,
            err,
            audit: false,
            progress: false,
            json: false,
        }
    }

    /// Reporter on the process's stdout and stderr. Progress is only shown
    /// when auditing to a terminal.
    pub fn stdio(audit: bool, json: bool) -> Self {
        let progress = audit && io::stdout().is_terminal();
        Self::new(Box::new(io::stdout()), Box::new(io::stderr()))
            .with_audit(audit)
            .with_progress(progress)
            .with_json(json)
    }

    pub fn with_audit(mut self, audit: bool) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Transient line shown while a message is being trained.
    pub fn progress(&mut self, n: usize, total: usize, id: &str) {
        if self.audit && self.progress {
            let _ = write!(self.out, "\r{n}/{total} id:{id}");
            let _ = self.out.flush();
        }
    }

    pub fn trained(&mut self, n: usize, total: usize, note: Option<&str>, id: &str) {
        if !self.audit {
            return;
        }
        let mut line = format!("{n}/{total}");
        if let Some(note) = note {
            line.push_str(&format!(" ({note})"));
        }
        line.push_str(&format!(" id:{id}"));
        self.audit_line(&line);
    }

    /// `tags` is `None` on dry runs. Otherwise the applied directives are
    /// always shown, `[]` included.
    pub fn classified(
        &mut self,
        n: usize,
        total: usize,
        outcome: &Outcome,
        tags: Option<&[TagDirective]>,
        id: &str,
    ) {
        if !self.audit {
            return;
        }
        let mut line = format!("{n}/{total} {}", outcome.verdict.flag());
        if let Some(evidence) = &outcome.evidence {
            line.push_str(&format!(" ({evidence})"));
        }
        if let Some(tags) = tags {
            line.push_str(&format!(" [{}]", format_directives(tags)));
        }
        line.push_str(&format!(" id:{id}"));
        self.audit_line(&line);
    }

    fn audit_line(&mut self, line: &str) {
        let prefix = if self.progress { "\r" } else { "" };
        let _ = writeln!(self.out, "{prefix}{line}");
    }

    /// Two-line diagnostic for a message the engine rejected.
    pub fn item_error(&mut self, kind: &str, id: &str, reason: &dyn Display) {
        self.end_progress();
        let _ = writeln!(self.err, "{kind} error: id:{id}");
        let _ = writeln!(self.err, "  {reason}");
    }

    /// Diagnostic for the error that aborted a batch.
    pub fn fatal(&mut self, id: &str, error: &dyn Display) {
        self.item_error("Fatal", id, error);
    }

    /// `total` is the search count, `trained` what the engine accepted.
    pub fn train_summary(&mut self, meat: Meat, total: usize, trained: usize, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        let summary = TrainSummary {
            meat,
            total,
            trained,
            elapsed_secs: secs,
            rate: rate(total, secs),
        };
        if self.json {
            self.json_line(&summary);
        } else {
            let line = format_train_summary(&summary);
            let _ = writeln!(self.err, "{line}");
        }
    }

    pub fn classify_summary(&mut self, stats: &RunStats, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        let summary = ClassifySummary {
            stats: *stats,
            elapsed_secs: secs,
            rate: rate(stats.total, secs),
        };
        if self.json {
            self.json_line(&summary);
        } else {
            let line = format_classify_summary(&summary);
            let _ = writeln!(self.err, "{line}");
        }
    }

    fn json_line<T: Serialize>(&mut self, value: &T) {
        match serde_json::to_string(value) {
            Ok(json) => {
                let _ = writeln!(self.err, "{json}");
            }
            Err(e) => tracing::error!(error = %e, "Failed to serialize run summary"),
        }
    }

    /// Move off a pending progress line before writing to the other stream.
    fn end_progress(&mut self) {
        if self.audit && self.progress {
            let _ = writeln!(self.out);
            let _ = self.out.flush();
        }
    }
}

fn format_train_summary(summary: &TrainSummary) -> String {
    let mut line = format!(
        "trained {} '{}' messages in {:.2}s ({:.2} msgs/s)",
        summary.total, summary.meat, summary.elapsed_secs, summary.rate
    );
    let rejected = summary.total.saturating_sub(summary.trained);
    if rejected > 0 {
        line.push_str(&format!(", {rejected} errors"));
    }
    line
}

fn format_classify_summary(summary: &ClassifySummary) -> String {
    let stats = &summary.stats;
    let mut line = format!(
        "classified {} messages in {:.2}s ({:.2} msgs/s): \
         {} ham ({:.2}%), {} spam ({:.2}%), {} unknown ({:.2}%)",
        stats.total,
        summary.elapsed_secs,
        summary.rate,
        stats.ham,
        percent(stats.ham, stats.total),
        stats.spam,
        percent(stats.spam, stats.total),
        stats.unknown,
        percent(stats.unknown, stats.total),
    );
    if stats.errors > 0 {
        line.push_str(&format!(", {} errors", stats.errors));
    }
    line
}

fn rate(count: usize, secs: f64) -> f64 {
    if secs > 0.0 { count as f64 / secs } else { 0.0 }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}
