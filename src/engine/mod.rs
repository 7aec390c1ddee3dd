//! Classification engines.
//!
//! An engine hands out two short-lived capabilities: a [`Trainer`] bound to
//! one meat for one batch, and a stateless [`Classifier`]. Per-batch state
//! (a long-lived engine process, a list of pending paths) lives in the
//! trainer only.

pub mod command;
pub mod null;
pub mod registry;
pub mod spec;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{ConfigError, EngineError};
use crate::store::Message;

pub use command::CommandEngine;
pub use null::NullEngine;
pub use registry::EngineRegistry;

/// Which class a batch of training messages belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Meat {
    Ham,
    Spam,
}

impl fmt::Display for Meat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ham => f.write_str("ham"),
            Self::Spam => f.write_str("spam"),
        }
    }
}

impl FromStr for Meat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ham" => Ok(Self::Ham),
            "spam" => Ok(Self::Spam),
            other => Err(ConfigError::InvalidValue {
                key: "meat".into(),
                message: format!("'{other}': must be either 'ham' or 'spam'"),
            }),
        }
    }
}

/// Engine verdict for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Spam,
    Ham,
    Unknown,
}

impl Verdict {
    /// Flag used in the audit log.
    pub fn flag(&self) -> &'static str {
        match self {
            Self::Spam => "SPAM",
            Self::Ham => "HAM",
            Self::Unknown => "?",
        }
    }
}

/// Verdict plus the engine's own score, kept verbatim for the audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub verdict: Verdict,
    pub evidence: Option<String>,
}

impl Outcome {
    pub fn new(verdict: Verdict) -> Self {
        Self {
            verdict,
            evidence: None,
        }
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }
}

/// Feeds training messages of one meat to an engine.
#[async_trait]
pub trait Trainer: Send {
    /// Submit one message. May return a short note for the audit log.
    ///
    /// `EngineError::Training` means the engine rejected this message and
    /// the batch can go on; any other error is fatal.
    async fn add(&mut self, message: &dyn Message) -> Result<Option<String>, EngineError>;

    /// Commit everything added so far. A no-op when nothing was added.
    async fn sync(self: Box<Self>) -> Result<(), EngineError>;
}

/// Classifies single messages against the engine's existing state.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// `EngineError::Classification` means this message could not be
    /// classified and the batch can go on; any other error is fatal.
    async fn classify(&self, message: &dyn Message) -> Result<Outcome, EngineError>;
}

/// A classification engine.
#[async_trait]
pub trait Engine: Send + Sync {
    fn name(&self) -> &str;

    /// Start a training batch. `retrain` unlearns each message from the
    /// other class before learning it as `meat`.
    async fn trainer(&self, meat: Meat, retrain: bool) -> Result<Box<dyn Trainer>, EngineError>;

    fn classifier(&self) -> Box<dyn Classifier>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meat_parses_only_ham_and_spam() {
        assert_eq!("ham".parse::<Meat>().unwrap(), Meat::Ham);
        assert_eq!("spam".parse::<Meat>().unwrap(), Meat::Spam);
        assert!("eggs".parse::<Meat>().is_err());
        assert!("Spam".parse::<Meat>().is_err());
    }

    #[test]
    fn verdict_flags() {
        assert_eq!(Verdict::Spam.flag(), "SPAM");
        assert_eq!(Verdict::Ham.flag(), "HAM");
        assert_eq!(Verdict::Unknown.flag(), "?");
    }

    #[test]
    fn outcome_builder() {
        let outcome = Outcome::new(Verdict::Ham).with_evidence("0.12");
        assert_eq!(outcome.evidence.as_deref(), Some("0.12"));
    }
}
