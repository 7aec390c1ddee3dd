//! Engine that learns nothing and calls everything ham.
//!
//! Used for dry training runs and for exercising the pipelines without a
//! filter installed.

use async_trait::async_trait;

use crate::engine::{Classifier, Engine, Meat, Outcome, Trainer, Verdict};
use crate::error::EngineError;
use crate::store::Message;

pub const NAME: &str = "null";

#[derive(Debug, Default, Clone, Copy)]
pub struct NullEngine;

#[async_trait]
impl Engine for NullEngine {
    fn name(&self) -> &str {
        NAME
    }

    async fn trainer(&self, _meat: Meat, _retrain: bool) -> Result<Box<dyn Trainer>, EngineError> {
        Ok(Box::new(NullTrainer))
    }

    fn classifier(&self) -> Box<dyn Classifier> {
        Box::new(NullClassifier)
    }
}

struct NullTrainer;

#[async_trait]
impl Trainer for NullTrainer {
    async fn add(&mut self, _message: &dyn Message) -> Result<Option<String>, EngineError> {
        Ok(None)
    }

    async fn sync(self: Box<Self>) -> Result<(), EngineError> {
        Ok(())
    }
}

struct NullClassifier;

#[async_trait]
impl Classifier for NullClassifier {
    async fn classify(&self, _message: &dyn Message) -> Result<Outcome, EngineError> {
        Ok(Outcome::new(Verdict::Ham))
    }
}
