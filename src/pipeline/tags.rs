//! Tag directives and their application to a message.

use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigError, StoreError};
use crate::store::Message;

/// One tag change: `+name` or bare `name` adds, `-name` removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagDirective {
    Add(String),
    Remove(String),
}

impl TagDirective {
    pub fn tag(&self) -> &str {
        match self {
            Self::Add(tag) | Self::Remove(tag) => tag,
        }
    }
}

impl FromStr for TagDirective {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let directive = match s.trim() {
            t if t.starts_with('+') => Self::Add(t[1..].to_string()),
            t if t.starts_with('-') => Self::Remove(t[1..].to_string()),
            t => Self::Add(t.to_string()),
        };
        if directive.tag().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "tags".into(),
                message: format!("'{s}' does not name a tag"),
            });
        }
        Ok(directive)
    }
}

impl fmt::Display for TagDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add(tag) => write!(f, "+{tag}"),
            Self::Remove(tag) => write!(f, "-{tag}"),
        }
    }
}

/// Parse a comma-separated directive list. A blank list is empty.
pub fn parse_directives(raw: &str) -> Result<Vec<TagDirective>, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    raw.split(',').map(str::parse).collect()
}

/// Comma-joined form used in the audit log.
pub fn format_directives(directives: &[TagDirective]) -> String {
    directives
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Apply `directives` in order inside one freeze/thaw cycle.
///
/// An empty list touches nothing. Otherwise the message is thawed even
/// when a directive fails.
pub async fn apply(message: &dyn Message, directives: &[TagDirective]) -> Result<(), StoreError> {
    if directives.is_empty() {
        return Ok(());
    }

    message.freeze().await?;
    let applied = apply_each(message, directives).await;
    let thawed = message.thaw().await;
    applied?;
    thawed
}

async fn apply_each(message: &dyn Message, directives: &[TagDirective]) -> Result<(), StoreError> {
    for directive in directives {
        match directive {
            TagDirective::Add(tag) => message.add_tag(tag).await?,
            TagDirective::Remove(tag) => message.remove_tag(tag).await?,
        }
    }
    Ok(())
}
