//! Validated topic names.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PubSubError;

/// Maximum topic length in bytes.
pub const MAX_TOPIC_LEN: usize = 128;

/// A non-empty topic name made of ASCII letters, digits and `. _ - : /`.
///
/// Cheap to clone: every envelope, registry entry and replay log for the
/// same topic shares one allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic(Arc<str>);

impl Topic {
    /// Validates `name` and wraps it.
    ///
    /// # Errors
    ///
    /// Returns [`PubSubError::InvalidTopic`] if the name is empty, longer
    /// than [`MAX_TOPIC_LEN`], or contains a character outside the
    /// allowed set.
    pub fn parse(name: &str) -> Result<Self, PubSubError> {
        if name.is_empty() {
            return Err(PubSubError::InvalidTopic(
                "topic must not be empty".to_string(),
            ));
        }
        if name.len() > MAX_TOPIC_LEN {
            return Err(PubSubError::InvalidTopic(format!(
                "topic exceeds {MAX_TOPIC_LEN} bytes"
            )));
        }
        if let Some(bad) = name.chars().find(|c| !is_topic_char(*c)) {
            return Err(PubSubError::InvalidTopic(format!(
                "character {bad:?} is not allowed in {name:?}"
            )));
        }
        Ok(Self(Arc::from(name)))
    }

    /// Returns the topic name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_topic_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ':' | '/')
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Topic {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Topic {
    type Error = PubSubError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.0.to_string()
    }
}
