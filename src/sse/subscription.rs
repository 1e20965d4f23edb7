//! Inbound stream requests.
//!
//! Parses `?topics=a,b&last_seen=a:4,b:9` plus an optional
//! `Last-Event-ID: <topic>:<seq>` header into a validated
//! [`SubscriptionRequest`].

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use utoipa::IntoParams;

use crate::domain::Topic;
use crate::error::PubSubError;

/// Raw query string of `GET /api/v1/events`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StreamQuery {
    /// Comma-separated topic names.
    pub topics: Option<String>,
    /// Comma-separated `<topic>:<sequence_id>` replay points.
    pub last_seen: Option<String>,
}

/// A validated request to open a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    topics: Vec<Topic>,
    last_seen: HashMap<Topic, u64>,
}

impl SubscriptionRequest {
    /// A request for live traffic on `topics`, in the given order.
    ///
    /// Duplicate topics are collapsed.
    #[must_use]
    pub fn new(topics: impl IntoIterator<Item = Topic>) -> Self {
        let mut seen = HashSet::new();
        let unique = topics
            .into_iter()
            .filter(|topic| seen.insert(topic.clone()))
            .collect();
        Self {
            topics: unique,
            last_seen: HashMap::new(),
        }
    }

    /// Adds a replay point for one of the requested topics.
    ///
    /// Points for topics not in the request are ignored.
    #[must_use]
    pub fn with_last_seen(mut self, topic: &Topic, sequence_id: u64) -> Self {
        if self.topics.contains(topic) {
            self.last_seen.insert(topic.clone(), sequence_id);
        }
        self
    }

    /// Builds a request from the query string and `Last-Event-ID` header.
    ///
    /// The header names a single topic. For that topic the replay point is
    /// the later of the query value and the header value, so an
    /// `EventSource` reconnecting to its original URL resumes from what it
    /// actually saw. Other topics of a multi-topic stream only resume if
    /// the query carries an explicit `last_seen` for them. A malformed or
    /// foreign header is ignored.
    ///
    /// Item counts are checked before any name is parsed, and duplicate
    /// names count toward `max_topics`.
    ///
    /// # Errors
    ///
    /// Returns [`PubSubError::InvalidRequest`] if no topic is given, too
    /// many are given, or a `last_seen` entry is malformed or names a topic
    /// that was not requested, and [`PubSubError::InvalidTopic`] for a bad
    /// topic name.
    pub fn parse(
        query: &StreamQuery,
        last_event_id: Option<&str>,
        max_topics: usize,
    ) -> Result<Self, PubSubError> {
        let requested = split_list(query.topics.as_deref()).count();
        if requested == 0 {
            return Err(PubSubError::InvalidRequest(
                "at least one topic is required".to_string(),
            ));
        }
        if requested > max_topics {
            return Err(PubSubError::InvalidRequest(format!(
                "{requested} topics requested, at most {max_topics} allowed"
            )));
        }
        let cursors = split_list(query.last_seen.as_deref()).count();
        if cursors > max_topics {
            return Err(PubSubError::InvalidRequest(format!(
                "{cursors} last_seen entries given, at most {max_topics} allowed"
            )));
        }

        let topics = split_list(query.topics.as_deref())
            .map(Topic::parse)
            .collect::<Result<Vec<_>, _>>()?;
        let mut request = Self::new(topics);

        for item in split_list(query.last_seen.as_deref()) {
            let (topic, sequence_id) = parse_cursor(item)?;
            if !request.topics.contains(&topic) {
                return Err(PubSubError::InvalidRequest(format!(
                    "last_seen names topic {topic} which is not requested"
                )));
            }
            request.last_seen.insert(topic, sequence_id);
        }

        if let Some(Ok((topic, sequence_id))) = last_event_id.map(parse_cursor)
            && request.topics.contains(&topic)
        {
            request
                .last_seen
                .entry(topic)
                .and_modify(|seen| *seen = (*seen).max(sequence_id))
                .or_insert(sequence_id);
        }
        Ok(request)
    }

    /// Requested topics, duplicates removed.
    #[must_use]
    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    /// Replay point for `topic`, if the client supplied one.
    #[must_use]
    pub fn last_seen(&self, topic: &str) -> Option<u64> {
        self.last_seen.get(topic).copied()
    }
}

/// Parses `<topic>:<sequence_id>`.
///
/// Topics may themselves contain `:`, so the split is on the last one.
///
/// # Errors
///
/// Returns [`PubSubError::InvalidRequest`] for a missing separator or a
/// non-numeric id, and [`PubSubError::InvalidTopic`] for a bad topic.
pub fn parse_cursor(raw: &str) -> Result<(Topic, u64), PubSubError> {
    let Some((topic, sequence_id)) = raw.trim().rsplit_once(':') else {
        return Err(PubSubError::InvalidRequest(format!(
            "expected <topic>:<sequence_id>, got {raw:?}"
        )));
    };
    let sequence_id = sequence_id.parse::<u64>().map_err(|_| {
        PubSubError::InvalidRequest(format!("invalid sequence id in {raw:?}"))
    })?;
    Ok((Topic::parse(topic)?, sequence_id))
}

fn split_list(raw: Option<&str>) -> impl Iterator<Item = &str> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
