//! Topic names and topic filters.
//!
//! Levels are separated by `/`. In filters, `+` matches exactly one level
//! and `#` (only as the last level) matches all remaining levels, including
//! none.

use crate::transport::TransportError;

const SINGLE_LEVEL: &str = "+";
const MULTI_LEVEL: &str = "#";

/// Validate a topic used for publishing (no wildcards).
pub fn validate_topic(topic: &str) -> Result<(), TransportError> {
    if topic.is_empty() {
        return Err(TransportError::InvalidTopic("topic is empty".to_string()));
    }
    if topic.contains(['+', '#']) {
        return Err(TransportError::InvalidTopic(format!(
            "wildcards are not allowed in a publish topic: {}",
            topic
        )));
    }
    Ok(())
}

/// Validate a subscription filter.
pub fn validate_filter(filter: &str) -> Result<(), TransportError> {
    if filter.is_empty() {
        return Err(TransportError::InvalidTopic("filter is empty".to_string()));
    }

    let levels: Vec<&str> = filter.split('/').collect();
    for (i, level) in levels.iter().enumerate() {
        let is_last = i == levels.len() - 1;
        match *level {
            MULTI_LEVEL if !is_last => {
                return Err(TransportError::InvalidTopic(format!(
                    "'#' must be the last level: {}",
                    filter
                )))
            }
            MULTI_LEVEL | SINGLE_LEVEL => {}
            other if other.contains(['+', '#']) => {
                return Err(TransportError::InvalidTopic(format!(
                    "wildcards must occupy a whole level: {}",
                    filter
                )))
            }
            _ => {}
        }
    }
    Ok(())
}

/// Whether `topic` matches `filter`.
pub fn matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some(MULTI_LEVEL), _) => return true,
            (Some(SINGLE_LEVEL), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
