//! # Topic Matcher
//!
//! Subscription filters with `+` (one level) and `#` (remaining levels), and
//! the per-session map from filter to granted QoS.

use crate::domain::packets::QoS;

/// A compiled subscription filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicMatcher {
    filter: String,
}

impl TopicMatcher {
    /// Compiles a filter.
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
        }
    }

    /// The filter text.
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// True when `topic` falls under this filter.
    pub fn matches(&self, topic: &str) -> bool {
        let mut filter_levels = self.filter.split('/');
        let mut topic_levels = topic.split('/');
        loop {
            match (filter_levels.next(), topic_levels.next()) {
                (Some("#"), _) => return true,
                (Some("+"), Some(_)) => {}
                (Some(f), Some(t)) if f == t => {}
                (None, None) => return true,
                _ => return false,
            }
        }
    }
}

/// Granted QoS per subscription filter. Owned by one session.
#[derive(Debug, Clone, Default)]
pub struct TopicQosMap {
    entries: Vec<(TopicMatcher, QoS)>,
}

impl TopicQosMap {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a subscription, replacing an identical filter.
    pub fn insert(&mut self, filter: &str, qos: QoS) {
        self.remove(filter);
        self.entries.push((TopicMatcher::new(filter), qos));
    }

    /// Forgets a subscription. Returns whether it existed.
    pub fn remove(&mut self, filter: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(m, _)| m.filter() != filter);
        before != self.entries.len()
    }

    /// Granted QoS of the first filter matching `topic`.
    pub fn qos_for(&self, topic: &str) -> Option<QoS> {
        self.entries
            .iter()
            .find(|(m, _)| m.matches(topic))
            .map(|(_, qos)| *qos)
    }

    /// Number of subscriptions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True without subscriptions.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
