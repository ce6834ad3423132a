//! Subscription table shared by the in-memory and TCP brokers.

use std::collections::HashMap;

use crate::topic;

struct Entry<S> {
    client_id: String,
    filters: Vec<String>,
    sender: S,
}

/// Maps connected sessions to their filters and delivery handles.
pub struct SubscriptionTable<S> {
    sessions: HashMap<u64, Entry<S>>,
    next_id: u64,
}

impl<S: Clone> SubscriptionTable<S> {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            next_id: 0,
        }
    }

    /// Register a session and return its id.
    pub fn insert(&mut self, client_id: impl Into<String>, sender: S) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.sessions.insert(
            id,
            Entry {
                client_id: client_id.into(),
                filters: Vec::new(),
                sender,
            },
        );
        id
    }

    /// Add a filter to a session. Returns false if the session is gone.
    pub fn subscribe(&mut self, session: u64, filter: &str) -> bool {
        match self.sessions.get_mut(&session) {
            Some(entry) => {
                if !entry.filters.iter().any(|f| f == filter) {
                    entry.filters.push(filter.to_string());
                }
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, session: u64) -> Option<String> {
        self.sessions.remove(&session).map(|entry| entry.client_id)
    }

    /// Delivery handles of every session with a filter matching `topic`.
    ///
    /// Each session appears at most once even when several filters match.
    pub fn targets(&self, topic: &str) -> Vec<(u64, S)> {
        self.sessions
            .iter()
            .filter(|(_, entry)| entry.filters.iter().any(|f| topic::matches(f, topic)))
            .map(|(id, entry)| (*id, entry.sender.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl<S: Clone> Default for SubscriptionTable<S> {
    fn default() -> Self {
        Self::new()
    }
}
