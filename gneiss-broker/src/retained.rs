/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Retained message storage.  The session engine only needs `get`/`put` style access, so the store
is a trait; an LRU-bounded in-memory implementation is provided.
 */

use crate::mqtt::*;
use crate::validate::*;

use log::*;
use lru::LruCache;

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Last-message-per-topic storage consulted when a client subscribes
pub trait RetainedMessageStore : Send + Sync {

    /// Retained message for an exact topic, if any
    fn get(&self, topic: &str) -> Option<ApplicationMessage>;

    /// Sets the retained message of `topic`, replacing any previous one
    fn put(&self, topic: &str, message: ApplicationMessage);

    /// Clears the retained message of `topic`, returning it
    fn remove(&self, topic: &str) -> Option<ApplicationMessage>;

    /// Every retained message currently held
    fn messages(&self) -> Vec<ApplicationMessage>;

    /// Retained messages whose topics match a topic filter
    fn matching_messages(&self, topic_filter: &str) -> Vec<ApplicationMessage> {
        // a literal filter can only match its own topic
        if !compute_topic_filter_properties(topic_filter).has_wildcard {
            return self.get(topic_filter).into_iter().collect();
        }

        self.messages().into_iter()
            .filter(|message| does_topic_match_filter(&message.topic, topic_filter))
            .collect()
    }
}

/// In-memory retained store that evicts the least recently used topic once full
pub struct InMemoryRetainedMessageStore {
    cache: Mutex<LruCache<String, ApplicationMessage>>,
}

impl InMemoryRetainedMessageStore {

    /// Creates a store holding at most `capacity` topics (minimum one)
    pub fn new(capacity: usize) -> InMemoryRetainedMessageStore {
        InMemoryRetainedMessageStore {
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN))),
        }
    }

    fn lock_cache(&self) -> MutexGuard<'_, LruCache<String, ApplicationMessage>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock_cache().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_cache().is_empty()
    }
}

impl RetainedMessageStore for InMemoryRetainedMessageStore {
    fn get(&self, topic: &str) -> Option<ApplicationMessage> {
        self.lock_cache().get(topic).cloned()
    }

    fn put(&self, topic: &str, message: ApplicationMessage) {
        if let Some((evicted_topic, _)) = self.lock_cache().push(topic.to_string(), message) {
            if evicted_topic != topic {
                info!("InMemoryRetainedMessageStore - evicted retained message for topic \"{}\"", evicted_topic);
            }
        }
    }

    fn remove(&self, topic: &str) -> Option<ApplicationMessage> {
        self.lock_cache().pop(topic)
    }

    fn messages(&self) -> Vec<ApplicationMessage> {
        self.lock_cache().iter().map(|(_, message)| message.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retained(topic: &str, payload: &str) -> ApplicationMessage {
        ApplicationMessage {
            topic: topic.to_string(),
            payload: payload.as_bytes().to_vec(),
            qos: QualityOfService::AtLeastOnce,
            retain: true,
        }
    }

    #[test]
    fn put_replaces_previous_message() {
        let store = InMemoryRetainedMessageStore::new(10);
        store.put("a/b", retained("a/b", "first"));
        store.put("a/b", retained("a/b", "second"));

        assert_eq!(1, store.len());
        assert_eq!(Some(retained("a/b", "second")), store.get("a/b"));
    }

    #[test]
    fn remove_clears_topic() {
        let store = InMemoryRetainedMessageStore::new(10);
        store.put("a/b", retained("a/b", "x"));

        assert_eq!(Some(retained("a/b", "x")), store.remove("a/b"));
        assert_eq!(None, store.remove("a/b"));
        assert!(store.is_empty());
    }

    #[test]
    fn least_recently_used_topic_is_evicted() {
        let store = InMemoryRetainedMessageStore::new(2);
        store.put("one", retained("one", "1"));
        store.put("two", retained("two", "2"));
        store.get("one");
        store.put("three", retained("three", "3"));

        assert_eq!(2, store.len());
        assert!(store.get("two").is_none());
        assert!(store.get("one").is_some());
        assert!(store.get("three").is_some());
    }

    #[test]
    fn matching_messages_by_filter() {
        let store = InMemoryRetainedMessageStore::new(10);
        store.put("sport/tennis", retained("sport/tennis", "t"));
        store.put("sport/golf", retained("sport/golf", "g"));
        store.put("finance", retained("finance", "f"));

        let mut topics : Vec<String> = store.matching_messages("sport/+").into_iter().map(|message| message.topic).collect();
        topics.sort();
        assert_eq!(vec!["sport/golf".to_string(), "sport/tennis".to_string()], topics);
    }

    #[test]
    fn matching_messages_by_literal_filter() {
        let store = InMemoryRetainedMessageStore::new(10);
        store.put("sport/tennis", retained("sport/tennis", "t"));
        store.put("sport", retained("sport", "s"));

        let matched = store.matching_messages("sport/tennis");
        assert_eq!(1, matched.len());
        assert_eq!("sport/tennis", matched[0].topic);
        assert!(store.matching_messages("sport/golf").is_empty());
    }

    #[test]
    fn zero_capacity_holds_one_message() {
        let store = InMemoryRetainedMessageStore::new(0);
        store.put("a", retained("a", "1"));
        store.put("b", retained("b", "2"));

        assert_eq!(1, store.len());
        assert!(store.get("b").is_some());
    }
}
