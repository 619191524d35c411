/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
Per-session registry of topic filters and their granted QoS.

Matching happens on every routed publish while subscribe/unsubscribe are comparatively rare,
so the registry sits behind a reader-writer lock and matches only take the read side.
 */

use crate::error::{BrokerError, BrokerResult};
use crate::mqtt::*;
use crate::validate::*;

use log::*;

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// A registered filter that matched a published topic
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MatchedSubscription {

    /// The filter that matched
    pub topic_filter: String,

    /// QoS granted when the filter was subscribed
    pub granted_qos: QualityOfService,
}

/// Set of (topic filter, granted QoS) pairs owned by a single session
#[derive(Default)]
pub struct SubscriptionMatcher {
    subscriptions: RwLock<HashMap<String, QualityOfService>>,
}

impl SubscriptionMatcher {

    pub fn new() -> SubscriptionMatcher {
        SubscriptionMatcher {
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    /// Adds a filter, or replaces the granted QoS of an existing one.  Fails with
    /// [`BrokerError::ProtocolViolation`] if the filter is not a valid topic filter.
    pub fn subscribe(&self, topic_filter: &str, granted_qos: QualityOfService) -> BrokerResult<()> {
        if !is_valid_topic_filter(topic_filter) {
            let message = format!("SubscriptionMatcher::subscribe - invalid topic filter \"{}\"", topic_filter);
            error!("{}", message);
            return Err(BrokerError::new_protocol_violation(message));
        }

        let mut subscriptions = self.subscriptions.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous_qos) = subscriptions.insert(topic_filter.to_string(), granted_qos) {
            debug!("SubscriptionMatcher - replaced subscription \"{}\" ({:?} -> {:?})", topic_filter, previous_qos, granted_qos);
        } else {
            debug!("SubscriptionMatcher - added {}subscription \"{}\" at {:?}", if compute_topic_filter_properties(topic_filter).has_wildcard { "wildcard " } else { "" }, topic_filter, granted_qos);
        }

        Ok(())
    }

    /// Removes a filter.  Returns false if the filter was not subscribed.
    pub fn unsubscribe(&self, topic_filter: &str) -> bool {
        let mut subscriptions = self.subscriptions.write().unwrap_or_else(PoisonError::into_inner);
        subscriptions.remove(topic_filter).is_some()
    }

    /// Every registered filter that matches the topic, with its granted QoS
    pub fn match_topic(&self, topic: &str) -> Vec<MatchedSubscription> {
        let subscriptions = self.subscriptions.read().unwrap_or_else(PoisonError::into_inner);
        subscriptions.iter()
            .filter(|(topic_filter, _)| does_topic_match_filter(topic, topic_filter))
            .map(|(topic_filter, granted_qos)| {
                MatchedSubscription {
                    topic_filter: topic_filter.clone(),
                    granted_qos: *granted_qos,
                }
            })
            .collect()
    }

    /// QoS a message published at `published_qos` is delivered with, or None if nothing matches.
    ///
    /// Each matching filter delivers at `min(granted, published)`; overlapping filters deliver
    /// a single copy at the strongest of those.
    pub fn effective_qos(&self, topic: &str, published_qos: QualityOfService) -> Option<QualityOfService> {
        self.match_topic(topic).iter()
            .map(|matched| matched.granted_qos.min(published_qos))
            .max()
    }

    /// Granted QoS of an exact filter, if subscribed
    pub fn granted_qos(&self, topic_filter: &str) -> Option<QualityOfService> {
        let subscriptions = self.subscriptions.read().unwrap_or_else(PoisonError::into_inner);
        subscriptions.get(topic_filter).copied()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn clear(&self) {
        self.subscriptions.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
