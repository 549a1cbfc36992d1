// MIT License
//
// Copyright (c) 2025 Takatoshi Kondo
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Subscription registry and topic routing.
//!
//! Filters are matched linearly; a client holds few enough subscriptions
//! that a trie buys nothing here. A publish fans out to every matching
//! subscription exactly once.

use tokio::sync::mpsc;

use crate::mqtt_client::error::ProtocolError;
use crate::mqtt_client::event::ReceivedMessage;
use crate::mqtt_client::packet::{SubscribeFilter, SubscribeReasonCode};

/// Validate a topic filter: non-empty, `+` alone in its level, `#` alone in
/// the final level only.
pub fn validate_filter(filter: &str) -> Result<(), ProtocolError> {
    if filter.is_empty() {
        return Err(ProtocolError::InvalidTopicFilter(filter.to_owned()));
    }
    let levels: Vec<&str> = filter.split('/').collect();
    for (i, level) in levels.iter().enumerate() {
        if level.contains('#') {
            if *level != "#" || i != levels.len() - 1 {
                return Err(ProtocolError::InvalidTopicFilter(filter.to_owned()));
            }
        } else if level.contains('+') && *level != "+" {
            return Err(ProtocolError::InvalidTopicFilter(filter.to_owned()));
        }
    }
    Ok(())
}

/// Validate a topic name for publishing: non-empty, no wildcards. An empty
/// name is legal only when an alias stands in for it, which the caller
/// checks separately.
pub fn validate_topic(topic: &str) -> Result<(), ProtocolError> {
    if topic.is_empty() || topic.contains(['+', '#']) {
        return Err(ProtocolError::InvalidTopicName(topic.to_owned()));
    }
    Ok(())
}

/// MQTT wildcard match of `topic` against `filter`.
///
/// `+` matches exactly one level, `#` as the final level matches the rest
/// (including zero levels). A wildcard in the first filter level never
/// matches a `$`-prefixed topic, so a bare `#` cannot observe broker
/// internals like `$SYS`.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') {
        let first = filter.split('/').next().unwrap_or("");
        if first == "+" || first == "#" {
            return false;
        }
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            // "a/#" also matches "a": a trailing "#" covers zero levels.
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// One active subscription as granted by the broker.
#[derive(Debug)]
pub struct Subscription {
    pub options: SubscribeFilter,
    pub granted: SubscribeReasonCode,
    /// Dedicated delivery channel, when the subscriber asked for one.
    /// Matching messages always reach the client-wide event channel as
    /// well; a dedicated channel is an additional delivery path.
    pub channel: Option<mpsc::UnboundedSender<ReceivedMessage>>,
}

/// Outcome of routing one publish through the registry.
#[derive(Debug, Default)]
pub struct RouteOutcome {
    /// Dedicated channels of matched subscriptions.
    pub channels: Vec<mpsc::UnboundedSender<ReceivedMessage>>,
    /// Total number of matched subscriptions, with or without a channel.
    pub matched: usize,
}

/// Holds the active subscriptions of one client.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a granted subscription, replacing any prior subscription with
    /// the same filter (the broker treats a re-subscribe as a replacement).
    pub fn insert(
        &mut self,
        options: SubscribeFilter,
        granted: SubscribeReasonCode,
        channel: Option<mpsc::UnboundedSender<ReceivedMessage>>,
    ) {
        self.subscriptions
            .retain(|s| s.options.filter != options.filter);
        self.subscriptions.push(Subscription {
            options,
            granted,
            channel,
        });
    }

    /// Remove the subscription with this exact filter. Returns whether one
    /// existed.
    pub fn remove(&mut self, filter: &str) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.options.filter != filter);
        self.subscriptions.len() != before
    }

    /// Collect every subscription matching `topic`.
    pub fn route(&self, topic: &str) -> RouteOutcome {
        let mut outcome = RouteOutcome::default();
        for sub in &self.subscriptions {
            if !topic_matches(&sub.options.filter, topic) {
                continue;
            }
            outcome.matched += 1;
            if let Some(tx) = &sub.channel {
                outcome.channels.push(tx.clone());
            }
        }
        outcome
    }

    pub fn filters(&self) -> impl Iterator<Item = &str> {
        self.subscriptions.iter().map(|s| s.options.filter.as_str())
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Drop all subscriptions, for teardown of a non-persisted session.
    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }
}
