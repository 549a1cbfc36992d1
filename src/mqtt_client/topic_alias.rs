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

//! Topic alias tables, one per direction.
//!
//! Aliases are valid only for the connection that negotiated them. Both
//! tables are cleared on every disconnect.

use std::collections::HashMap;

use crate::mqtt_client::error::ProtocolError;

/// How an outbound PUBLISH should carry its topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundTopic {
    /// Full topic, no alias. The broker advertised no alias capacity or the
    /// table is full.
    Plain,
    /// Full topic together with a freshly assigned alias, establishing the
    /// mapping on the broker.
    Assign(u16),
    /// Empty topic, alias only. The mapping was established earlier on this
    /// connection.
    Existing(u16),
}

/// Client-assigned aliases for outbound publishes, bounded by the broker's
/// Topic Alias Maximum from CONNACK.
#[derive(Debug, Default)]
pub struct OutboundAliasTable {
    maximum: u16,
    by_topic: HashMap<String, u16>,
    next: u16,
}

impl OutboundAliasTable {
    pub fn new(maximum: u16) -> Self {
        OutboundAliasTable {
            maximum,
            by_topic: HashMap::new(),
            next: 1,
        }
    }

    /// Decide the cheapest legal form for `topic`.
    ///
    /// First use of a topic assigns the next free alias (topic plus alias on
    /// the wire); later uses send alias only. Once `maximum` aliases exist,
    /// unaliased topics go out plain.
    pub fn resolve(&mut self, topic: &str) -> OutboundTopic {
        if self.maximum == 0 {
            return OutboundTopic::Plain;
        }
        if let Some(&alias) = self.by_topic.get(topic) {
            return OutboundTopic::Existing(alias);
        }
        if self.next > self.maximum {
            return OutboundTopic::Plain;
        }
        let alias = self.next;
        self.next += 1;
        self.by_topic.insert(topic.to_owned(), alias);
        OutboundTopic::Assign(alias)
    }

    pub fn clear(&mut self) {
        self.by_topic.clear();
        self.next = 1;
    }
}

/// Broker-assigned aliases for inbound publishes, bounded by the Topic Alias
/// Maximum this client advertised in CONNECT.
#[derive(Debug, Default)]
pub struct InboundAliasTable {
    maximum: u16,
    by_alias: HashMap<u16, String>,
}

impl InboundAliasTable {
    pub fn new(maximum: u16) -> Self {
        InboundAliasTable {
            maximum,
            by_alias: HashMap::new(),
        }
    }

    /// Record the mapping carried by a PUBLISH with both topic and alias.
    pub fn record(&mut self, alias: u16, topic: &str) -> Result<(), ProtocolError> {
        if alias == 0 || alias > self.maximum {
            return Err(ProtocolError::TopicAliasInvalid(alias));
        }
        self.by_alias.insert(alias, topic.to_owned());
        Ok(())
    }

    /// Resolve an alias-only PUBLISH to its topic.
    pub fn lookup(&self, alias: u16) -> Result<&str, ProtocolError> {
        if alias == 0 || alias > self.maximum {
            return Err(ProtocolError::TopicAliasInvalid(alias));
        }
        self.by_alias
            .get(&alias)
            .map(String::as_str)
            .ok_or(ProtocolError::UnknownTopicAlias(alias))
    }

    pub fn clear(&mut self) {
        self.by_alias.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_use_is_alias_only() {
        let mut table = OutboundAliasTable::new(4);
        assert_eq!(table.resolve("orders/new"), OutboundTopic::Assign(1));
        assert_eq!(table.resolve("orders/new"), OutboundTopic::Existing(1));
        assert_eq!(table.resolve("orders/done"), OutboundTopic::Assign(2));
    }

    #[test]
    fn full_table_falls_back_to_plain() {
        let mut table = OutboundAliasTable::new(1);
        assert_eq!(table.resolve("a"), OutboundTopic::Assign(1));
        assert_eq!(table.resolve("b"), OutboundTopic::Plain);
        // The aliased topic keeps its alias.
        assert_eq!(table.resolve("a"), OutboundTopic::Existing(1));
    }

    #[test]
    fn zero_maximum_never_aliases() {
        let mut table = OutboundAliasTable::new(0);
        assert_eq!(table.resolve("a"), OutboundTopic::Plain);
        assert_eq!(table.resolve("a"), OutboundTopic::Plain);
    }

    #[test]
    fn clear_invalidates_assignments() {
        let mut table = OutboundAliasTable::new(4);
        table.resolve("a");
        table.clear();
        assert_eq!(table.resolve("a"), OutboundTopic::Assign(1));
    }

    #[test]
    fn inbound_lookup_of_unrecorded_alias_is_an_error() {
        let table = InboundAliasTable::new(10);
        assert_eq!(table.lookup(3), Err(ProtocolError::UnknownTopicAlias(3)));
    }

    #[test]
    fn inbound_record_and_lookup() {
        let mut table = InboundAliasTable::new(10);
        table.record(3, "sensors/temp").unwrap();
        assert_eq!(table.lookup(3).unwrap(), "sensors/temp");
        // Re-recording the same alias overwrites the mapping.
        table.record(3, "sensors/humidity").unwrap();
        assert_eq!(table.lookup(3).unwrap(), "sensors/humidity");
    }

    #[test]
    fn inbound_alias_above_advertised_maximum_is_rejected() {
        let mut table = InboundAliasTable::new(2);
        assert_eq!(
            table.record(3, "t"),
            Err(ProtocolError::TopicAliasInvalid(3))
        );
        assert_eq!(table.lookup(0), Err(ProtocolError::TopicAliasInvalid(0)));
    }
}
