//! Broker topics the fulfillment pipeline publishes to and consumes from.

use serde::{Deserialize, Serialize};

/// One of the three fulfillment topics.
///
/// Each topic is consumed by exactly one consumer group, so loops inside the
/// group share the topic's messages instead of each seeing every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Payment,
    Sales,
    Notice,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::Payment, Topic::Sales, Topic::Notice];

    /// Returns the wire name of the topic.
    pub fn name(&self) -> &'static str {
        match self {
            Topic::Payment => "paymentQueue",
            Topic::Sales => "salesQueue",
            Topic::Notice => "noticeQueue",
        }
    }

    /// Returns the consumer group that owns this topic.
    pub fn consumer_group(&self) -> &'static str {
        match self {
            Topic::Payment => "payment-group",
            Topic::Sales => "sales-group",
            Topic::Notice => "notice-group",
        }
    }

    /// Looks a topic up by its wire name.
    pub fn from_name(name: &str) -> Option<Topic> {
        Topic::ALL.into_iter().find(|t| t.name() == name)
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_and_groups() {
        assert_eq!(Topic::Payment.name(), "paymentQueue");
        assert_eq!(Topic::Sales.consumer_group(), "sales-group");
        assert_eq!(Topic::Notice.to_string(), "noticeQueue");
    }

    #[test]
    fn from_name_inverts_name() {
        for topic in Topic::ALL {
            assert_eq!(Topic::from_name(topic.name()), Some(topic));
        }
        assert_eq!(Topic::from_name("ordersQueue"), None);
    }
}
