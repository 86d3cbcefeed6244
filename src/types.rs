use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const WILDCARD: &str = "*";

/// Event names the vendor emits for webhook subscriptions.
pub const KNOWN_EVENTS: &[&str] = &[
    "JOB_COMPLETED",
    "JOB_FAILED",
    "BULK_COMPLETED",
    "COMPOSE_COMPLETED",
];

/// Which inbound events a trigger forwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventFilter {
    Any,
    Named(String),
}

impl EventFilter {
    /// Parse a selector, accepting only the wildcard or an event the vendor knows about.
    pub fn parse(selector: &str) -> Result<Self, String> {
        if selector == WILDCARD {
            return Ok(EventFilter::Any);
        }
        if KNOWN_EVENTS.contains(&selector) {
            Ok(EventFilter::Named(selector.to_string()))
        } else {
            Err(format!(
                "unsupported event '{selector}', expected '*' or one of {}",
                KNOWN_EVENTS.join(", ")
            ))
        }
    }

    /// Exact, case-sensitive match. A payload without an event only passes the wildcard.
    pub fn matches(&self, event: Option<&str>) -> bool {
        match self {
            EventFilter::Any => true,
            EventFilter::Named(name) => event == Some(name.as_str()),
        }
    }

    /// The `events` array sent when registering with the vendor.
    pub fn as_events(&self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl fmt::Display for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventFilter::Any => f.write_str(WILDCARD),
            EventFilter::Named(name) => f.write_str(name),
        }
    }
}

impl From<String> for EventFilter {
    fn from(s: String) -> Self {
        if s == WILDCARD {
            EventFilter::Any
        } else {
            EventFilter::Named(s)
        }
    }
}

impl From<EventFilter> for String {
    fn from(filter: EventFilter) -> Self {
        filter.to_string()
    }
}

/// Receiver-side record of a webhook subscription, owned by one workflow trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub trigger_id: String,
    /// Identifier assigned by the vendor. `None` when registration never succeeded.
    pub remote_id: Option<String>,
    pub secret: Option<String>,
    pub target_url: String,
    pub event_filter: EventFilter,
    pub created_at: String,
}

impl Subscription {
    pub fn new(trigger_id: &str, target_url: String, event_filter: EventFilter) -> Self {
        Self {
            trigger_id: trigger_id.to_string(),
            remote_id: None,
            secret: None,
            target_url,
            event_filter,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    /// Secret usable for verification. Empty strings count as absent.
    pub fn signing_secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationResult {
    Verified,
    Unsigned,
    SignatureMismatch,
    MalformedSignature,
}

impl VerificationResult {
    pub fn is_accepted(self) -> bool {
        matches!(self, VerificationResult::Verified | VerificationResult::Unsigned)
    }
}

/// Short text acknowledgement returned to the vendor's delivery system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Received,
    Filtered,
    InvalidSignature,
}

impl Ack {
    pub fn as_str(self) -> &'static str {
        match self {
            Ack::Received => "received",
            Ack::Filtered => "filtered",
            Ack::InvalidSignature => "invalid signature",
        }
    }
}

/// A verified, filtered delivery waiting to be published to the host.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    pub delivery_id: String,
    pub trigger_id: String,
    pub event: Option<String>,
    pub received_at: DateTime<Utc>,
    pub data: serde_json::Value,
}
