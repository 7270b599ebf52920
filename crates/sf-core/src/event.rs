//! Audit events for federation activity.
//!
//! Events record who talked to whom and how it ended. They are emitted on
//! the `sf::audit` tracing target so they can be routed separately from
//! diagnostic logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    // Authority events
    /// A role was registered on an authority.
    RoleRegistered,
    /// A role was removed from an authority.
    RoleUnregistered,

    // Registry events
    /// Entity metadata was added or replaced.
    EntityUpserted,
    /// An entity was removed from the registry.
    EntityRemoved,
    /// Entity metadata was refreshed from its source.
    EntityRefreshed,
    /// Refreshing entity metadata failed.
    EntityRefreshFailed,

    // Service provider events
    /// An AuthnRequest was issued.
    AuthnRequestIssued,
    /// A Response was validated and accepted.
    ResponseAccepted,
    /// A Response was rejected.
    ResponseRejected,

    // Identity provider events
    /// An inbound AuthnRequest was accepted.
    AuthnRequestAccepted,
    /// An inbound AuthnRequest was rejected.
    AuthnRequestRejected,
    /// A Response was issued.
    ResponseIssued,
}

impl EventType {
    /// Returns the wire name of the event type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RoleRegistered => "ROLE_REGISTERED",
            Self::RoleUnregistered => "ROLE_UNREGISTERED",
            Self::EntityUpserted => "ENTITY_UPSERTED",
            Self::EntityRemoved => "ENTITY_REMOVED",
            Self::EntityRefreshed => "ENTITY_REFRESHED",
            Self::EntityRefreshFailed => "ENTITY_REFRESH_FAILED",
            Self::AuthnRequestIssued => "AUTHN_REQUEST_ISSUED",
            Self::ResponseAccepted => "RESPONSE_ACCEPTED",
            Self::ResponseRejected => "RESPONSE_REJECTED",
            Self::AuthnRequestAccepted => "AUTHN_REQUEST_ACCEPTED",
            Self::AuthnRequestRejected => "AUTHN_REQUEST_REJECTED",
            Self::ResponseIssued => "RESPONSE_ISSUED",
        }
    }
}

/// Outcome of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOutcome {
    /// Operation succeeded.
    Success,
    /// Operation failed.
    Failure,
}

/// A federation audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: Uuid,

    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,

    /// Type of event.
    pub event_type: EventType,

    /// Outcome of the event.
    pub outcome: EventOutcome,

    /// Entity ID of the local authority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authority: Option<String>,

    /// Entity ID of the remote party.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,

    /// Protocol message ID involved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    /// Error message (for failure events).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Additional details as key-value pairs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<(String, String)>,
}

impl Event {
    /// Creates a new event builder.
    #[must_use]
    pub const fn builder(event_type: EventType) -> EventBuilder {
        EventBuilder::new(event_type)
    }

    /// Writes the event to the audit log.
    pub fn emit(&self) {
        let details = serde_json::to_string(&self.details).unwrap_or_default();
        match self.outcome {
            EventOutcome::Success => tracing::info!(
                target: "sf::audit",
                event_id = %self.id,
                event_type = self.event_type.as_str(),
                authority = self.authority.as_deref().unwrap_or("-"),
                peer = self.peer.as_deref().unwrap_or("-"),
                message_id = self.message_id.as_deref().unwrap_or("-"),
                details = %details,
                "federation event"
            ),
            EventOutcome::Failure => tracing::warn!(
                target: "sf::audit",
                event_id = %self.id,
                event_type = self.event_type.as_str(),
                authority = self.authority.as_deref().unwrap_or("-"),
                peer = self.peer.as_deref().unwrap_or("-"),
                message_id = self.message_id.as_deref().unwrap_or("-"),
                error = self.error.as_deref().unwrap_or("-"),
                details = %details,
                "federation event failed"
            ),
        }
    }
}

/// Builder for creating events.
pub struct EventBuilder {
    event_type: EventType,
    outcome: EventOutcome,
    authority: Option<String>,
    peer: Option<String>,
    message_id: Option<String>,
    error: Option<String>,
    details: Vec<(String, String)>,
}

impl EventBuilder {
    /// Creates a new event builder.
    #[must_use]
    pub const fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            outcome: EventOutcome::Success,
            authority: None,
            peer: None,
            message_id: None,
            error: None,
            details: Vec::new(),
        }
    }

    /// Sets the outcome to success.
    #[must_use]
    pub const fn success(mut self) -> Self {
        self.outcome = EventOutcome::Success;
        self
    }

    /// Sets the outcome to failure with an error message.
    #[must_use]
    pub fn failure(mut self, error: impl Into<String>) -> Self {
        self.outcome = EventOutcome::Failure;
        self.error = Some(error.into());
        self
    }

    /// Sets the local authority.
    #[must_use]
    pub fn authority(mut self, entity_id: impl Into<String>) -> Self {
        self.authority = Some(entity_id.into());
        self
    }

    /// Sets the remote party.
    #[must_use]
    pub fn peer(mut self, entity_id: impl Into<String>) -> Self {
        self.peer = Some(entity_id.into());
        self
    }

    /// Sets the message ID.
    #[must_use]
    pub fn message(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Adds a detail key-value pair.
    #[must_use]
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.push((key.into(), value.into()));
        self
    }

    /// Builds the event.
    #[must_use]
    pub fn build(self) -> Event {
        Event {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            event_type: self.event_type,
            outcome: self.outcome,
            authority: self.authority,
            peer: self.peer,
            message_id: self.message_id,
            error: self.error,
            details: self.details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_builder_creates_success_event() {
        let event = Event::builder(EventType::ResponseAccepted)
            .success()
            .authority("https://sp.example.org")
            .peer("https://idp.example.org")
            .message("_id42")
            .build();

        assert_eq!(event.event_type, EventType::ResponseAccepted);
        assert_eq!(event.outcome, EventOutcome::Success);
        assert_eq!(event.peer.as_deref(), Some("https://idp.example.org"));
        assert_eq!(event.message_id.as_deref(), Some("_id42"));
        assert!(event.error.is_none());
    }

    #[test]
    fn event_builder_creates_failure_event() {
        let event = Event::builder(EventType::EntityRefreshFailed)
            .failure("timeout")
            .detail("source", "https://md.example.org/idp.xml")
            .build();

        assert_eq!(event.outcome, EventOutcome::Failure);
        assert_eq!(event.error.as_deref(), Some("timeout"));
        assert_eq!(event.details.len(), 1);
    }

    #[test]
    fn event_serializes_type_in_screaming_case() {
        let event = Event::builder(EventType::RoleRegistered).build();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "ROLE_REGISTERED");
        assert_eq!(json["event_type"], EventType::RoleRegistered.as_str());
        assert!(json.get("peer").is_none());
    }

    #[test]
    fn event_has_timestamp() {
        let before = Utc::now();
        let event = Event::builder(EventType::RoleUnregistered).build();
        let after = Utc::now();

        assert!(event.timestamp >= before);
        assert!(event.timestamp <= after);
    }
}
