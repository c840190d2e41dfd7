/// Message model for the campus chat client.
/// Represents a message in a 1:1 thread, either server-confirmed or provisional.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{deserialize_id, parse_timestamp, UserId};

/// Locally generated identity of a message that is still in flight
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TempId(String);

impl TempId {
    pub fn new() -> Self {
        TempId(format!("temp-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TempId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageId {
    /// Identifier assigned by the backend
    Server(String),
    /// Provisional identifier while the send is in flight
    Temp(TempId),
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Server(id) => f.write_str(id),
            MessageId::Temp(id) => write!(f, "{}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sender {
    /// Authored by the current user
    Me,
    User(UserId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Sent,
    Failed,
    /// Reserved; no current flow produces it
    Seen,
}

/// One entry of `{ messages: [...] }` or the `message` of a send response
#[derive(Debug, Clone, Deserialize)]
pub struct MessageRecord {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub sender_id: Option<UserId>,
    #[serde(default)]
    pub content: String,
    #[serde(default, alias = "timestamp")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    /// Provisional id this message was created under; survives reconciliation
    pub client_ref: Option<TempId>,
    pub sender: Sender,
    pub content: String,
    /// Display and sort key. Provisional messages keep their client timestamp.
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
    /// True until the message has been seen in a server thread snapshot
    pub local_only: bool,
}

impl Message {
    /// Create a provisional message authored by the current user
    pub fn provisional(content: impl Into<String>) -> Self {
        Self::provisional_as(TempId::new(), content)
    }

    /// Create a provisional message under a caller-chosen temp id
    pub fn provisional_as(temp_id: TempId, content: impl Into<String>) -> Self {
        Message {
            id: MessageId::Temp(temp_id.clone()),
            client_ref: Some(temp_id),
            sender: Sender::Me,
            content: content.into(),
            timestamp: Utc::now(),
            status: MessageStatus::Sending,
            local_only: true,
        }
    }

    /// Create a message from a server record (already confirmed)
    pub fn from_record(record: &MessageRecord, me: &UserId) -> Self {
        let sender = match &record.sender_id {
            Some(id) if id == me || id.as_str() == "me" => Sender::Me,
            Some(id) => Sender::User(id.clone()),
            None => Sender::User(UserId::default()),
        };
        Message {
            id: MessageId::Server(record.id.clone()),
            client_ref: None,
            sender,
            content: record.content.clone(),
            timestamp: record
                .created_at
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            status: MessageStatus::Sent,
            local_only: false,
        }
    }

    /// The send succeeded: same position and sort key, server identity, `sent`
    pub fn confirmed(&self, record: &MessageRecord) -> Self {
        Message {
            id: MessageId::Server(record.id.clone()),
            client_ref: self.client_ref.clone(),
            sender: Sender::Me,
            content: if record.content.is_empty() {
                self.content.clone()
            } else {
                record.content.clone()
            },
            timestamp: self.timestamp,
            status: MessageStatus::Sent,
            local_only: true,
        }
    }

    /// Adopt a canonical server copy while keeping the client-side sort key
    pub fn superseded_by(&self, canonical: &Message) -> Self {
        Message {
            client_ref: self.client_ref.clone(),
            timestamp: self.timestamp,
            ..canonical.clone()
        }
    }

    pub fn temp_id(&self) -> Option<&TempId> {
        match &self.id {
            MessageId::Temp(id) => Some(id),
            MessageId::Server(_) => None,
        }
    }

    pub fn server_id(&self) -> Option<&str> {
        match &self.id {
            MessageId::Server(id) => Some(id),
            MessageId::Temp(_) => None,
        }
    }

    pub fn is_mine(&self) -> bool {
        self.sender == Sender::Me
    }

    /// Calendar day used to group the thread for display
    pub fn day(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: &str) -> MessageRecord {
        serde_json::from_str(json).expect("Deserialization failed")
    }

    #[test]
    fn test_temp_ids_are_unique() {
        assert_ne!(TempId::new(), TempId::new());
        assert!(TempId::new().as_str().starts_with("temp-"));
    }

    #[test]
    fn test_provisional_message() {
        let msg = Message::provisional("hi");

        assert_eq!(msg.status, MessageStatus::Sending);
        assert_eq!(msg.sender, Sender::Me);
        assert!(msg.local_only);
        assert_eq!(msg.temp_id(), msg.client_ref.as_ref());
    }

    #[test]
    fn test_from_record_resolves_sender() {
        let me = UserId::from(1);
        let mine = Message::from_record(
            &record(r#"{"id":10,"sender_id":1,"content":"a","created_at":"2025-10-20T10:00:00Z"}"#),
            &me,
        );
        let theirs = Message::from_record(
            &record(r#"{"id":"11","sender_id":"2","content":"b"}"#),
            &me,
        );
        let sentinel = Message::from_record(&record(r#"{"id":12,"sender_id":"me","content":"c"}"#), &me);

        assert!(mine.is_mine());
        assert_eq!(mine.server_id(), Some("10"));
        assert_eq!(theirs.sender, Sender::User(UserId::from(2)));
        assert_eq!(theirs.timestamp, DateTime::<Utc>::UNIX_EPOCH);
        assert!(sentinel.is_mine());
        assert!(!mine.local_only);
    }

    #[test]
    fn test_confirmed_keeps_sort_key() {
        let provisional = Message::provisional("hello");
        let confirmed = provisional.confirmed(&record(
            r#"{"id":42,"content":"hello","created_at":"2030-01-01T00:00:00Z"}"#,
        ));

        assert_eq!(confirmed.id, MessageId::Server("42".to_string()));
        assert_eq!(confirmed.status, MessageStatus::Sent);
        assert_eq!(confirmed.timestamp, provisional.timestamp);
        assert_eq!(confirmed.client_ref, provisional.client_ref);
    }

    #[test]
    fn test_superseded_by_takes_canonical_identity() {
        let local = Message::provisional("hey");
        let canonical = Message::from_record(
            &record(r#"{"id":7,"sender_id":1,"content":"hey","created_at":"2025-10-20T10:00:00Z"}"#),
            &UserId::from(1),
        );
        let merged = local.superseded_by(&canonical);

        assert_eq!(merged.id, canonical.id);
        assert!(!merged.local_only);
        assert_eq!(merged.timestamp, local.timestamp);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&MessageStatus::Failed).unwrap(), "\"failed\"");
    }
}
