/// Data models for the campus chat client.
/// Defines conversations, messages, users, and their wire records.

pub mod conversation;
pub mod message;
pub mod user;

pub use conversation::{Conversation, ConversationKey, ConversationRecord};
pub use message::{Message, MessageId, MessageRecord, MessageStatus, Sender, TempId};
pub use user::{UserId, UserSummary};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Identifiers arrive as JSON numbers or strings; both become strings
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Int(i64),
        Uint(u64),
        Text(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Int(n) => n.to_string(),
        RawId::Uint(n) => n.to_string(),
        RawId::Text(s) => s.trim().to_string(),
    })
}

/// Parse a backend timestamp: RFC 3339 first, then the bare SQL layout
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_rfc3339_with_offset() {
        let ts = parse_timestamp("2025-03-01T10:00:00+02:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_sql_layout() {
        let ts = parse_timestamp("2025-03-01 10:00:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }
}
