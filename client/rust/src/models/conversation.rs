/// Conversation model for the campus chat client.
/// A conversation is one entry of the conversation list, keyed by counterpart or group.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{deserialize_id, parse_timestamp, UserId, UserSummary};

/// Deduplication key of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConversationKey {
    /// 1:1 chat, keyed by the other user's id
    Direct(UserId),
    /// Group chat, keyed by the group identifier
    Group(String),
    /// Locally generated stand-in shown when the first load fails
    Placeholder(u32),
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationKey::Direct(id) => write!(f, "{}", id),
            ConversationKey::Group(id) => write!(f, "group:{}", id),
            ConversationKey::Placeholder(n) => write!(f, "placeholder:{}", n),
        }
    }
}

fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "deserialize_id")] String);

    let wrapped: Option<Wrapper> = Option::deserialize(deserializer)?;
    Ok(wrapped.map(|Wrapper(id)| id).filter(|id| !id.is_empty()))
}

/// One entry of `GET /messages` → `{ conversations: [...] }`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConversationRecord {
    #[serde(default)]
    pub other_user_id: Option<UserId>,
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub group_id: Option<String>,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default, alias = "other_user_name", alias = "name")]
    pub display_name: String,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default, alias = "last_message_time", alias = "last_message_at")]
    pub last_message_timestamp: Option<String>,
    #[serde(default)]
    pub unread_count: i64,
    #[serde(default)]
    pub online: bool,
}

impl ConversationRecord {
    /// Key this record merges under; `None` for records that name no counterpart
    pub fn key(&self) -> Option<ConversationKey> {
        if self.is_group || self.other_user_id.is_none() {
            return self.group_id.clone().map(ConversationKey::Group);
        }
        self.other_user_id
            .as_ref()
            .filter(|id| id.is_valid())
            .map(|id| ConversationKey::Direct(id.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub key: ConversationKey,
    /// `None` for group conversations
    pub other_user_id: Option<UserId>,
    pub is_group: bool,
    pub display_name: String,
    pub last_message: String,
    pub last_message_timestamp: Option<DateTime<Utc>>,
    pub unread_count: u32,
    pub online: bool,
    /// Client-owned; never supplied by the server
    pub blocked: bool,
    /// Client-owned; never supplied by the server
    pub reported: bool,
    /// Started locally and not yet seen in a server snapshot
    pub local_only: bool,
    /// Part of the fallback dataset shown when the first load fails
    pub placeholder: bool,
}

impl Conversation {
    /// Map a server record; records without a usable key are dropped
    pub fn from_record(record: &ConversationRecord) -> Option<Self> {
        let key = record.key()?;
        let is_group = matches!(key, ConversationKey::Group(_));
        let other_user_id = match &key {
            ConversationKey::Direct(id) => Some(id.clone()),
            _ => None,
        };
        let display_name = if record.display_name.trim().is_empty() {
            key.to_string()
        } else {
            record.display_name.clone()
        };

        Some(Conversation {
            key,
            other_user_id,
            is_group,
            display_name,
            last_message: record.last_message.clone().unwrap_or_default(),
            last_message_timestamp: record
                .last_message_timestamp
                .as_deref()
                .and_then(parse_timestamp),
            unread_count: record.unread_count.clamp(0, u32::MAX as i64) as u32,
            online: record.online,
            blocked: false,
            reported: false,
            local_only: false,
            placeholder: false,
        })
    }

    /// Pre-register a 1:1 conversation before its first message exists
    pub fn started_with(user: &UserSummary) -> Self {
        Conversation {
            key: ConversationKey::Direct(user.id.clone()),
            other_user_id: Some(user.id.clone()),
            is_group: false,
            display_name: user.display_name(),
            last_message: String::new(),
            last_message_timestamp: None,
            unread_count: 0,
            online: false,
            blocked: false,
            reported: false,
            local_only: true,
            placeholder: false,
        }
    }

    /// Fallback dataset for a failed first load; none of these can be sent to
    pub fn placeholders() -> Vec<Self> {
        ["Campus Help Desk", "Student Council"]
            .iter()
            .enumerate()
            .map(|(n, name)| Conversation {
                key: ConversationKey::Placeholder(n as u32 + 1),
                other_user_id: None,
                is_group: false,
                display_name: name.to_string(),
                last_message: "Messages are unavailable right now".to_string(),
                last_message_timestamp: None,
                unread_count: 0,
                online: false,
                blocked: false,
                reported: false,
                local_only: false,
                placeholder: true,
            })
            .collect()
    }

    /// The counterpart a message can be delivered to, if any
    pub fn recipient(&self) -> Option<&UserId> {
        if self.is_group || self.placeholder {
            return None;
        }
        self.other_user_id.as_ref().filter(|id| id.is_valid())
    }

    /// Whether the UI may render this conversation
    pub fn is_visible(&self) -> bool {
        !self.blocked
    }
}
