/// Local moderation state: block and report.
/// The flags live only on the client and survive every server refresh.

use crate::api::ChatBackend;
use crate::error::{ClientError, Result};
use crate::models::{Conversation, ConversationKey};
use crate::selection::ConversationSelectionController;
use crate::store::{ChatStore, SyncEvent};
use std::sync::Arc;

pub fn block(mut conversations: Vec<Conversation>, key: &ConversationKey) -> Vec<Conversation> {
    for conversation in conversations.iter_mut().filter(|c| &c.key == key) {
        conversation.blocked = true;
    }
    conversations
}

pub fn report(mut conversations: Vec<Conversation>, key: &ConversationKey) -> Vec<Conversation> {
    for conversation in conversations.iter_mut().filter(|c| &c.key == key) {
        conversation.reported = true;
    }
    conversations
}

/// The conversations the UI may render; blocked ones stay in the store
pub fn visible(conversations: &[Conversation]) -> Vec<Conversation> {
    conversations
        .iter()
        .filter(|c| c.is_visible())
        .cloned()
        .collect()
}

pub struct SafetyGate {
    backend: Arc<dyn ChatBackend>,
    store: ChatStore,
    selection: Arc<ConversationSelectionController>,
}

impl SafetyGate {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        store: ChatStore,
        selection: Arc<ConversationSelectionController>,
    ) -> Self {
        SafetyGate {
            backend,
            store,
            selection,
        }
    }

    /// Hide a conversation; closes the thread if it is the open one.
    /// Nothing is sent to the backend.
    pub async fn block(&self, key: &ConversationKey) -> Result<()> {
        self.require(key).await?;
        self.store.dispatch(SyncEvent::Blocked(key.clone())).await;
        log::info!("Blocked conversation {}", key);

        if self.selection.active_key().await.as_ref() == Some(key) {
            self.selection.close().await;
        }
        Ok(())
    }

    /// Flag a conversation as reported and notify the backend without waiting.
    ///
    /// The local flag stays set whether or not the notification succeeds.
    pub async fn report(&self, key: &ConversationKey) -> Result<()> {
        let conversation = self.require(key).await?;
        self.store.dispatch(SyncEvent::Reported(key.clone())).await;
        log::info!("Reported conversation {}", key);

        let Some(other_user_id) = conversation.recipient().cloned() else {
            log::debug!("Conversation {} has no counterpart to report", key);
            return Ok(());
        };
        let backend = self.backend.clone();
        tokio::spawn(async move {
            if let Err(e) = backend.report_user(&other_user_id).await {
                log::warn!("Report for user {} was not delivered: {}", other_user_id, e);
            }
        });
        Ok(())
    }

    pub async fn visible_conversations(&self) -> Vec<Conversation> {
        self.store.read(|s| visible(&s.conversations)).await
    }

    pub async fn is_blocked(&self, key: &ConversationKey) -> bool {
        self.store
            .read(|s| s.conversation(key).map(|c| c.blocked).unwrap_or(false))
            .await
    }

    async fn require(&self, key: &ConversationKey) -> Result<Conversation> {
        self.store
            .read(|s| s.conversation(key).cloned())
            .await
            .ok_or_else(|| ClientError::ConversationNotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConversationRecord, UserId};

    fn conversations() -> Vec<Conversation> {
        [2, 3]
            .iter()
            .filter_map(|id| {
                let record: ConversationRecord =
                    serde_json::from_value(serde_json::json!({ "other_user_id": id })).ok()?;
                Conversation::from_record(&record)
            })
            .collect()
    }

    #[test]
    fn test_blocked_hidden_but_retained() {
        let key = ConversationKey::Direct(UserId::from(2));
        let flagged = block(conversations(), &key);

        assert_eq!(flagged.len(), 2);
        assert!(flagged[0].blocked);

        let shown = visible(&flagged);
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].key, ConversationKey::Direct(UserId::from(3)));
    }

    #[test]
    fn test_report_does_not_hide() {
        let key = ConversationKey::Direct(UserId::from(3));
        let flagged = report(conversations(), &key);

        assert!(flagged[1].reported);
        assert_eq!(visible(&flagged).len(), 2);
    }
}
