/// Optimistic send pipeline.
/// Shows a provisional message immediately, then confirms or fails it once the backend answers.

use crate::api::ChatBackend;
use crate::error::{ClientError, Result};
use crate::models::{Conversation, Message, MessageRecord, MessageStatus, TempId};
use crate::store::{ChatStore, SyncEvent};
use crate::sync::ConversationSynchronizer;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The backend accepted the message
    Delivered { temp_id: TempId, message_id: String },
    /// The request failed; the message stays in the thread marked failed
    Failed { temp_id: TempId, error: String },
}

impl SendOutcome {
    pub fn temp_id(&self) -> &TempId {
        match self {
            SendOutcome::Delivered { temp_id, .. } | SendOutcome::Failed { temp_id, .. } => temp_id,
        }
    }
}

/// Append a provisional message to the thread
pub fn queue_provisional(mut messages: Vec<Message>, message: Message) -> Vec<Message> {
    messages.push(message);
    messages
}

/// Give the provisional message its server identity in place.
///
/// If a poll already brought in the server copy, the provisional entry is
/// simply dropped.
pub fn confirm(mut messages: Vec<Message>, temp_id: &TempId, record: &MessageRecord) -> Vec<Message> {
    let Some(slot) = messages.iter().position(|m| m.temp_id() == Some(temp_id)) else {
        log::debug!("Send {} confirmed after the thread moved on", temp_id);
        return messages;
    };

    if messages.iter().any(|m| m.server_id() == Some(record.id.as_str())) {
        messages.remove(slot);
    } else {
        messages[slot] = messages[slot].confirmed(record);
    }
    messages
}

/// Mark a still-sending provisional message as failed
pub fn mark_failed(mut messages: Vec<Message>, temp_id: &TempId) -> Vec<Message> {
    for message in messages.iter_mut() {
        if message.temp_id() == Some(temp_id) && message.status == MessageStatus::Sending {
            message.status = MessageStatus::Failed;
        }
    }
    messages
}

pub struct OptimisticSendPipeline {
    backend: Arc<dyn ChatBackend>,
    store: ChatStore,
    conversations: Arc<ConversationSynchronizer>,
}

impl OptimisticSendPipeline {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        store: ChatStore,
        conversations: Arc<ConversationSynchronizer>,
    ) -> Self {
        OptimisticSendPipeline {
            backend,
            store,
            conversations,
        }
    }

    /// Send `text` to the counterpart of `conversation`.
    ///
    /// Returns an error only when the send is rejected before any request is
    /// made. A network or server failure is reported as `SendOutcome::Failed`
    /// and is never retried automatically.
    pub async fn send(&self, conversation: &Conversation, text: &str) -> Result<SendOutcome> {
        let content = text.trim();
        if content.is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        if conversation.blocked {
            return Err(ClientError::Blocked(conversation.key.to_string()));
        }
        let recipient = conversation
            .recipient()
            .cloned()
            .ok_or(ClientError::NoRecipient)?;

        let temp_id = TempId::new();
        let message = Message::provisional_as(temp_id.clone(), content);
        self.store
            .dispatch(SyncEvent::SendQueued {
                recipient: recipient.clone(),
                message,
            })
            .await;

        match self.backend.send_message(&recipient, content).await {
            Ok(record) => {
                log::info!("Message {} delivered as {}", temp_id, record.id);
                let message_id = record.id.clone();
                self.store
                    .dispatch(SyncEvent::SendConfirmed {
                        temp_id: temp_id.clone(),
                        record,
                    })
                    .await;
                // Pull the new last message into the list right away
                self.conversations.refresh().await;
                Ok(SendOutcome::Delivered {
                    temp_id,
                    message_id,
                })
            }
            Err(e) => {
                log::warn!("Message {} to {} failed: {}", temp_id, recipient, e);
                let error = e.to_string();
                self.store
                    .dispatch(SyncEvent::SendFailed {
                        temp_id: temp_id.clone(),
                        error: error.clone(),
                    })
                    .await;
                Ok(SendOutcome::Failed { temp_id, error })
            }
        }
    }

    /// Send the content of a failed message again as a new message
    pub async fn resend(&self, conversation: &Conversation, temp_id: &TempId) -> Result<SendOutcome> {
        let content = self
            .store
            .read(|s| {
                s.thread
                    .as_ref()
                    .and_then(|t| t.find_temp(temp_id))
                    .filter(|m| m.status == MessageStatus::Failed)
                    .map(|m| m.content.clone())
            })
            .await
            .ok_or_else(|| ClientError::MessageNotFound(temp_id.to_string()))?;

        self.send(conversation, &content).await
    }
}
