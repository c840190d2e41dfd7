/// Conversation selection.
/// Owns the lifecycle of the thread poller: one poller per selection, tagged with an epoch.

use crate::api::ChatBackend;
use crate::error::{ClientError, Result};
use crate::models::{Conversation, ConversationKey, Message, UserId, UserSummary};
use crate::store::{ChatStore, SyncEvent};
use crate::sync::MessageThreadSynchronizer;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub struct ConversationSelectionController {
    backend: Arc<dyn ChatBackend>,
    store: ChatStore,
    me: UserId,
    thread_poll_interval: Duration,
    next_epoch: AtomicU64,
    active: Mutex<Option<Arc<MessageThreadSynchronizer>>>,
}

impl ConversationSelectionController {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        store: ChatStore,
        me: UserId,
        thread_poll_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(ConversationSelectionController {
            backend,
            store,
            me,
            thread_poll_interval,
            next_epoch: AtomicU64::new(0),
            active: Mutex::new(None),
        })
    }

    /// Open a conversation.
    ///
    /// The previous poller is stopped before the new epoch begins, so nothing
    /// it fetched can land in the new thread.
    pub async fn select(&self, key: &ConversationKey) -> Result<()> {
        let conversation = self
            .store
            .read(|s| s.conversation(key).cloned())
            .await
            .ok_or_else(|| ClientError::ConversationNotFound(key.to_string()))?;
        if conversation.blocked {
            return Err(ClientError::Blocked(key.to_string()));
        }

        let mut active = self.active.lock().await;
        let already_open = self.store.read(|s| s.open_key() == Some(key)).await;
        if already_open && (active.is_some() || conversation.recipient().is_none()) {
            // Reopening keeps the thread, including failed and in-flight sends
            log::debug!("Conversation {} is already open", key);
            return Ok(());
        }
        if let Some(previous) = active.take() {
            previous.stop().await;
        }

        let epoch = self.next_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.store
            .dispatch(SyncEvent::ThreadOpened {
                key: key.clone(),
                epoch,
            })
            .await;
        log::info!("Opened conversation {} (epoch {})", key, epoch);

        match conversation.recipient() {
            Some(other_user_id) => {
                let poller = MessageThreadSynchronizer::new(
                    self.backend.clone(),
                    self.store.clone(),
                    self.me.clone(),
                    other_user_id.clone(),
                    epoch,
                    self.thread_poll_interval,
                );
                poller.start().await;
                *active = Some(poller);
            }
            None => log::debug!("Conversation {} has no 1:1 thread to poll", key),
        }
        Ok(())
    }

    /// Close the open thread and stop its poller
    pub async fn close(&self) {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            previous.stop().await;
        }
        self.store.dispatch(SyncEvent::ThreadClosed).await;
    }

    /// Start a 1:1 chat with a search result and open it
    pub async fn start_chat(&self, user: &UserSummary) -> Result<Conversation> {
        if !user.id.is_valid() || user.id == self.me {
            return Err(ClientError::NoRecipient);
        }
        self.store.dispatch(SyncEvent::ChatStarted(user.clone())).await;

        let key = ConversationKey::Direct(user.id.clone());
        self.select(&key).await?;
        self.store
            .read(|s| s.conversation(&key).cloned())
            .await
            .ok_or_else(|| ClientError::ConversationNotFound(key.to_string()))
    }

    pub async fn active_key(&self) -> Option<ConversationKey> {
        self.store.read(|s| s.open_key().cloned()).await
    }

    pub async fn active_conversation(&self) -> Option<Conversation> {
        self.store
            .read(|s| s.open_key().and_then(|k| s.conversation(k)).cloned())
            .await
    }

    /// Poll the open thread now instead of waiting for the next tick
    pub async fn refresh_active(&self) -> Option<Vec<Message>> {
        let poller = self.active.lock().await.clone()?;
        poller.refresh().await
    }
}
