/// Campus chat client orchestrator
///
/// Wires the backend, the store, and the synchronization components together
/// and exposes the operations a front end drives.

use crate::api::{ChatBackend, ServerApi};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::models::{Conversation, ConversationKey, Message, MessageStatus, TempId, UserSummary};
use crate::safety::SafetyGate;
use crate::search::SearchDebouncer;
use crate::selection::ConversationSelectionController;
use crate::store::{ChatState, ChatStore, ListStatus, Notice, ThreadState};
use crate::sync::{ConversationSynchronizer, OptimisticSendPipeline, SendOutcome};
use std::sync::Arc;

pub struct MessagingClient {
    config: ClientConfig,
    store: ChatStore,
    conversations: Arc<ConversationSynchronizer>,
    selection: Arc<ConversationSelectionController>,
    pipeline: OptimisticSendPipeline,
    safety: SafetyGate,
    search: SearchDebouncer,
}

impl MessagingClient {
    /// Create a client that talks to the configured server over HTTP
    pub fn new(config: ClientConfig) -> Result<Self> {
        let api = ServerApi::new(&config)?;
        Ok(Self::with_backend(config, Arc::new(api)))
    }

    /// Create a client over any backend
    pub fn with_backend(config: ClientConfig, backend: Arc<dyn ChatBackend>) -> Self {
        let store = ChatStore::new(config.user_id.clone(), config.reconcile_window);
        let conversations = ConversationSynchronizer::new(
            backend.clone(),
            store.clone(),
            config.list_poll_interval,
        );
        let selection = ConversationSelectionController::new(
            backend.clone(),
            store.clone(),
            config.user_id.clone(),
            config.thread_poll_interval,
        );
        let pipeline =
            OptimisticSendPipeline::new(backend.clone(), store.clone(), conversations.clone());
        let safety = SafetyGate::new(backend.clone(), store.clone(), selection.clone());
        let search = SearchDebouncer::new(backend, store.clone(), config.search_debounce);

        MessagingClient {
            config,
            store,
            conversations,
            selection,
            pipeline,
            safety,
            search,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    /// Begin polling the conversation list
    pub async fn start(&self) {
        log::info!("Starting conversation sync for user {}", self.config.user_id);
        self.conversations.start().await;
    }

    /// Stop every timer this client owns
    pub async fn shutdown(&self) {
        self.conversations.stop().await;
        self.selection.close().await;
        self.search.clear().await;
        log::info!("Client stopped");
    }

    /// Fetch the conversation list now
    pub async fn refresh_conversations(&self) -> Vec<Conversation> {
        self.conversations.refresh().await;
        self.conversations().await
    }

    /// Conversations the UI may show; blocked ones are excluded
    pub async fn conversations(&self) -> Vec<Conversation> {
        self.safety.visible_conversations().await
    }

    pub async fn list_status(&self) -> ListStatus {
        self.store.read(|s| s.list_status).await
    }

    pub async fn open(&self, key: &ConversationKey) -> Result<()> {
        self.selection.select(key).await
    }

    pub async fn close(&self) {
        self.selection.close().await;
    }

    pub async fn start_chat(&self, user: &UserSummary) -> Result<Conversation> {
        let conversation = self.selection.start_chat(user).await?;
        self.search.clear().await;
        Ok(conversation)
    }

    pub async fn active_conversation(&self) -> Option<Conversation> {
        self.selection.active_conversation().await
    }

    pub async fn thread(&self) -> Option<ThreadState> {
        self.store.read(|s| s.thread.clone()).await
    }

    /// Poll the open thread now
    pub async fn refresh_thread(&self) -> Option<Vec<Message>> {
        self.selection.refresh_active().await
    }

    /// Send to the open conversation
    pub async fn send(&self, text: &str) -> Result<SendOutcome> {
        let conversation = self.require_active().await?;
        self.pipeline.send(&conversation, text).await
    }

    /// Resend a failed message in the open conversation
    pub async fn resend(&self, temp_id: &TempId) -> Result<SendOutcome> {
        let conversation = self.require_active().await?;
        self.pipeline.resend(&conversation, temp_id).await
    }

    /// The newest failed message in the open thread, if any
    pub async fn last_failed(&self) -> Option<TempId> {
        self.store
            .read(|s| {
                s.thread.as_ref().and_then(|t| {
                    t.messages
                        .iter()
                        .rev()
                        .find(|m| m.status == MessageStatus::Failed)
                        .and_then(|m| m.temp_id().cloned())
                })
            })
            .await
    }

    pub async fn block(&self, key: &ConversationKey) -> Result<()> {
        self.safety.block(key).await
    }

    pub async fn report(&self, key: &ConversationKey) -> Result<()> {
        self.safety.report(key).await
    }

    pub async fn search(&self, query: &str) {
        self.search.on_query_change(query).await;
    }

    pub async fn search_results(&self) -> Vec<UserSummary> {
        self.search.results().await
    }

    pub async fn take_notices(&self) -> Vec<Notice> {
        self.store.take_notices().await
    }

    pub async fn snapshot(&self) -> ChatState {
        self.store.snapshot().await
    }

    async fn require_active(&self) -> Result<Conversation> {
        self.selection
            .active_conversation()
            .await
            .ok_or_else(|| ClientError::ConversationNotFound("no conversation is open".to_string()))
    }
}
