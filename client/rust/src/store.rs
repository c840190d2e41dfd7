//! Single authoritative client state and its reducer
//!
//! Every write goes through [`reduce`], which hands each event to the merge
//! function of the component that owns the affected fields:
//!
//! | fields                                    | owner                     |
//! |-------------------------------------------|---------------------------|
//! | conversation server fields, list status   | `sync::conversations`     |
//! | thread contents from snapshots            | `sync::thread`            |
//! | message id / status transitions           | `sync::send`              |
//! | `blocked`, `reported`                     | `safety`                  |
//! | search query, generation, results         | `search`                  |

use crate::models::{
    Conversation, ConversationKey, ConversationRecord, Message, MessageRecord, TempId, UserId,
    UserSummary,
};
use crate::{safety, search, sync};
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListStatus {
    /// No fetch has completed yet
    #[default]
    Loading,
    /// At least one server snapshot has been applied
    Ready,
    /// The first fetch failed; the list holds the placeholder dataset
    Placeholder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A non-fatal, user-visible message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn warning(text: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}

/// The open thread
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadState {
    pub key: ConversationKey,
    pub other_user_id: Option<UserId>,
    /// Selection generation; responses for another epoch are discarded
    pub epoch: u64,
    pub messages: Vec<Message>,
    /// Highest fetch sequence number applied in this epoch
    pub applied_seq: u64,
    pub loaded: bool,
}

impl ThreadState {
    pub fn new(key: ConversationKey, other_user_id: Option<UserId>, epoch: u64) -> Self {
        ThreadState {
            key,
            other_user_id,
            epoch,
            messages: Vec::new(),
            applied_seq: 0,
            loaded: false,
        }
    }

    /// Messages in display order: by timestamp, ties kept in stored order
    pub fn display_order(&self) -> Vec<&Message> {
        let mut ordered: Vec<&Message> = self.messages.iter().collect();
        ordered.sort_by_key(|m| m.timestamp);
        ordered
    }

    /// Display-ordered messages grouped by calendar day
    pub fn grouped_by_day(&self) -> Vec<(NaiveDate, Vec<&Message>)> {
        let mut groups: Vec<(NaiveDate, Vec<&Message>)> = Vec::new();
        for message in self.display_order() {
            match groups.last_mut() {
                Some((day, bucket)) if *day == message.day() => bucket.push(message),
                _ => groups.push((message.day(), vec![message])),
            }
        }
        groups
    }

    pub fn find_temp(&self, temp_id: &TempId) -> Option<&Message> {
        self.messages
            .iter()
            .find(|m| m.client_ref.as_ref() == Some(temp_id))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchState {
    pub query: String,
    /// Generation of the most recent query change
    pub generation: u64,
    pub results: Vec<UserSummary>,
    pub in_flight: bool,
}

#[derive(Debug, Clone)]
pub struct ChatState {
    pub me: UserId,
    pub conversations: Vec<Conversation>,
    pub list_status: ListStatus,
    /// Highest list fetch sequence number applied
    pub list_applied_seq: u64,
    pub thread: Option<ThreadState>,
    pub search: SearchState,
    pub notices: Vec<Notice>,
    pub reconcile_window: chrono::Duration,
}

impl Default for ChatState {
    fn default() -> Self {
        ChatState::new(
            UserId::default(),
            chrono::Duration::seconds(crate::config::DEFAULT_RECONCILE_WINDOW_SECS),
        )
    }
}

impl ChatState {
    pub fn new(me: UserId, reconcile_window: chrono::Duration) -> Self {
        ChatState {
            me,
            conversations: Vec::new(),
            list_status: ListStatus::Loading,
            list_applied_seq: 0,
            thread: None,
            search: SearchState::default(),
            notices: Vec::new(),
            reconcile_window,
        }
    }

    pub fn conversation(&self, key: &ConversationKey) -> Option<&Conversation> {
        self.conversations.iter().find(|c| &c.key == key)
    }

    /// Key of the open thread, if any
    pub fn open_key(&self) -> Option<&ConversationKey> {
        self.thread.as_ref().map(|t| &t.key)
    }
}

#[derive(Debug, Clone)]
pub enum SyncEvent {
    ConversationsLoaded {
        seq: u64,
        records: Vec<ConversationRecord>,
    },
    ConversationsFailed {
        seq: u64,
        error: String,
    },
    ChatStarted(UserSummary),
    ThreadOpened {
        key: ConversationKey,
        epoch: u64,
    },
    ThreadClosed,
    ThreadLoaded {
        epoch: u64,
        seq: u64,
        messages: Vec<Message>,
    },
    ThreadFailed {
        epoch: u64,
        error: String,
    },
    SendQueued {
        recipient: UserId,
        message: Message,
    },
    SendConfirmed {
        temp_id: TempId,
        record: MessageRecord,
    },
    SendFailed {
        temp_id: TempId,
        error: String,
    },
    Blocked(ConversationKey),
    Reported(ConversationKey),
    SearchStarted {
        generation: u64,
        query: String,
    },
    SearchResolved {
        generation: u64,
        users: Vec<UserSummary>,
    },
    SearchFailed {
        generation: u64,
        error: String,
    },
    SearchCleared {
        generation: u64,
    },
    NoticesDrained,
}

/// Apply one event: `(state, event) -> state`
pub fn reduce(mut state: ChatState, event: SyncEvent) -> ChatState {
    match event {
        SyncEvent::ConversationsLoaded { seq, records } => {
            if seq <= state.list_applied_seq {
                log::debug!("Discarding stale conversation snapshot #{}", seq);
                return state;
            }
            state.conversations =
                sync::conversations::merge_snapshot(&state.conversations, &records, state.open_key());
            state.list_applied_seq = seq;
            state.list_status = ListStatus::Ready;
        }
        SyncEvent::ConversationsFailed { seq, error } => {
            if state.list_status == ListStatus::Loading && seq > state.list_applied_seq {
                state.conversations = sync::conversations::with_placeholders(&state.conversations);
                state.list_status = ListStatus::Placeholder;
                state
                    .notices
                    .push(Notice::warning(format!("Could not load conversations: {}", error)));
            }
        }
        SyncEvent::ChatStarted(user) => {
            state.conversations = sync::conversations::pre_register(&state.conversations, &user);
        }
        SyncEvent::ThreadOpened { key, epoch } => {
            let previous = state.thread.take().map(|t| t.key);
            state.conversations = sync::conversations::mark_opened(&state.conversations, &key);
            if let Some(previous) = previous.filter(|p| p != &key) {
                state.conversations = sync::conversations::forget_local(&state.conversations, &previous);
            }
            let other_user_id = state.conversation(&key).and_then(|c| c.recipient().cloned());
            state.thread = Some(ThreadState::new(key, other_user_id, epoch));
        }
        SyncEvent::ThreadClosed => {
            if let Some(closed) = state.thread.take() {
                state.conversations = sync::conversations::forget_local(&state.conversations, &closed.key);
            }
        }
        SyncEvent::ThreadLoaded {
            epoch,
            seq,
            messages,
        } => {
            let window = state.reconcile_window;
            match state.thread.as_mut() {
                Some(thread) if thread.epoch == epoch && seq > thread.applied_seq => {
                    thread.messages = sync::thread::merge_snapshot(&thread.messages, messages, window);
                    thread.applied_seq = seq;
                    thread.loaded = true;
                }
                _ => log::debug!("Discarding thread snapshot for epoch {} (#{})", epoch, seq),
            }
        }
        SyncEvent::ThreadFailed { epoch, error } => {
            let first_load = matches!(
                &state.thread,
                Some(t) if t.epoch == epoch && !t.loaded && t.messages.is_empty()
            );
            if first_load {
                state
                    .notices
                    .push(Notice::warning(format!("Could not load messages: {}", error)));
            }
        }
        SyncEvent::SendQueued { recipient, message } => match state.thread.as_mut() {
            Some(thread) if thread.other_user_id.as_ref() == Some(&recipient) => {
                thread.messages = sync::send::queue_provisional(std::mem::take(&mut thread.messages), message);
            }
            _ => log::debug!("No open thread for {}; provisional message not shown", recipient),
        },
        SyncEvent::SendConfirmed { temp_id, record } => {
            if let Some(thread) = state.thread.as_mut() {
                thread.messages = sync::send::confirm(std::mem::take(&mut thread.messages), &temp_id, &record);
            }
        }
        SyncEvent::SendFailed { temp_id, error } => {
            if let Some(thread) = state.thread.as_mut() {
                thread.messages = sync::send::mark_failed(std::mem::take(&mut thread.messages), &temp_id);
            }
            state
                .notices
                .push(Notice::error(format!("Message could not be sent: {}", error)));
        }
        SyncEvent::Blocked(key) => {
            state.conversations = safety::block(std::mem::take(&mut state.conversations), &key);
        }
        SyncEvent::Reported(key) => {
            state.conversations = safety::report(std::mem::take(&mut state.conversations), &key);
        }
        SyncEvent::SearchStarted { generation, query } => {
            state.search = search::begin(std::mem::take(&mut state.search), generation, query);
        }
        SyncEvent::SearchResolved { generation, users } => {
            let candidates = search::filter_candidates(users, &state.me, &state.conversations);
            state.search = search::resolve(std::mem::take(&mut state.search), generation, candidates);
        }
        SyncEvent::SearchFailed { generation, error } => {
            if generation == state.search.generation {
                state
                    .notices
                    .push(Notice::warning(format!("Search failed: {}", error)));
            }
            state.search = search::fail(std::mem::take(&mut state.search), generation);
        }
        SyncEvent::SearchCleared { generation } => {
            state.search = search::clear(generation);
        }
        SyncEvent::NoticesDrained => state.notices.clear(),
    }
    state
}

/// Shared handle to the state; cloning shares the same store
#[derive(Clone)]
pub struct ChatStore {
    state: Arc<Mutex<ChatState>>,
}

impl ChatStore {
    pub fn new(me: UserId, reconcile_window: chrono::Duration) -> Self {
        ChatStore {
            state: Arc::new(Mutex::new(ChatState::new(me, reconcile_window))),
        }
    }

    pub async fn dispatch(&self, event: SyncEvent) {
        let mut guard = self.state.lock().await;
        let current = std::mem::take(&mut *guard);
        *guard = reduce(current, event);
    }

    /// Run a read-only query against the current state
    pub async fn read<R>(&self, f: impl FnOnce(&ChatState) -> R) -> R {
        let guard = self.state.lock().await;
        f(&guard)
    }

    pub async fn snapshot(&self) -> ChatState {
        self.state.lock().await.clone()
    }

    /// Return and clear the pending notices
    pub async fn take_notices(&self) -> Vec<Notice> {
        let mut guard = self.state.lock().await;
        let notices = guard.notices.clone();
        let current = std::mem::take(&mut *guard);
        *guard = reduce(current, SyncEvent::NoticesDrained);
        notices
    }
}
