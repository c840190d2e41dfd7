/// Debounced user search for starting new chats.
/// Only the latest query generation may write results.

use crate::api::ChatBackend;
use crate::models::{Conversation, UserId, UserSummary};
use crate::store::{ChatStore, SearchState, SyncEvent};
use crate::task::ScheduledTask;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Drop the current user and anyone already in the conversation list
pub fn filter_candidates(
    users: Vec<UserSummary>,
    me: &UserId,
    conversations: &[Conversation],
) -> Vec<UserSummary> {
    let existing: HashSet<&UserId> = conversations
        .iter()
        .filter_map(|c| c.other_user_id.as_ref())
        .collect();
    users
        .into_iter()
        .filter(|u| u.id.is_valid() && &u.id != me && !existing.contains(&u.id))
        .collect()
}

pub fn begin(mut search: SearchState, generation: u64, query: String) -> SearchState {
    search.generation = generation;
    search.query = query;
    search.in_flight = true;
    search
}

pub fn resolve(mut search: SearchState, generation: u64, results: Vec<UserSummary>) -> SearchState {
    if generation != search.generation {
        log::debug!(
            "Discarding search results for generation {} (latest {})",
            generation,
            search.generation
        );
        return search;
    }
    search.results = results;
    search.in_flight = false;
    search
}

pub fn fail(mut search: SearchState, generation: u64) -> SearchState {
    if generation == search.generation {
        search.results.clear();
        search.in_flight = false;
    }
    search
}

pub fn clear(generation: u64) -> SearchState {
    SearchState {
        generation,
        ..SearchState::default()
    }
}

pub struct SearchDebouncer {
    backend: Arc<dyn ChatBackend>,
    store: ChatStore,
    delay: Duration,
    generation: AtomicU64,
    pending: Mutex<Option<ScheduledTask>>,
}

impl SearchDebouncer {
    pub fn new(backend: Arc<dyn ChatBackend>, store: ChatStore, delay: Duration) -> Self {
        SearchDebouncer {
            backend,
            store,
            delay,
            generation: AtomicU64::new(0),
            pending: Mutex::new(None),
        }
    }

    /// Restart the debounce timer for `raw_query`.
    ///
    /// An empty query clears the results and issues no request.
    pub async fn on_query_change(&self, raw_query: &str) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let query = raw_query.trim().to_string();

        let mut pending = self.pending.lock().await;
        if let Some(previous) = pending.take() {
            previous.cancel();
        }

        if query.is_empty() {
            self.store.dispatch(SyncEvent::SearchCleared { generation }).await;
            return;
        }

        self.store
            .dispatch(SyncEvent::SearchStarted {
                generation,
                query: query.clone(),
            })
            .await;

        let backend = self.backend.clone();
        let store = self.store.clone();
        *pending = Some(ScheduledTask::after("user search", self.delay, async move {
            log::debug!("Searching users for '{}' (generation {})", query, generation);
            match backend.search_users(&query).await {
                Ok(users) => {
                    store
                        .dispatch(SyncEvent::SearchResolved { generation, users })
                        .await
                }
                Err(e) => {
                    log::warn!("User search for '{}' failed: {}", query, e);
                    store
                        .dispatch(SyncEvent::SearchFailed {
                            generation,
                            error: e.to_string(),
                        })
                        .await
                }
            }
        }));
    }

    /// Cancel any pending search and empty the results
    pub async fn clear(&self) {
        self.on_query_change("").await;
    }

    pub async fn results(&self) -> Vec<UserSummary> {
        self.store.read(|s| s.search.results.clone()).await
    }
}
