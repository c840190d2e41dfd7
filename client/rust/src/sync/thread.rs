/// Message thread synchronization.
/// Polls the open 1:1 thread and reconciles the server's copy with locally pending messages.

use crate::api::ChatBackend;
use crate::models::{Message, UserId};
use crate::store::{ChatStore, SyncEvent};
use crate::task::ScheduledTask;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Merge a server thread snapshot with the current thread.
///
/// The snapshot is authoritative for everything it contains. A local message
/// already tied to a server id is replaced by that server copy, keeping its
/// client sort key. A provisional message (no server id yet) is matched by
/// content against my own unclaimed server messages within `window` of its
/// client timestamp; each server message is claimed at most once, oldest
/// provisional first. Unmatched provisional messages, and confirmed ones the
/// snapshot does not include yet, are appended in their existing order.
///
/// Applying the same snapshot twice yields the same thread.
pub fn merge_snapshot(
    current: &[Message],
    snapshot: Vec<Message>,
    window: chrono::Duration,
) -> Vec<Message> {
    let mut server_ids: HashSet<String> = HashSet::new();
    let mut merged: Vec<Message> = snapshot
        .into_iter()
        .filter(|m| match m.server_id() {
            Some(id) => server_ids.insert(id.to_string()),
            None => false,
        })
        .collect();

    let tied: HashMap<&str, &Message> = current
        .iter()
        .filter(|m| m.client_ref.is_some())
        .filter_map(|m| m.server_id().map(|id| (id, m)))
        .collect();

    let mut claimed = vec![false; merged.len()];
    for (slot, canonical) in merged.iter_mut().enumerate() {
        let local = canonical.server_id().and_then(|id| tied.get(id)).copied();
        if let Some(local) = local {
            *canonical = local.superseded_by(canonical);
            claimed[slot] = true;
        }
    }

    let mut pending = Vec::new();
    for local in current.iter().filter(|m| m.local_only) {
        match local.server_id() {
            Some(id) => {
                if !server_ids.contains(id) {
                    pending.push(local.clone());
                }
            }
            None => {
                let hit = merged.iter().enumerate().position(|(slot, candidate)| {
                    !claimed[slot]
                        && candidate.is_mine()
                        && candidate.content == local.content
                        && (candidate.timestamp - local.timestamp).abs() <= window
                });
                match hit {
                    Some(slot) => {
                        merged[slot] = local.superseded_by(&merged[slot]);
                        claimed[slot] = true;
                    }
                    None => pending.push(local.clone()),
                }
            }
        }
    }

    merged.extend(pending);
    merged
}

/// Polls one thread for the lifetime of one selection
pub struct MessageThreadSynchronizer {
    backend: Arc<dyn ChatBackend>,
    store: ChatStore,
    me: UserId,
    other_user_id: UserId,
    epoch: u64,
    period: Duration,
    next_seq: AtomicU64,
    task: Mutex<Option<ScheduledTask>>,
}

impl MessageThreadSynchronizer {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        store: ChatStore,
        me: UserId,
        other_user_id: UserId,
        epoch: u64,
        period: Duration,
    ) -> Arc<Self> {
        Arc::new(MessageThreadSynchronizer {
            backend,
            store,
            me,
            other_user_id,
            epoch,
            period,
            next_seq: AtomicU64::new(0),
            task: Mutex::new(None),
        })
    }

    pub fn other_user_id(&self) -> &UserId {
        &self.other_user_id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Fetch once and merge.
    ///
    /// Returns the thread after the merge, or `None` if the selection moved on
    /// while the request was in flight and the response was discarded.
    pub async fn refresh(&self) -> Option<Vec<Message>> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        match self.backend.fetch_thread(&self.other_user_id).await {
            Ok(records) => {
                log::debug!(
                    "Thread poll #{} for {}: {} messages",
                    seq,
                    self.other_user_id,
                    records.len()
                );
                let messages = records
                    .iter()
                    .map(|r| Message::from_record(r, &self.me))
                    .collect();
                self.store
                    .dispatch(SyncEvent::ThreadLoaded {
                        epoch: self.epoch,
                        seq,
                        messages,
                    })
                    .await;
            }
            Err(e) => {
                log::warn!("Thread poll for {} failed: {}", self.other_user_id, e);
                self.store
                    .dispatch(SyncEvent::ThreadFailed {
                        epoch: self.epoch,
                        error: e.to_string(),
                    })
                    .await;
            }
        }

        let epoch = self.epoch;
        self.store
            .read(|s| match &s.thread {
                Some(thread) if thread.epoch == epoch => Some(thread.messages.clone()),
                _ => None,
            })
            .await
    }

    /// Start polling; fetches immediately
    pub async fn start(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let label = format!("thread poll {} (epoch {})", self.other_user_id, self.epoch);
        let task = ScheduledTask::every(label, self.period, move || {
            let weak = weak.clone();
            async move {
                if let Some(sync) = weak.upgrade() {
                    sync.refresh().await;
                }
            }
        });
        *self.task.lock().await = Some(task);
    }

    /// Stop polling and abandon any in-flight fetch
    pub async fn stop(&self) {
        if let Some(task) = self.task.lock().await.take() {
            task.cancel();
        }
    }
}
