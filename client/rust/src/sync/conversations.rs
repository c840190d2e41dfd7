/// Conversation list synchronization.
/// Polls `GET /messages` and merges each snapshot into the list by conversation key.

use crate::api::ChatBackend;
use crate::models::{Conversation, ConversationKey, ConversationRecord, UserSummary};
use crate::store::{ChatStore, SyncEvent};
use crate::task::ScheduledTask;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Merge a server snapshot into the current list.
///
/// Server-owned fields come from the snapshot; `blocked` and `reported` carry
/// over from the existing entry. Local-only conversations the server does not
/// know yet stay at the top, and flagged conversations the server dropped stay
/// at the bottom so the flags are not lost. Everything else absent from the
/// snapshot is removed, including placeholders.
pub fn merge_snapshot(
    current: &[Conversation],
    records: &[ConversationRecord],
    open: Option<&ConversationKey>,
) -> Vec<Conversation> {
    let existing: HashMap<&ConversationKey, &Conversation> =
        current.iter().map(|c| (&c.key, c)).collect();
    let mut seen: HashSet<ConversationKey> = HashSet::new();
    let mut fresh = Vec::with_capacity(records.len());

    for record in records {
        let Some(mut incoming) = Conversation::from_record(record) else {
            log::debug!("Skipping conversation record without a usable key");
            continue;
        };
        // First occurrence wins
        if !seen.insert(incoming.key.clone()) {
            continue;
        }
        if let Some(prior) = existing.get(&incoming.key) {
            incoming.blocked = prior.blocked;
            incoming.reported = prior.reported;
        }
        if open == Some(&incoming.key) {
            incoming.unread_count = 0;
        }
        fresh.push(incoming);
    }

    let pending = current
        .iter()
        .filter(|c| c.local_only && !seen.contains(&c.key))
        .cloned();
    let flagged = current
        .iter()
        .filter(|c| {
            !c.local_only && !c.placeholder && (c.blocked || c.reported) && !seen.contains(&c.key)
        })
        .cloned();

    pending.chain(fresh).chain(flagged).collect()
}

/// Fallback list after a failed first load: local-only entries plus placeholders
pub fn with_placeholders(current: &[Conversation]) -> Vec<Conversation> {
    current
        .iter()
        .filter(|c| c.local_only)
        .cloned()
        .chain(Conversation::placeholders())
        .collect()
}

/// Add a local-only conversation with `user` unless one already exists
pub fn pre_register(current: &[Conversation], user: &UserSummary) -> Vec<Conversation> {
    let key = ConversationKey::Direct(user.id.clone());
    if current.iter().any(|c| c.key == key) {
        return current.to_vec();
    }
    std::iter::once(Conversation::started_with(user))
        .chain(current.iter().cloned())
        .collect()
}

/// Opening a conversation clears its unread badge
pub fn mark_opened(current: &[Conversation], key: &ConversationKey) -> Vec<Conversation> {
    current
        .iter()
        .cloned()
        .map(|mut c| {
            if &c.key == key {
                c.unread_count = 0;
            }
            c
        })
        .collect()
}

/// Drop a local-only conversation the user navigated away from.
/// Blocked or reported entries stay so their flags are not lost.
pub fn forget_local(current: &[Conversation], key: &ConversationKey) -> Vec<Conversation> {
    current
        .iter()
        .filter(|c| !(c.local_only && !c.blocked && !c.reported && &c.key == key))
        .cloned()
        .collect()
}

/// Periodically refreshes the conversation list from the backend
pub struct ConversationSynchronizer {
    backend: Arc<dyn ChatBackend>,
    store: ChatStore,
    period: Duration,
    next_seq: AtomicU64,
    task: Mutex<Option<ScheduledTask>>,
}

impl ConversationSynchronizer {
    pub fn new(backend: Arc<dyn ChatBackend>, store: ChatStore, period: Duration) -> Arc<Self> {
        Arc::new(ConversationSynchronizer {
            backend,
            store,
            period,
            next_seq: AtomicU64::new(0),
            task: Mutex::new(None),
        })
    }

    /// Fetch once and merge; returns the list as it stands afterwards.
    ///
    /// Failures never propagate: the next tick is the retry.
    pub async fn refresh(&self) -> Vec<Conversation> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        match self.backend.list_conversations().await {
            Ok(records) => {
                log::debug!("Conversation poll #{}: {} records", seq, records.len());
                self.store
                    .dispatch(SyncEvent::ConversationsLoaded { seq, records })
                    .await;
            }
            Err(e) => {
                log::warn!("Conversation poll #{} failed: {}", seq, e);
                self.store
                    .dispatch(SyncEvent::ConversationsFailed {
                        seq,
                        error: e.to_string(),
                    })
                    .await;
            }
        }
        self.store.read(|s| s.conversations.clone()).await
    }

    /// Start polling; fetches immediately. Restarting replaces the running poll.
    pub async fn start(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let task = ScheduledTask::every("conversation poll", self.period, move || {
            let weak = weak.clone();
            async move {
                if let Some(sync) = weak.upgrade() {
                    sync.refresh().await;
                }
            }
        });
        *self.task.lock().await = Some(task);
    }

    pub async fn stop(&self) {
        if let Some(task) = self.task.lock().await.take() {
            task.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserId;

    fn record(json: serde_json::Value) -> ConversationRecord {
        serde_json::from_value(json).unwrap()
    }

    fn direct(id: i64) -> ConversationKey {
        ConversationKey::Direct(UserId::from(id))
    }

    fn snapshot() -> Vec<ConversationRecord> {
        vec![
            record(serde_json::json!({"other_user_id": 2, "other_user_name": "Ana", "last_message": "hi", "unread_count": 1})),
            record(serde_json::json!({"other_user_id": 3, "other_user_name": "Ben", "last_message": "yo"})),
        ]
    }

    #[test]
    fn test_merge_is_idempotent() {
        let once = merge_snapshot(&[], &snapshot(), None);
        let twice = merge_snapshot(&once, &snapshot(), None);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_duplicate_keys_first_wins() {
        let records = vec![
            record(serde_json::json!({"other_user_id": 2, "last_message": "first"})),
            record(serde_json::json!({"other_user_id": "2", "last_message": "second"})),
        ];
        let merged = merge_snapshot(&[], &records, None);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].last_message, "first");
    }

    #[test]
    fn test_client_flags_survive_refresh() {
        let mut current = merge_snapshot(&[], &snapshot(), None);
        current[0].reported = true;
        current[1].blocked = true;

        let merged = merge_snapshot(&current, &snapshot(), None);
        assert!(merged[0].reported);
        assert!(merged[1].blocked);
    }

    #[test]
    fn test_server_fields_overwritten() {
        let current = merge_snapshot(&[], &snapshot(), None);
        let updated = vec![record(
            serde_json::json!({"other_user_id": 2, "other_user_name": "Ana", "last_message": "new", "unread_count": 5}),
        )];
        let merged = merge_snapshot(&current, &updated, None);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].last_message, "new");
        assert_eq!(merged[0].unread_count, 5);
    }

    #[test]
    fn test_open_conversation_has_no_unread() {
        let merged = merge_snapshot(&[], &snapshot(), Some(&direct(2)));
        assert_eq!(merged[0].unread_count, 0);
    }

    #[test]
    fn test_local_only_kept_until_server_knows_it() {
        let user = UserSummary {
            id: UserId::from(9),
            name: "Ken".to_string(),
            email: String::new(),
            role: String::new(),
            is_active: true,
        };
        let current = pre_register(&merge_snapshot(&[], &snapshot(), None), &user);
        assert_eq!(current[0].key, direct(9));

        let merged = merge_snapshot(&current, &snapshot(), None);
        assert_eq!(merged.len(), 3);
        assert!(merged[0].local_only);

        let mut with_ken = snapshot();
        with_ken.push(record(serde_json::json!({"other_user_id": 9, "other_user_name": "Ken", "last_message": "hello"})));
        let merged = merge_snapshot(&merged, &with_ken, None);
        assert_eq!(merged.len(), 3);
        let ken = merged.iter().find(|c| c.key == direct(9)).unwrap();
        assert!(!ken.local_only);
        assert_eq!(ken.last_message, "hello");
    }

    #[test]
    fn test_pre_register_existing_is_noop() {
        let current = merge_snapshot(&[], &snapshot(), None);
        let user = UserSummary {
            id: UserId::from(2),
            name: "Ana".to_string(),
            email: String::new(),
            role: String::new(),
            is_active: true,
        };
        assert_eq!(pre_register(&current, &user), current);
    }

    #[test]
    fn test_absent_entries_dropped_unless_flagged() {
        let mut current = merge_snapshot(&[], &snapshot(), None);
        current[1].blocked = true;

        let merged = merge_snapshot(&current, &[], None);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].key, direct(3));
        assert!(merged[0].blocked);
    }

    #[test]
    fn test_placeholders_replaced_by_first_snapshot() {
        let fallback = with_placeholders(&[]);
        assert!(fallback.iter().all(|c| c.placeholder));

        let merged = merge_snapshot(&fallback, &snapshot(), None);
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().all(|c| !c.placeholder));
    }

    #[test]
    fn test_forget_local_only_touches_local_entries() {
        let current = merge_snapshot(&[], &snapshot(), None);
        assert_eq!(forget_local(&current, &direct(2)), current);
    }

    #[test]
    fn test_forget_local_keeps_flagged_entries() {
        let user = UserSummary {
            id: UserId::from(9),
            name: "Ken".to_string(),
            email: String::new(),
            role: String::new(),
            is_active: true,
        };
        let mut current = pre_register(&[], &user);
        assert!(forget_local(&current, &direct(9)).is_empty());

        current[0].blocked = true;
        assert_eq!(forget_local(&current, &direct(9)), current);

        current[0].blocked = false;
        current[0].reported = true;
        assert_eq!(forget_local(&current, &direct(9)), current);
    }
}
