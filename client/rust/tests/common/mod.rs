//! Common test utilities and helpers for integration tests
//! Provides a scripted in-process backend and record builders for the campus chat client

#![allow(dead_code)]

use campus_chat_client::error::{ClientError, Result};
use campus_chat_client::models::{ConversationRecord, MessageRecord, UserId, UserSummary};
use campus_chat_client::{ChatBackend, ClientConfig, MessagingClient};
use campus_chat_server::db::{create_test_pool, Database, DbPool};
use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ME: i64 = 1;

/// A backend call, recorded in the order it was issued
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListConversations,
    FetchThread(UserId),
    Send(UserId, String),
    Search(String),
    Report(UserId),
}

/// Scripted backend: canned data, per-call delays, and failure switches
pub struct FakeBackend {
    me: UserId,
    conversations: Mutex<Vec<ConversationRecord>>,
    threads: Mutex<HashMap<UserId, Vec<MessageRecord>>>,
    users: Mutex<Vec<UserSummary>>,
    calls: Mutex<Vec<Call>>,
    thread_delays: Mutex<HashMap<UserId, Duration>>,
    search_delays: Mutex<HashMap<String, Duration>>,
    send_delay: Mutex<Duration>,
    next_id: AtomicI64,
    pub fail_list: AtomicBool,
    pub fail_send: AtomicBool,
    pub fail_search: AtomicBool,
    pub fail_report: AtomicBool,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeBackend {
            me: UserId::from(ME),
            conversations: Mutex::new(Vec::new()),
            threads: Mutex::new(HashMap::new()),
            users: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            thread_delays: Mutex::new(HashMap::new()),
            search_delays: Mutex::new(HashMap::new()),
            send_delay: Mutex::new(Duration::ZERO),
            next_id: AtomicI64::new(42),
            fail_list: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
            fail_search: AtomicBool::new(false),
            fail_report: AtomicBool::new(false),
        })
    }

    pub fn with_conversation(self: Arc<Self>, other: i64, name: &str, last: &str) -> Arc<Self> {
        self.conversations
            .lock()
            .unwrap()
            .push(conversation_record(other, name, last));
        self
    }

    pub fn with_message(self: Arc<Self>, other: i64, record: MessageRecord) -> Arc<Self> {
        self.threads
            .lock()
            .unwrap()
            .entry(UserId::from(other))
            .or_default()
            .push(record);
        self
    }

    pub fn with_user(self: Arc<Self>, id: i64, name: &str) -> Arc<Self> {
        self.users.lock().unwrap().push(user(id, name));
        self
    }

    pub fn set_unread(&self, other: i64, unread: i64) {
        let other = UserId::from(other);
        for record in self.conversations.lock().unwrap().iter_mut() {
            if record.other_user_id.as_ref() == Some(&other) {
                record.unread_count = unread;
            }
        }
    }

    pub fn delay_thread(&self, other: i64, delay: Duration) {
        self.thread_delays
            .lock()
            .unwrap()
            .insert(UserId::from(other), delay);
    }

    pub fn delay_search(&self, query: &str, delay: Duration) {
        self.search_delays
            .lock()
            .unwrap()
            .insert(query.to_string(), delay);
    }

    pub fn delay_send(&self, delay: Duration) {
        *self.send_delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn failure(&self, flag: &AtomicBool) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(ClientError::Server {
                status: 503,
                message: "Service unavailable".to_string(),
            });
        }
        Ok(())
    }
}

impl FakeBackend {
    async fn list(&self) -> Result<Vec<ConversationRecord>> {
        self.record(Call::ListConversations);
        self.failure(&self.fail_list)?;
        Ok(self.conversations.lock().unwrap().clone())
    }

    async fn thread(&self, other_user_id: &UserId) -> Result<Vec<MessageRecord>> {
        self.record(Call::FetchThread(other_user_id.clone()));
        let delay = self
            .thread_delays
            .lock()
            .unwrap()
            .get(other_user_id)
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .threads
            .lock()
            .unwrap()
            .get(other_user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn send(&self, recipient_id: &UserId, content: &str) -> Result<MessageRecord> {
        self.record(Call::Send(recipient_id.clone(), content.to_string()));
        let delay = *self.send_delay.lock().unwrap();
        if let Err(e) = self.failure(&self.fail_send) {
            tokio::time::sleep(delay).await;
            return Err(e);
        }

        // Stored before the delayed acknowledgement, so polls can see it first
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let stored = message_record(id, self.me.as_str(), content);
        self.threads
            .lock()
            .unwrap()
            .entry(recipient_id.clone())
            .or_default()
            .push(stored.clone());

        {
            let mut conversations = self.conversations.lock().unwrap();
            match conversations
                .iter_mut()
                .find(|c| c.other_user_id.as_ref() == Some(recipient_id))
            {
                Some(existing) => existing.last_message = Some(content.to_string()),
                None => conversations.push(ConversationRecord {
                    other_user_id: Some(recipient_id.clone()),
                    display_name: format!("User {}", recipient_id),
                    last_message: Some(content.to_string()),
                    ..ConversationRecord::default()
                }),
            }
        }

        tokio::time::sleep(delay).await;
        Ok(stored)
    }

    async fn search(&self, query: &str) -> Result<Vec<UserSummary>> {
        self.record(Call::Search(query.to_string()));
        let delay = self.search_delays.lock().unwrap().get(query).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.failure(&self.fail_search)?;
        let needle = query.to_lowercase();
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn report(&self, other_user_id: &UserId) -> Result<()> {
        self.record(Call::Report(other_user_id.clone()));
        self.failure(&self.fail_report)
    }
}

impl ChatBackend for FakeBackend {
    fn list_conversations(&self) -> BoxFuture<'_, Result<Vec<ConversationRecord>>> {
        self.list().boxed()
    }

    fn fetch_thread<'a>(
        &'a self,
        other_user_id: &'a UserId,
    ) -> BoxFuture<'a, Result<Vec<MessageRecord>>> {
        self.thread(other_user_id).boxed()
    }

    fn send_message<'a>(
        &'a self,
        recipient_id: &'a UserId,
        content: &'a str,
    ) -> BoxFuture<'a, Result<MessageRecord>> {
        self.send(recipient_id, content).boxed()
    }

    fn search_users<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<Vec<UserSummary>>> {
        self.search(query).boxed()
    }

    fn report_user<'a>(&'a self, other_user_id: &'a UserId) -> BoxFuture<'a, Result<()>> {
        self.report(other_user_id).boxed()
    }
}

pub fn conversation_record(other: i64, name: &str, last: &str) -> ConversationRecord {
    serde_json::from_value(serde_json::json!({
        "other_user_id": other,
        "other_user_name": name,
        "last_message": last,
        "last_message_time": Utc::now().to_rfc3339(),
        "unread_count": 0,
        "online": true,
    }))
    .expect("Invalid conversation record")
}

pub fn message_record(id: i64, sender: &str, content: &str) -> MessageRecord {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "sender_id": sender,
        "content": content,
        "created_at": Utc::now().to_rfc3339(),
    }))
    .expect("Invalid message record")
}

pub fn user(id: i64, name: &str) -> UserSummary {
    UserSummary {
        id: UserId::from(id),
        name: name.to_string(),
        email: format!("{}@campus.edu", name.to_lowercase()),
        role: "student".to_string(),
        is_active: true,
    }
}

/// Client for user `ME` over the fake backend, with the default timer periods
pub fn client_over(backend: Arc<FakeBackend>) -> MessagingClient {
    let config = ClientConfig::new("http://localhost:4000", UserId::from(ME))
        .expect("Invalid test config");
    MessagingClient::with_backend(config, backend)
}

/// Spawn the reference server over an in-memory database seeded with
/// Alice (1), Bob (2) and Carol (3); returns the pool and the base URL
pub async fn spawn_server() -> (DbPool, String) {
    let pool = create_test_pool();
    for (id, name) in [(1, "Alice"), (2, "Bob"), (3, "Carol")] {
        let email = format!("{}@campus.edu", name.to_lowercase());
        Database::register_user(&pool, Some(id), name, &email, "student")
            .await
            .expect("Failed to seed user");
    }

    let (server, addr) = campus_chat_server::server::create_test_http_server_with_pool(pool.clone())
        .expect("Failed to create test server");
    tokio::spawn(server);

    // Give server a moment to bind
    tokio::time::sleep(Duration::from_millis(100)).await;

    (pool, format!("http://{}", addr))
}
