//! Client configuration: backend location, identity, and timer periods

use crate::error::{ClientError, Result};
use crate::models::UserId;
use std::time::Duration;
use url::Url;

/// Period of the conversation-list poll
pub const DEFAULT_LIST_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Period of the active-thread poll
pub const DEFAULT_THREAD_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Quiet time after the last keystroke before a search is dispatched
pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

/// Per-request HTTP timeout
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// How far a server timestamp may drift from a provisional message's
/// client timestamp and still be reconciled with it by content
pub const DEFAULT_RECONCILE_WINDOW_SECS: i64 = 120;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub user_id: UserId,
    pub list_poll_interval: Duration,
    pub thread_poll_interval: Duration,
    pub search_debounce: Duration,
    pub http_timeout: Duration,
    pub reconcile_window: chrono::Duration,
}

impl ClientConfig {
    /// Validate the server URL and user id and fill in the default periods
    pub fn new(server_url: &str, user_id: impl Into<UserId>) -> Result<Self> {
        let url = Url::parse(server_url)
            .map_err(|e| ClientError::Config(format!("Invalid server URL '{}': {}", server_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::Config(format!(
                "Unsupported URL scheme: {}",
                url.scheme()
            )));
        }

        let user_id = user_id.into();
        if !user_id.is_valid() {
            return Err(ClientError::Config("A user id is required".to_string()));
        }

        Ok(ClientConfig {
            server_url: server_url.to_string(),
            user_id,
            list_poll_interval: DEFAULT_LIST_POLL_INTERVAL,
            thread_poll_interval: DEFAULT_THREAD_POLL_INTERVAL,
            search_debounce: DEFAULT_SEARCH_DEBOUNCE,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            reconcile_window: chrono::Duration::seconds(DEFAULT_RECONCILE_WINDOW_SECS),
        })
    }

    pub fn with_list_poll_interval(mut self, period: Duration) -> Self {
        self.list_poll_interval = period;
        self
    }

    pub fn with_thread_poll_interval(mut self, period: Duration) -> Self {
        self.thread_poll_interval = period;
        self
    }

    pub fn with_search_debounce(mut self, delay: Duration) -> Self {
        self.search_debounce = delay;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}
