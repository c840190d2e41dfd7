//! Server API client for REST endpoints

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::models::{ConversationRecord, MessageRecord, UserId, UserSummary};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Header identifying the current user to the backend
pub const USER_ID_HEADER: &str = "X-User-Id";

/// The REST operations the synchronization core consumes.
///
/// Every non-2xx response is a failure regardless of status code.
pub trait ChatBackend: Send + Sync {
    /// `GET /messages`
    fn list_conversations(&self) -> BoxFuture<'_, Result<Vec<ConversationRecord>>>;

    /// `GET /messages?other_user_id={id}`, newest last
    fn fetch_thread<'a>(&'a self, other_user_id: &'a UserId)
        -> BoxFuture<'a, Result<Vec<MessageRecord>>>;

    /// `POST /messages`
    fn send_message<'a>(
        &'a self,
        recipient_id: &'a UserId,
        content: &'a str,
    ) -> BoxFuture<'a, Result<MessageRecord>>;

    /// `GET /search?q={query}&type=users`
    fn search_users<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<Vec<UserSummary>>>;

    /// `POST /reports`
    fn report_user<'a>(&'a self, other_user_id: &'a UserId) -> BoxFuture<'a, Result<()>>;
}

#[derive(Default, Deserialize)]
struct ConversationsEnvelope {
    #[serde(default)]
    conversations: Option<Vec<ConversationRecord>>,
}

#[derive(Default, Deserialize)]
struct MessagesEnvelope {
    #[serde(default)]
    messages: Option<Vec<MessageRecord>>,
}

#[derive(Deserialize)]
struct SendEnvelope {
    message: MessageRecord,
}

#[derive(Default, Deserialize)]
struct UsersEnvelope {
    #[serde(default)]
    users: Option<Vec<UserSummary>>,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    recipient_id: &'a UserId,
    content: &'a str,
}

#[derive(Serialize)]
struct ReportRequest<'a> {
    other_user_id: &'a UserId,
    reason: &'a str,
}

/// Server API client
pub struct ServerApi {
    client: Client,
    base_url: String,
}

impl ServerApi {
    /// Create a new server API client for the configured user
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let user_header = HeaderValue::from_str(config.user_id.as_str())
            .map_err(|e| ClientError::Config(format!("Invalid user id header: {}", e)))?;
        headers.insert(USER_ID_HEADER, user_header);

        let client = Client::builder()
            .timeout(config.http_timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.server_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Turn a non-2xx response into a `ClientError::Server`
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

        Err(ClientError::Server {
            status: status.as_u16(),
            message,
        })
    }

    /// Decode a JSON body, treating an empty body as the default value
    async fn decode<T: DeserializeOwned + Default>(response: Response) -> Result<T> {
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(T::default());
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Check if the server is healthy
    pub async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn get_conversations(&self) -> Result<Vec<ConversationRecord>> {
        let response = self
            .client
            .get(format!("{}/messages", self.base_url))
            .send()
            .await?;
        let envelope: ConversationsEnvelope = Self::decode(Self::check(response).await?).await?;
        Ok(envelope.conversations.unwrap_or_default())
    }

    pub async fn get_thread(&self, other_user_id: &UserId) -> Result<Vec<MessageRecord>> {
        let response = self
            .client
            .get(format!("{}/messages", self.base_url))
            .query(&[("other_user_id", other_user_id.as_str())])
            .send()
            .await?;
        let envelope: MessagesEnvelope = Self::decode(Self::check(response).await?).await?;
        Ok(envelope.messages.unwrap_or_default())
    }

    pub async fn post_message(&self, recipient_id: &UserId, content: &str) -> Result<MessageRecord> {
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .json(&SendMessageRequest {
                recipient_id,
                content,
            })
            .send()
            .await?;
        let envelope: SendEnvelope = Self::check(response).await?.json().await?;
        log::debug!("Message {} accepted by server", envelope.message.id);
        Ok(envelope.message)
    }

    pub async fn get_users(&self, query: &str) -> Result<Vec<UserSummary>> {
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query), ("type", "users")])
            .send()
            .await?;
        let envelope: UsersEnvelope = Self::decode(Self::check(response).await?).await?;
        Ok(envelope.users.unwrap_or_default())
    }

    pub async fn post_report(&self, other_user_id: &UserId) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/reports", self.base_url))
            .json(&ReportRequest {
                other_user_id,
                reason: "reported from conversation",
            })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

impl ChatBackend for ServerApi {
    fn list_conversations(&self) -> BoxFuture<'_, Result<Vec<ConversationRecord>>> {
        self.get_conversations().boxed()
    }

    fn fetch_thread<'a>(
        &'a self,
        other_user_id: &'a UserId,
    ) -> BoxFuture<'a, Result<Vec<MessageRecord>>> {
        self.get_thread(other_user_id).boxed()
    }

    fn send_message<'a>(
        &'a self,
        recipient_id: &'a UserId,
        content: &'a str,
    ) -> BoxFuture<'a, Result<MessageRecord>> {
        self.post_message(recipient_id, content).boxed()
    }

    fn search_users<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<Vec<UserSummary>>> {
        self.get_users(query).boxed()
    }

    fn report_user<'a>(&'a self, other_user_id: &'a UserId) -> BoxFuture<'a, Result<()>> {
        self.post_report(other_user_id).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_api_creation() {
        let config = ClientConfig::new("http://localhost:4000/", "1").unwrap();
        let api = ServerApi::new(&config).unwrap();
        assert_eq!(api.base_url(), "http://localhost:4000");
    }

    #[test]
    fn test_missing_arrays_decode_as_empty() {
        let conversations: ConversationsEnvelope = serde_json::from_str("{}").unwrap();
        let messages: MessagesEnvelope = serde_json::from_str(r#"{"messages": null}"#).unwrap();
        let users: UsersEnvelope = serde_json::from_str(r#"{"users": []}"#).unwrap();

        assert!(conversations.conversations.unwrap_or_default().is_empty());
        assert!(messages.messages.unwrap_or_default().is_empty());
        assert!(users.users.unwrap_or_default().is_empty());
    }

    #[test]
    fn test_send_request_shape() {
        let recipient = UserId::from(2);
        let body = serde_json::to_value(SendMessageRequest {
            recipient_id: &recipient,
            content: "hi",
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "recipient_id": "2", "content": "hi" }));
    }

    // Network behaviour is covered by the integration tests against the
    // reference server in tests/api_tests.rs.
}
