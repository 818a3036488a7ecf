//! HTTP client for the chat backend.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use super::{AccountApi, ConversationApi, UnauthorizedHandler, types::*};
use crate::config::ApiConfig;
use crate::credential::CredentialStore;
use crate::error::{ClientError, Result};

/// HTTP client for the API.
///
/// Every authenticated call reads the current credential from the
/// [`CredentialStore`] and sends it as a bearer token. A 401 on such a call is
/// reported to the registered [`UnauthorizedHandler`].
///
/// # Example
///
/// ```rust,no_run
/// use chat_session_core::api::ApiClient;
/// use chat_session_core::credential::CredentialStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = CredentialStore::in_memory();
/// let client = ApiClient::from_url("http://127.0.0.1:8000", store.clone())?;
///
/// let token = client.auth().login("a@b.com", "secret").await?;
/// store.set(&token.access_token)?;
///
/// let conversations = client.conversations().list().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    http: reqwest::Client,
    credentials: CredentialStore,
    on_unauthorized: Option<Arc<dyn UnauthorizedHandler>>,
}

impl ApiClient {
    /// Create a client from configuration.
    pub fn new(config: &ApiConfig, credentials: CredentialStore) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Self::with_client(&config.base_url, http, credentials)
    }

    /// Create a client with default HTTP settings.
    pub fn from_url(base_url: impl AsRef<str>, credentials: CredentialStore) -> Result<Self> {
        Self::with_client(base_url, reqwest::Client::new(), credentials)
    }

    /// Create a new client with a custom reqwest client.
    pub fn with_client(
        base_url: impl AsRef<str>,
        http: reqwest::Client,
        credentials: CredentialStore,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref())?;
        if base_url.cannot_be_a_base() {
            return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase.into());
        }
        Ok(Self {
            base_url,
            http,
            credentials,
            on_unauthorized: None,
        })
    }

    /// Route 401 responses on authenticated calls to `handler`.
    #[must_use]
    pub fn with_unauthorized_handler(mut self, handler: Arc<dyn UnauthorizedHandler>) -> Self {
        self.on_unauthorized = Some(handler);
        self
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The credential store this client reads from.
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Access the Auth API.
    pub fn auth(&self) -> AuthApi<'_> {
        AuthApi { client: self }
    }

    /// Access the Conversations API.
    pub fn conversations(&self) -> ConversationsApi<'_> {
        ConversationsApi { client: self }
    }

    /// Access the History API.
    pub fn history(&self) -> HistoryApi<'_> {
        HistoryApi { client: self }
    }

    /// Access the Chat API.
    pub fn chat(&self) -> ChatApi<'_> {
        ChatApi { client: self }
    }

    /// Access the Users API.
    pub fn users(&self) -> UsersApi<'_> {
        UsersApi { client: self }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in the constructor: the base URL can hold a path.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        self.http.request(method, self.url(segments))
    }

    /// Send a request without credentials.
    async fn call_public(&self, request: RequestBuilder) -> Result<String> {
        let response = request.send().await?;
        Self::read_body(response).await
    }

    /// Send a request with the current bearer token.
    async fn call(&self, request: RequestBuilder) -> Result<String> {
        let Some((credential, epoch)) = self.credentials.snapshot() else {
            tracing::warn!(name: "api.request.no_credential", "Authenticated call without a credential");
            self.report_unauthorized(self.credentials.epoch());
            return Err(ClientError::Unauthorized {
                detail: "Not authenticated".to_string(),
            });
        };

        let response = request.bearer_auth(credential.as_str()).send().await;
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(name: "api.request.unreachable", error = %e, "Request could not complete");
                return Err(e.into());
            }
        };

        let result = Self::read_body(response).await;
        if let Err(ClientError::Unauthorized { detail }) = &result {
            tracing::info!(name: "api.request.unauthorized", detail = %detail, "Credential rejected");
            self.report_unauthorized(epoch);
        }
        result
    }

    fn report_unauthorized(&self, epoch: u64) {
        match &self.on_unauthorized {
            Some(handler) => handler.on_unauthorized(epoch),
            None => {
                self.credentials.clear_if_current(epoch);
            }
        }
    }

    async fn read_body(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let url = response.url().path().to_string();
        let body = response.text().await?;
        if status.is_success() {
            tracing::debug!(name: "api.request.ok", path = %url, status = status.as_u16(), "Request succeeded");
            return Ok(body);
        }

        let detail = error_detail(&body)
            .unwrap_or_else(|| format!("Erreur HTTP {}", status.as_u16()));
        tracing::warn!(
            name: "api.request.failed",
            path = %url,
            status = status.as_u16(),
            detail = %detail,
            "Request failed"
        );
        if status == StatusCode::UNAUTHORIZED {
            Err(ClientError::Unauthorized { detail })
        } else {
            Err(ClientError::Http {
                status: status.as_u16(),
                detail,
            })
        }
    }

    fn decode<T: DeserializeOwned>(body: &str) -> Result<T> {
        Ok(serde_json::from_str(body)?)
    }
}

/// Pull a human-readable message out of an error body.
fn error_detail(body: &str) -> Option<String> {
    if body.trim().is_empty() {
        return None;
    }
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return Some(body.trim().to_string());
    };
    match value.get("detail") {
        Some(serde_json::Value::String(detail)) => Some(detail.clone()),
        Some(serde_json::Value::Null) => None,
        Some(other) => Some(other.to_string()),
        None if value.as_object().is_some_and(serde_json::Map::is_empty) => None,
        None => Some(value.to_string()),
    }
}

// =============================================================================
// Auth API
// =============================================================================

/// Auth API client.
#[derive(Debug)]
pub struct AuthApi<'a> {
    client: &'a ApiClient,
}

impl AuthApi<'_> {
    /// Exchange email and password for an access token.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenResponse> {
        let body = AuthRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let request = self
            .client
            .request(Method::POST, &["auth", "login"])
            .json(&body);
        let body = self.client.call_public(request).await?;
        ApiClient::decode(&body)
    }

    /// Create an account.
    pub async fn register(&self, email: &str, password: &str) -> Result<()> {
        let body = AuthRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let request = self
            .client
            .request(Method::POST, &["auth", "register"])
            .json(&body);
        self.client.call_public(request).await.map(|_| ())
    }

    /// Get the authenticated user.
    pub async fn me(&self) -> Result<UserProfile> {
        let request = self.client.request(Method::GET, &["auth", "me"]);
        let body = self.client.call(request).await?;
        ApiClient::decode(&body)
    }
}

// =============================================================================
// Conversations API
// =============================================================================

/// Conversations API client.
#[derive(Debug)]
pub struct ConversationsApi<'a> {
    client: &'a ApiClient,
}

impl ConversationsApi<'_> {
    /// List conversations, most recent first.
    pub async fn list(&self) -> Result<Vec<ConversationSummary>> {
        let request = self.client.request(Method::GET, &["conversations"]);
        let body = self.client.call(request).await?;
        Ok(ApiClient::decode::<ConversationList>(&body)?.items)
    }

    /// Create a conversation.
    pub async fn create(&self, title: Option<String>) -> Result<ConversationSummary> {
        let request = self
            .client
            .request(Method::POST, &["conversations"])
            .json(&CreateConversationRequest { title });
        let body = self.client.call(request).await?;
        ApiClient::decode(&body)
    }

    /// Rename a conversation.
    pub async fn rename(&self, id: &str, title: &str) -> Result<RenamedConversation> {
        let request = self
            .client
            .request(Method::PATCH, &["conversations", id])
            .json(&RenameConversationRequest {
                title: title.to_string(),
            });
        let body = self.client.call(request).await?;
        ApiClient::decode(&body)
    }

    /// Delete a conversation and its messages.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let request = self.client.request(Method::DELETE, &["conversations", id]);
        self.client.call(request).await.map(|_| ())
    }
}

// =============================================================================
// History API
// =============================================================================

/// History API client.
#[derive(Debug)]
pub struct HistoryApi<'a> {
    client: &'a ApiClient,
}

impl HistoryApi<'_> {
    /// Get a page of messages, oldest first.
    pub async fn messages(&self, conversation_id: &str, limit: u32, offset: u32) -> Result<Vec<Message>> {
        let request = self
            .client
            .request(Method::GET, &["history", conversation_id])
            .query(&[("limit", limit), ("offset", offset)]);
        let body = self.client.call(request).await?;
        Ok(ApiClient::decode::<MessagePage>(&body)?.items)
    }

    /// Delete every conversation of the current user.
    pub async fn clear(&self) -> Result<()> {
        let request = self.client.request(Method::DELETE, &["history"]);
        self.client.call(request).await.map(|_| ())
    }
}

// =============================================================================
// Chat API
// =============================================================================

/// Chat API client.
#[derive(Debug)]
pub struct ChatApi<'a> {
    client: &'a ApiClient,
}

impl ChatApi<'_> {
    /// Send a chat message.
    ///
    /// Without a conversation ID the server creates a conversation and returns
    /// its ID alongside the answer.
    pub async fn send(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let request = self
            .client
            .request(Method::POST, &["ai", "chat"])
            .json(request);
        let body = self.client.call(request).await?;
        ApiClient::decode(&body)
    }
}

// =============================================================================
// Users API
// =============================================================================

/// Users API client.
#[derive(Debug)]
pub struct UsersApi<'a> {
    client: &'a ApiClient,
}

impl UsersApi<'_> {
    /// Delete the authenticated user's own account.
    pub async fn delete_me(&self) -> Result<()> {
        let request = self.client.request(Method::DELETE, &["users", "me"]);
        self.client.call(request).await.map(|_| ())
    }

    /// List all users (admin only).
    pub async fn list(&self) -> Result<Vec<UserProfile>> {
        let request = self.client.request(Method::GET, &["users"]);
        let body = self.client.call(request).await?;
        Ok(ApiClient::decode::<UserList>(&body)?.items)
    }

    /// Delete a user (admin only).
    pub async fn delete(&self, id: &str) -> Result<()> {
        let request = self.client.request(Method::DELETE, &["users", id]);
        self.client.call(request).await.map(|_| ())
    }
}

// =============================================================================
// Trait implementations
// =============================================================================

#[async_trait]
impl ConversationApi for ApiClient {
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        self.conversations().list().await
    }

    async fn create_conversation(&self, title: Option<String>) -> Result<ConversationSummary> {
        self.conversations().create(title).await
    }

    async fn rename_conversation(&self, id: &str, title: &str) -> Result<RenamedConversation> {
        self.conversations().rename(id, title).await
    }

    async fn delete_conversation(&self, id: &str) -> Result<()> {
        self.conversations().delete(id).await
    }

    async fn clear_history(&self) -> Result<()> {
        self.history().clear().await
    }

    async fn load_messages(
        &self,
        conversation_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        self.history().messages(conversation_id, limit, offset).await
    }

    async fn send_message(&self, request: ChatRequest) -> Result<ChatResponse> {
        self.chat().send(&request).await
    }
}

#[async_trait]
impl AccountApi for ApiClient {
    async fn login(&self, request: &AuthRequest) -> Result<TokenResponse> {
        self.auth().login(&request.email, &request.password).await
    }

    async fn register(&self, request: &AuthRequest) -> Result<()> {
        self.auth().register(&request.email, &request.password).await
    }

    async fn current_user(&self) -> Result<UserProfile> {
        self.auth().me().await
    }

    async fn delete_account(&self) -> Result<()> {
        self.users().delete_me().await
    }

    async fn list_users(&self) -> Result<Vec<UserProfile>> {
        self.users().list().await
    }

    async fn delete_user(&self, id: &str) -> Result<()> {
        self.users().delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ApiClient {
        ApiClient::from_url(base, CredentialStore::in_memory()).unwrap()
    }

    #[test]
    fn test_url_joins_segments() {
        let c = client("http://127.0.0.1:8000");
        assert_eq!(
            c.url(&["history", "conv_1"]).as_str(),
            "http://127.0.0.1:8000/history/conv_1"
        );
    }

    #[test]
    fn test_url_keeps_base_path() {
        let c = client("https://example.com/api/");
        assert_eq!(
            c.url(&["conversations"]).as_str(),
            "https://example.com/api/conversations"
        );
    }

    #[test]
    fn test_url_escapes_ids() {
        let c = client("http://localhost");
        assert_eq!(
            c.url(&["conversations", "a/b"]).as_str(),
            "http://localhost/conversations/a%2Fb"
        );
    }

    #[test]
    fn test_rejects_non_base_url() {
        assert!(ApiClient::from_url("mailto:a@b.com", CredentialStore::in_memory()).is_err());
    }

    #[test]
    fn test_error_detail() {
        assert_eq!(
            error_detail(r#"{"detail":"Conversation not found"}"#).as_deref(),
            Some("Conversation not found")
        );
        assert_eq!(error_detail("").as_deref(), None);
        assert_eq!(error_detail("{}").as_deref(), None);
        assert_eq!(
            error_detail(r#"{"error":"quota"}"#).as_deref(),
            Some(r#"{"error":"quota"}"#)
        );
        assert_eq!(error_detail("Bad Gateway").as_deref(), Some("Bad Gateway"));
        assert!(error_detail(r#"{"detail":[{"msg":"field required"}]}"#)
            .unwrap()
            .contains("field required"));
    }

    #[tokio::test]
    async fn test_call_without_credential_short_circuits() {
        let store = CredentialStore::in_memory();
        // Port 9 (discard) is never contacted: the call fails before sending.
        let c = ApiClient::from_url("http://127.0.0.1:9", store).unwrap();
        let err = c.conversations().list().await.unwrap_err();
        assert!(err.is_unauthorized());
    }
}
