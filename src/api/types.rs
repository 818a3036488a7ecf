//! Wire types shared by the HTTP client and the in-memory state.
//!
//! These mirror the backend DTOs. Fields the client does not use
//! (`user_id`, `created_at` on conversations, ...) are ignored on decode.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Title shown for a conversation the server returned without one.
pub const UNTITLED_CONVERSATION: &str = "Conversation sans titre";

/// Decode a backend timestamp, mapping anything unreadable to `None`.
///
/// Offset-less values are taken as UTC.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    let Some(serde_json::Value::String(raw)) = raw else {
        return Ok(None);
    };
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    Ok(["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc()))
}

// =============================================================================
// Auth
// =============================================================================

/// Body of `POST /auth/login` and `POST /auth/register`.
#[derive(Debug, Clone, Serialize)]
pub struct AuthRequest {
    pub email: String,
    pub password: String,
}

/// Response from a successful login.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// The bearer token to store.
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// The authenticated user, as returned by `GET /auth/me` and `GET /users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
}

impl UserProfile {
    /// Whether this user may open the administration panel.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some("admin")
    }
}

/// Response from `GET /users`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserList {
    pub items: Vec<UserProfile>,
}

// =============================================================================
// Conversations
// =============================================================================

/// One entry of the conversation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Server-assigned identifier, never changes.
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ConversationSummary {
    /// Title to display, falling back to the untitled placeholder.
    #[must_use]
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(UNTITLED_CONVERSATION)
    }
}

/// Response from `GET /conversations`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationList {
    pub items: Vec<ConversationSummary>,
}

/// Body of `POST /conversations`. A `None` title is sent as JSON `null`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateConversationRequest {
    pub title: Option<String>,
}

/// Body of `PATCH /conversations/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct RenameConversationRequest {
    pub title: String,
}

/// Response from `PATCH /conversations/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RenamedConversation {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Messages
// =============================================================================

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// `None` while the message only exists locally.
    #[serde(default)]
    pub id: Option<String>,
    pub role: MessageRole,
    pub content: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Message {
    /// A local, not yet persisted user message.
    #[must_use]
    pub fn local_user(content: impl Into<String>) -> Self {
        Self::local(MessageRole::User, content)
    }

    /// A local assistant message (a reply or a synthesized error).
    #[must_use]
    pub fn local_assistant(content: impl Into<String>) -> Self {
        Self::local(MessageRole::Assistant, content)
    }

    fn local(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: None,
            role,
            content: content.into(),
            created_at: Some(Utc::now()),
        }
    }
}

/// Response from `GET /history/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagePage {
    pub items: Vec<Message>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

// =============================================================================
// Chat
// =============================================================================

/// Body of `POST /ai/chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    /// Omitted for a draft; the server then creates the conversation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// Response from `POST /ai/chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub conversation_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_title_fallback() {
        let mut summary = ConversationSummary {
            id: "c1".into(),
            title: None,
            updated_at: None,
        };
        assert_eq!(summary.display_title(), UNTITLED_CONVERSATION);

        summary.title = Some("Recettes".into());
        assert_eq!(summary.display_title(), "Recettes");
    }

    #[test]
    fn test_create_request_sends_null_title() {
        let body = serde_json::to_value(CreateConversationRequest { title: None }).unwrap();
        assert_eq!(body, serde_json::json!({ "title": null }));
    }

    #[test]
    fn test_chat_request_omits_draft_id() {
        let body = serde_json::to_value(ChatRequest {
            message: "hi".into(),
            conversation_id: None,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "message": "hi" }));
    }

    #[test]
    fn test_history_item_decodes_backend_shape() {
        let raw = r#"{
            "items": [{
                "id": "msg_1",
                "user_id": "u1",
                "conversation_id": "c1",
                "role": "assistant",
                "content": "Bonjour",
                "created_at": "2025-01-02T03:04:05.123456+00:00"
            }],
            "limit": 100,
            "offset": 0
        }"#;
        let page: MessagePage = serde_json::from_str(raw).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].role, MessageRole::Assistant);
        assert_eq!(page.items[0].id.as_deref(), Some("msg_1"));
        assert!(page.items[0].created_at.is_some());
    }

    #[test]
    fn test_conversation_list_tolerates_odd_timestamps() {
        let raw = r#"{
            "items": [
                { "id": "c1", "title": "A", "updated_at": "2025-01-02T03:04:05+00:00" },
                { "id": "c2", "title": "B", "updated_at": "2025-01-02T03:04:05.123456" },
                { "id": "c3", "title": "C", "updated_at": "hier" },
                { "id": "c4", "title": "D", "updated_at": null },
                { "id": "c5", "title": "E", "updated_at": 1735787045 },
                { "id": "c6", "title": "F" }
            ]
        }"#;
        let list: ConversationList = serde_json::from_str(raw).unwrap();
        let stamps: Vec<_> = list.items.iter().map(|c| c.updated_at).collect();
        let expected = DateTime::parse_from_rfc3339("2025-01-02T03:04:05+00:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(stamps[0], Some(expected));
        assert_eq!(
            stamps[1].map(|t| t.format("%Y-%m-%dT%H:%M:%S").to_string()).as_deref(),
            Some("2025-01-02T03:04:05")
        );
        assert_eq!(&stamps[2..], [None, None, None, None]);
    }

    #[test]
    fn test_admin_role() {
        let user = UserProfile {
            id: "u1".into(),
            email: "a@b.com".into(),
            role: Some("admin".into()),
        };
        assert!(user.is_admin());
        assert!(!UserProfile { role: None, ..user }.is_admin());
    }
}
