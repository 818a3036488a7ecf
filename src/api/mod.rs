//! Boundary to the conversational backend.
//!
//! The rest of the core talks to the backend only through the
//! [`ConversationApi`] and [`AccountApi`] traits, so directory and session
//! logic can be exercised against an in-memory double. [`ApiClient`] is the
//! HTTP implementation.
//!
//! # Wire contract
//!
//! - JSON request and response bodies
//! - `Authorization: Bearer <token>` on every authenticated call
//! - non-2xx responses carry `{"detail": "..."}`
//! - 401 on an authenticated call means the session is over

mod client;
mod types;

pub use client::{ApiClient, AuthApi, ChatApi, ConversationsApi, HistoryApi, UsersApi};
pub use types::*;

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;

/// Conversation and message operations used by the chat view.
#[async_trait]
pub trait ConversationApi: Send + Sync + fmt::Debug {
    /// `GET /conversations`, most recent first.
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>>;

    /// `POST /conversations`; `None` lets the server pick the title.
    async fn create_conversation(&self, title: Option<String>) -> Result<ConversationSummary>;

    /// `PATCH /conversations/{id}`.
    async fn rename_conversation(&self, id: &str, title: &str) -> Result<RenamedConversation>;

    /// `DELETE /conversations/{id}`.
    async fn delete_conversation(&self, id: &str) -> Result<()>;

    /// `DELETE /history`: every conversation of the current user.
    async fn clear_history(&self) -> Result<()>;

    /// `GET /history/{id}?limit&offset`, oldest first.
    async fn load_messages(&self, conversation_id: &str, limit: u32, offset: u32)
    -> Result<Vec<Message>>;

    /// `POST /ai/chat`.
    async fn send_message(&self, request: ChatRequest) -> Result<ChatResponse>;
}

/// Account and administration operations.
#[async_trait]
pub trait AccountApi: Send + Sync + fmt::Debug {
    /// `POST /auth/login`. Unauthenticated: a 401 here is a bad password.
    async fn login(&self, request: &AuthRequest) -> Result<TokenResponse>;

    /// `POST /auth/register`.
    async fn register(&self, request: &AuthRequest) -> Result<()>;

    /// `GET /auth/me`.
    async fn current_user(&self) -> Result<UserProfile>;

    /// `DELETE /users/me`.
    async fn delete_account(&self) -> Result<()>;

    /// `GET /users` (admin only).
    async fn list_users(&self) -> Result<Vec<UserProfile>>;

    /// `DELETE /users/{id}` (admin only).
    async fn delete_user(&self, id: &str) -> Result<()>;
}

/// Receives the "session expired" signal from the transport.
pub trait UnauthorizedHandler: Send + Sync + fmt::Debug {
    /// Called once per 401 on an authenticated call, with the credential epoch
    /// the failing request was issued under.
    fn on_unauthorized(&self, epoch: u64);
}
