//! In-memory backend doubles for unit tests.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::api::{
    AccountApi, AuthRequest, ChatRequest, ChatResponse, ConversationApi, ConversationSummary,
    Message, MessageRole, RenamedConversation, TokenResponse, UserProfile,
};
use crate::error::{ClientError, Result};

/// Failure to inject into the next call.
#[derive(Debug, Clone)]
pub enum Failure {
    Offline,
    Unauthorized,
    Http(u16, &'static str),
}

impl Failure {
    fn into_error(self) -> ClientError {
        match self {
            Self::Offline => ClientError::Connectivity("connection refused".into()),
            Self::Unauthorized => ClientError::Unauthorized {
                detail: "Invalid token".into(),
            },
            Self::Http(status, detail) => ClientError::Http {
                status,
                detail: detail.into(),
            },
        }
    }
}

#[derive(Debug, Default)]
struct State {
    conversations: Vec<ConversationSummary>,
    messages: HashMap<String, Vec<Message>>,
    calls: Vec<String>,
    fail_next: Option<Failure>,
    next_id: u32,
}

#[derive(Debug, Default)]
pub struct FakeApi {
    state: Mutex<State>,
}

pub fn summary(id: &str, title: &str, minute: u32) -> ConversationSummary {
    ConversationSummary {
        id: id.to_string(),
        title: Some(title.to_string()),
        updated_at: Utc.with_ymd_and_hms(2025, 1, 1, 12, minute, 0).single(),
    }
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conversations(conversations: Vec<ConversationSummary>) -> Self {
        let api = Self::new();
        api.lock().conversations = conversations;
        api
    }

    pub fn with_messages(self, conversation_id: &str, messages: Vec<Message>) -> Self {
        self.lock()
            .messages
            .insert(conversation_id.to_string(), messages);
        self
    }

    pub fn fail_next(&self, failure: Failure) {
        self.lock().fail_next = Some(failure);
    }

    /// Names of the calls received so far.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, call: &str) -> Result<std::sync::MutexGuard<'_, State>> {
        let mut state = self.lock();
        state.calls.push(call.to_string());
        match state.fail_next.take() {
            Some(failure) => Err(failure.into_error()),
            None => Ok(state),
        }
    }
}

fn stored(role: MessageRole, content: &str, n: usize) -> Message {
    Message {
        id: Some(format!("msg_{n}")),
        role,
        content: content.to_string(),
        created_at: Some(Utc::now()),
    }
}

#[async_trait]
impl ConversationApi for FakeApi {
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        let state = self.begin("list")?;
        Ok(state.conversations.clone())
    }

    async fn create_conversation(&self, title: Option<String>) -> Result<ConversationSummary> {
        let mut state = self.begin("create")?;
        state.next_id += 1;
        let created = ConversationSummary {
            id: format!("conv_new{}", state.next_id),
            title: Some(title.unwrap_or_else(|| "Nouvelle conversation".to_string())),
            updated_at: Some(Utc::now()),
        };
        state.conversations.insert(0, created.clone());
        Ok(created)
    }

    async fn rename_conversation(&self, id: &str, title: &str) -> Result<RenamedConversation> {
        let mut state = self.begin(&format!("rename:{id}"))?;
        let now = Utc::now();
        let conv = state
            .conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| ClientError::Http {
                status: 404,
                detail: "Conversation not found".into(),
            })?;
        conv.title = Some(title.to_string());
        conv.updated_at = Some(now);
        Ok(RenamedConversation {
            title: Some(title.to_string()),
            updated_at: Some(now),
        })
    }

    async fn delete_conversation(&self, id: &str) -> Result<()> {
        let mut state = self.begin(&format!("delete:{id}"))?;
        state.conversations.retain(|c| c.id != id);
        state.messages.remove(id);
        Ok(())
    }

    async fn clear_history(&self) -> Result<()> {
        let mut state = self.begin("clear")?;
        state.conversations.clear();
        state.messages.clear();
        Ok(())
    }

    async fn load_messages(
        &self,
        conversation_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        let state = self.begin(&format!("history:{conversation_id}"))?;
        let all = state.messages.get(conversation_id).ok_or_else(|| ClientError::Http {
            status: 404,
            detail: "Conversation not found".into(),
        })?;
        Ok(all
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn send_message(&self, request: ChatRequest) -> Result<ChatResponse> {
        let mut state = self.begin(&format!(
            "chat:{}",
            request.conversation_id.as_deref().unwrap_or("-")
        ))?;
        let conversation_id = match request.conversation_id {
            Some(id) => id,
            None => {
                state.next_id += 1;
                let id = format!("conv_new{}", state.next_id);
                state.conversations.insert(0, summary(&id, "Nouvelle conversation", 0));
                id
            }
        };
        let answer = format!("echo: {}", request.message);
        let history = state.messages.entry(conversation_id.clone()).or_default();
        let n = history.len();
        history.push(stored(MessageRole::User, &request.message, n));
        history.push(stored(MessageRole::Assistant, &answer, n + 1));
        Ok(ChatResponse {
            answer,
            conversation_id,
        })
    }
}

pub fn user(id: &str, email: &str, role: &str) -> UserProfile {
    UserProfile {
        id: id.to_string(),
        email: email.to_string(),
        role: Some(role.to_string()),
    }
}

#[derive(Debug, Default)]
struct AccountState {
    me: Option<UserProfile>,
    users: Vec<UserProfile>,
    password: String,
    calls: Vec<String>,
    fail_next: Option<Failure>,
}

/// Account backend double: one known user, an optional user table.
#[derive(Debug, Default)]
pub struct FakeAccounts {
    state: Mutex<AccountState>,
}

impl FakeAccounts {
    /// Backend where `me` logs in with `password`.
    pub fn new(me: UserProfile, password: &str) -> Self {
        let accounts = Self::default();
        {
            let mut state = accounts.lock();
            state.users.push(me.clone());
            state.me = Some(me);
            state.password = password.to_string();
        }
        accounts
    }

    pub fn with_users(self, users: Vec<UserProfile>) -> Self {
        self.lock().users.extend(users);
        self
    }

    pub fn fail_next(&self, failure: Failure) {
        self.lock().fail_next = Some(failure);
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn user_ids(&self) -> Vec<String> {
        self.lock().users.iter().map(|u| u.id.clone()).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AccountState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, call: &str) -> Result<std::sync::MutexGuard<'_, AccountState>> {
        let mut state = self.lock();
        state.calls.push(call.to_string());
        match state.fail_next.take() {
            Some(failure) => Err(failure.into_error()),
            None => Ok(state),
        }
    }
}

#[async_trait]
impl AccountApi for FakeAccounts {
    async fn login(&self, request: &AuthRequest) -> Result<TokenResponse> {
        let state = self.begin("login")?;
        let known = state
            .me
            .as_ref()
            .is_some_and(|me| me.email == request.email && state.password == request.password);
        if !known {
            return Err(ClientError::Unauthorized {
                detail: "Invalid credentials".into(),
            });
        }
        Ok(TokenResponse {
            access_token: "T".into(),
            token_type: Some("bearer".into()),
        })
    }

    async fn register(&self, request: &AuthRequest) -> Result<()> {
        let mut state = self.begin("register")?;
        if state.users.iter().any(|u| u.email == request.email) {
            return Err(ClientError::Http {
                status: 400,
                detail: "Email already registered".into(),
            });
        }
        let id = format!("user_{}", state.users.len() + 1);
        state.users.push(user(&id, &request.email, "user"));
        Ok(())
    }

    async fn current_user(&self) -> Result<UserProfile> {
        let state = self.begin("me")?;
        state.me.clone().ok_or_else(|| ClientError::Unauthorized {
            detail: "Not authenticated".into(),
        })
    }

    async fn delete_account(&self) -> Result<()> {
        let mut state = self.begin("delete_me")?;
        if let Some(me) = state.me.take() {
            state.users.retain(|u| u.id != me.id);
        }
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<UserProfile>> {
        let state = self.begin("users")?;
        Ok(state.users.clone())
    }

    async fn delete_user(&self, id: &str) -> Result<()> {
        let mut state = self.begin(&format!("delete_user:{id}"))?;
        let before = state.users.len();
        state.users.retain(|u| u.id != id);
        if state.users.len() == before {
            return Err(ClientError::Http {
                status: 404,
                detail: "User not found".into(),
            });
        }
        Ok(())
    }
}
