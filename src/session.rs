//! The active conversation and its messages.
//!
//! A [`ConversationSession`] is either a *draft* (no server id yet) or *bound*
//! to a conversation id. A draft is promoted exactly once, by the first send
//! that succeeds, and never goes back to being a draft. Switching conversation
//! replaces the session contents wholesale.
//!
//! Remote work is split into a synchronous `begin_*` step that returns a
//! ticket and a synchronous `complete_*` step that applies the response. Each
//! ticket carries the session generation it was issued under; switching
//! conversation bumps the generation, so a response that resolves after the
//! user moved on is discarded instead of landing in the wrong conversation.
//! [`ConversationSession::send_message`] and
//! [`ConversationSession::load_messages`] chain both steps around the remote
//! call for callers that do not need to interleave work.
//!
//! Messages are append-only. The optimistic user message of a send is never
//! removed or edited, even when the round trip fails.
//!
//! A 401 during a send ends the session through the transport's
//! [`UnauthorizedHandler`](crate::api::UnauthorizedHandler); the session only
//! records the expiry notice in the transcript.

use std::sync::Arc;

use crate::api::{ChatRequest, ChatResponse, ConversationApi, Message};
use crate::error::{ClientError, ErrorKind, Result};

/// Title of a session that has no conversation yet.
pub const DRAFT_TITLE: &str = "Nouvelle conversation";

/// Title used when a bound conversation has none.
pub const DEFAULT_TITLE: &str = "Conversation";

/// Longest message accepted by the backend, in characters.
pub const MAX_MESSAGE_CHARS: usize = 5000;

pub const SESSION_EXPIRED_REPLY: &str = "Votre session a expiré. Veuillez vous reconnecter.";
pub const UNREACHABLE_REPLY: &str = "Impossible de joindre le serveur. Veuillez réessayer.";
pub const SEND_FAILED_REPLY: &str =
    "Erreur lors de la génération de la réponse. Veuillez réessayer.";

/// Assistant-role text recorded in place of an answer.
#[must_use]
pub fn failure_reply(err: &ClientError) -> String {
    match err {
        ClientError::Unauthorized { .. } => SESSION_EXPIRED_REPLY.to_string(),
        ClientError::Connectivity(_) => UNREACHABLE_REPLY.to_string(),
        ClientError::Http { detail, .. } if !detail.is_empty() => {
            format!("Erreur lors de la génération de la réponse ({detail}). Veuillez réessayer.")
        }
        _ => SEND_FAILED_REPLY.to_string(),
    }
}

/// An outstanding `POST /ai/chat`.
///
/// Not `Clone`: a ticket is consumed by the one completion it stands for.
#[derive(Debug)]
pub struct SendTicket {
    generation: u64,
    sequence: u64,
    request: ChatRequest,
}

impl SendTicket {
    /// Body to send.
    #[must_use]
    pub fn request(&self) -> &ChatRequest {
        &self.request
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Position of this send within the session.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// An outstanding page load.
#[derive(Debug)]
pub struct LoadTicket {
    generation: u64,
    conversation_id: String,
    limit: u32,
    offset: u32,
    /// Messages present when the load was issued; later appends are kept.
    base_len: usize,
}

impl LoadTicket {
    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    #[must_use]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// What a completed send did to the session.
#[derive(Debug)]
pub enum SendOutcome {
    /// The answer was appended. `promoted` holds the id a draft was bound to.
    Answered { promoted: Option<String> },
    /// A failure notice was appended in place of the answer.
    Failed(ClientError),
    /// The session moved on, or the send was no longer the pending one;
    /// nothing changed.
    Stale,
}

impl SendOutcome {
    /// Kind of failure, if the send failed.
    #[must_use]
    pub fn failure_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Failed(err) => Some(err.kind()),
            Self::Answered { .. } | Self::Stale => None,
        }
    }
}

/// What a completed load did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The page replaced the transcript.
    Loaded { count: usize },
    /// The session moved on before the response arrived; nothing changed.
    Stale,
}

/// The conversation currently shown in the chat view.
#[derive(Debug)]
pub struct ConversationSession {
    api: Arc<dyn ConversationApi>,
    generation: u64,
    conversation_id: Option<String>,
    title: String,
    messages: Vec<Message>,
    sends: u64,
    /// Sequence of the send awaiting its answer.
    pending: Option<u64>,
}

impl ConversationSession {
    /// A fresh draft session.
    pub fn new(api: Arc<dyn ConversationApi>) -> Self {
        Self {
            api,
            generation: 0,
            conversation_id: None,
            title: DRAFT_TITLE.to_string(),
            messages: Vec::new(),
            sends: 0,
            pending: None,
        }
    }

    /// Server id, or `None` for a draft.
    #[must_use]
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    #[must_use]
    pub fn is_draft(&self) -> bool {
        self.conversation_id.is_none()
    }

    /// Whether `id` is the conversation shown.
    #[must_use]
    pub fn is_active(&self, id: &str) -> bool {
        self.conversation_id.as_deref() == Some(id)
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// Transcript in append order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Whether a send is waiting for its answer; the send control stays disabled.
    #[must_use]
    pub fn is_sending(&self) -> bool {
        self.pending.is_some()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Reset to an empty draft.
    pub fn start_draft(&mut self) {
        self.replace(None, DRAFT_TITLE.to_string());
        tracing::debug!(name: "session.draft", generation = self.generation, "Started draft session");
    }

    /// Show another conversation. Its messages still have to be loaded.
    pub fn open(&mut self, conversation_id: impl Into<String>, title: Option<&str>) {
        let conversation_id = conversation_id.into();
        let title = title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_TITLE)
            .to_string();
        tracing::debug!(
            name: "session.opened",
            conversation_id = %conversation_id,
            generation = self.generation + 1,
            "Switched conversation"
        );
        self.replace(Some(conversation_id), title);
    }

    fn replace(&mut self, conversation_id: Option<String>, title: String) {
        self.generation += 1;
        self.conversation_id = conversation_id;
        self.title = title;
        self.messages.clear();
        self.pending = None;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Loading
    // ─────────────────────────────────────────────────────────────────────────

    /// Prepare a page load for the bound conversation.
    pub fn begin_load(&self, limit: u32, offset: u32) -> Result<LoadTicket> {
        let conversation_id = self
            .conversation_id
            .clone()
            .ok_or_else(|| ClientError::validation("Aucune conversation à charger."))?;
        Ok(LoadTicket {
            generation: self.generation,
            conversation_id,
            limit,
            offset,
            base_len: self.messages.len(),
        })
    }

    /// Apply a loaded page.
    ///
    /// The page replaces the transcript; messages appended locally while the
    /// load was outstanding stay after it. A failure leaves the transcript as
    /// it was and is returned.
    pub fn complete_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<Vec<Message>>,
    ) -> Result<LoadOutcome> {
        if ticket.generation != self.generation {
            tracing::debug!(
                name: "session.load.stale",
                conversation_id = %ticket.conversation_id,
                "Discarding page for a conversation no longer shown"
            );
            return Ok(LoadOutcome::Stale);
        }

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(
                    name: "session.load.failed",
                    conversation_id = %ticket.conversation_id,
                    error = %e,
                    "Failed to load messages"
                );
                return Err(e);
            }
        };

        let appended = self
            .messages
            .split_off(ticket.base_len.min(self.messages.len()));
        let count = page.len();
        self.messages = page;
        self.messages.extend(appended);
        tracing::debug!(
            name: "session.loaded",
            conversation_id = %ticket.conversation_id,
            count,
            "Messages loaded"
        );
        Ok(LoadOutcome::Loaded { count })
    }

    /// Load a page of `conversation_id`, switching to it first if needed.
    pub async fn load_messages(
        &mut self,
        conversation_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<LoadOutcome> {
        if !self.is_active(conversation_id) {
            self.open(conversation_id, None);
        }
        let ticket = self.begin_load(limit, offset)?;
        let result = self
            .api
            .load_messages(ticket.conversation_id(), limit, offset)
            .await;
        self.complete_load(ticket, result)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sending
    // ─────────────────────────────────────────────────────────────────────────

    /// Append the optimistic user message and lock further sends.
    ///
    /// Empty input, over-long input and a send already in flight are rejected
    /// without touching the transcript.
    pub fn begin_send(&mut self, text: &str) -> Result<SendTicket> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::validation("Le message ne peut pas être vide."));
        }
        if self.pending.is_some() {
            return Err(ClientError::validation(
                "Une réponse est déjà en cours de génération.",
            ));
        }
        if text.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ClientError::validation(format!(
                "Le message ne peut pas dépasser {MAX_MESSAGE_CHARS} caractères."
            )));
        }

        self.messages.push(Message::local_user(text));
        self.sends += 1;
        self.pending = Some(self.sends);
        Ok(SendTicket {
            generation: self.generation,
            sequence: self.sends,
            request: ChatRequest {
                message: text.to_string(),
                conversation_id: self.conversation_id.clone(),
            },
        })
    }

    /// Apply the outcome of a send and unlock the send control.
    pub fn complete_send(
        &mut self,
        ticket: SendTicket,
        result: Result<ChatResponse>,
    ) -> SendOutcome {
        if ticket.generation != self.generation {
            tracing::debug!(
                name: "session.send.stale",
                issued_generation = ticket.generation,
                generation = self.generation,
                "Discarding answer for a conversation no longer shown"
            );
            return SendOutcome::Stale;
        }
        if self.pending != Some(ticket.sequence) {
            tracing::warn!(
                name: "session.send.unexpected",
                sequence = ticket.sequence,
                pending = ?self.pending,
                "Discarding answer for a send that is not pending"
            );
            return SendOutcome::Stale;
        }
        self.pending = None;

        match result {
            Ok(response) => {
                self.messages.push(Message::local_assistant(response.answer));
                let promoted = match self.conversation_id.as_deref() {
                    None => Some(response.conversation_id),
                    Some(current) => {
                        if current != response.conversation_id {
                            tracing::warn!(
                                name: "session.send.mismatch",
                                conversation_id = %current,
                                returned = %response.conversation_id,
                                "Server answered for another conversation; keeping current binding"
                            );
                        }
                        None
                    }
                };
                if let Some(id) = &promoted {
                    tracing::info!(
                        name: "session.promoted",
                        conversation_id = %id,
                        "Draft bound to new conversation"
                    );
                    self.conversation_id = Some(id.clone());
                }
                SendOutcome::Answered { promoted }
            }
            Err(e) => {
                tracing::warn!(name: "session.send.failed", error = %e, "Send failed");
                self.messages.push(Message::local_assistant(failure_reply(&e)));
                SendOutcome::Failed(e)
            }
        }
    }

    /// Send `text` and wait for the answer.
    ///
    /// Only local validation failures are returned as errors; remote failures
    /// end up in the transcript and in [`SendOutcome::Failed`].
    pub async fn send_message(&mut self, text: &str) -> Result<SendOutcome> {
        let ticket = self.begin_send(text)?;
        let result = self.api.send_message(ticket.request().clone()).await;
        Ok(self.complete_send(ticket, result))
    }
}
