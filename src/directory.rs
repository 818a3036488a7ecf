//! Ordered list of the user's conversations.
//!
//! [`ConversationDirectory`] owns the summary list and keeps it in step with
//! the backend. Every operation mutates local state only after the remote call
//! succeeded, so a failure leaves the list exactly as it was.
//!
//! List order is whatever the server returned on the last [`list`]. A rename
//! patches the entry in place and does not move it; the list can therefore
//! drift from strict recency until the next refresh.
//!
//! [`list`]: ConversationDirectory::list

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::api::{ConversationApi, ConversationSummary};
use crate::error::{ClientError, Result};
use crate::ports::Dialogs;

/// Longest accepted conversation title, in characters.
pub const MAX_TITLE_CHARS: usize = 80;

pub const DELETE_CONVERSATION_PROMPT: &str = "Voulez-vous vraiment supprimer cette conversation ?";
pub const CLEAR_HISTORY_PROMPT: &str = "Voulez-vous vraiment effacer TOUT l'historique ?";

/// Result of an operation behind a confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// The user confirmed and the remote call succeeded.
    Done,
    /// The user declined; nothing was sent.
    Cancelled,
}

/// Check a new title locally. Returns the trimmed title to send.
pub fn validate_title(raw: &str) -> Result<String> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(ClientError::validation("Le titre ne peut pas être vide."));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(ClientError::validation(format!(
            "Le titre ne peut pas dépasser {MAX_TITLE_CHARS} caractères."
        )));
    }
    Ok(title.to_string())
}

/// Human-friendly recency of a conversation, as shown in the history panel.
#[must_use]
pub fn format_relative(updated_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(updated_at) = updated_at else {
        return String::new();
    };
    let elapsed = (now - updated_at).max(chrono::Duration::zero());
    let minutes = elapsed.num_minutes();
    let hours = elapsed.num_hours();
    let days = elapsed.num_days();

    if minutes < 60 {
        format!("il y a {minutes} min")
    } else if hours < 24 {
        format!("il y a {hours} h")
    } else if days == 1 {
        "hier".to_string()
    } else if days < 7 {
        format!("il y a {days} jours")
    } else {
        updated_at.format("%d/%m/%Y").to_string()
    }
}

/// The conversation list of the current user.
#[derive(Debug)]
pub struct ConversationDirectory {
    api: Arc<dyn ConversationApi>,
    items: Vec<ConversationSummary>,
}

impl ConversationDirectory {
    pub fn new(api: Arc<dyn ConversationApi>) -> Self {
        Self {
            api,
            items: Vec::new(),
        }
    }

    /// Summaries in display order.
    #[must_use]
    pub fn items(&self) -> &[ConversationSummary] {
        &self.items
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ConversationSummary> {
        self.items.iter().find(|c| c.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Replace the local list with the server's canonical order.
    pub async fn list(&mut self) -> Result<&[ConversationSummary]> {
        let items = self.api.list_conversations().await?;
        tracing::debug!(name: "directory.listed", count = items.len(), "Conversation list refreshed");
        self.items = items;
        Ok(&self.items)
    }

    /// Create a conversation and put it at the top of the list.
    ///
    /// With `None` the server picks the default title.
    pub async fn create(&mut self, title: Option<String>) -> Result<ConversationSummary> {
        let title = title.as_deref().map(validate_title).transpose()?;
        let created = self.api.create_conversation(title).await?;
        tracing::info!(name: "directory.created", conversation_id = %created.id, "Conversation created");
        self.items.insert(0, created.clone());
        Ok(created)
    }

    /// Rename a conversation in place.
    ///
    /// Empty or over-long titles are rejected without any network call.
    pub async fn rename(&mut self, id: &str, new_title: &str) -> Result<ConversationSummary> {
        let title = validate_title(new_title)?;
        let renamed = self.api.rename_conversation(id, &title).await?;

        let title = renamed.title.unwrap_or(title);
        tracing::info!(name: "directory.renamed", conversation_id = %id, "Conversation renamed");
        match self.items.iter_mut().find(|c| c.id == id) {
            Some(entry) => {
                entry.title = Some(title);
                if renamed.updated_at.is_some() {
                    entry.updated_at = renamed.updated_at;
                }
                Ok(entry.clone())
            }
            None => Ok(ConversationSummary {
                id: id.to_string(),
                title: Some(title),
                updated_at: renamed.updated_at,
            }),
        }
    }

    /// Delete a conversation after the user confirmed it.
    ///
    /// Resetting the active session when `id` is active is up to the caller and
    /// must happen before it yields again.
    pub async fn delete(&mut self, id: &str, dialogs: &dyn Dialogs) -> Result<Confirmation> {
        if !dialogs.confirm(DELETE_CONVERSATION_PROMPT) {
            return Ok(Confirmation::Cancelled);
        }
        self.api.delete_conversation(id).await?;
        self.items.retain(|c| c.id != id);
        tracing::info!(name: "directory.deleted", conversation_id = %id, "Conversation deleted");
        Ok(Confirmation::Done)
    }

    /// Delete every conversation after the user confirmed it.
    pub async fn clear_all(&mut self, dialogs: &dyn Dialogs) -> Result<Confirmation> {
        if !dialogs.confirm(CLEAR_HISTORY_PROMPT) {
            return Ok(Confirmation::Cancelled);
        }
        self.api.clear_history().await?;
        let removed = self.items.len();
        self.items.clear();
        tracing::info!(name: "directory.cleared", removed, "History cleared");
        Ok(Confirmation::Done)
    }

    /// Put a summary at the top unless it is already listed.
    ///
    /// Used when a draft session was promoted by its first send.
    pub fn note_created(&mut self, summary: ConversationSummary) {
        if self.get(&summary.id).is_none() {
            self.items.insert(0, summary);
        }
    }
}
