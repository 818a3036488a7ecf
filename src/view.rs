//! The chat view: one directory and one active session kept in step.
//!
//! Directory failures are reported once through [`Dialogs::alert`] and then
//! returned, so callers only need the `Result` for control flow. Send failures
//! are not alerted; they are already part of the transcript.

use std::sync::Arc;

use chrono::Utc;

use crate::api::{ChatResponse, ConversationApi, ConversationSummary};
use crate::directory::{Confirmation, ConversationDirectory};
use crate::error::Result;
use crate::ports::Dialogs;
use crate::session::{ConversationSession, DRAFT_TITLE, LoadOutcome, SendOutcome, SendTicket};

pub const HISTORY_CLEARED: &str = "Historique effacé avec succès";

/// State behind the protected chat view.
#[derive(Debug)]
pub struct ChatView {
    api: Arc<dyn ConversationApi>,
    dialogs: Arc<dyn Dialogs>,
    directory: ConversationDirectory,
    session: ConversationSession,
    page_size: u32,
}

impl ChatView {
    pub fn new(api: Arc<dyn ConversationApi>, dialogs: Arc<dyn Dialogs>, page_size: u32) -> Self {
        Self {
            directory: ConversationDirectory::new(Arc::clone(&api)),
            session: ConversationSession::new(Arc::clone(&api)),
            api,
            dialogs,
            page_size,
        }
    }

    #[must_use]
    pub fn directory(&self) -> &ConversationDirectory {
        &self.directory
    }

    #[must_use]
    pub fn session(&self) -> &ConversationSession {
        &self.session
    }

    fn surface<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            tracing::debug!(name: "view.error", error = %e, "Operation failed");
            self.dialogs.alert(&e.user_message());
        }
        result
    }

    /// Fetch the conversation list.
    pub async fn refresh(&mut self) -> Result<()> {
        let result = self.directory.list().await.map(|_| ());
        self.surface(result)
    }

    /// Show `id` and load its latest messages. Selecting the active
    /// conversation does nothing.
    pub async fn select_conversation(&mut self, id: &str) -> Result<()> {
        if self.session.is_active(id) {
            return Ok(());
        }
        let title = self.directory.get(id).map(|c| c.display_title().to_string());
        self.session.open(id, title.as_deref());

        let result = self.session.load_messages(id, self.page_size, 0).await;
        self.surface(result).map(|outcome| {
            if outcome == LoadOutcome::Stale {
                tracing::debug!(name: "view.select.stale", conversation_id = %id, "Selection superseded");
            }
        })
    }

    /// Leave the active conversation for an empty draft.
    pub fn new_draft(&mut self) {
        self.session.start_draft();
    }

    /// Create a conversation and make it the active one.
    pub async fn create_conversation(&mut self, title: Option<String>) -> Result<ConversationSummary> {
        let result = self.directory.create(title).await;
        let created = self.surface(result)?;
        self.session.open(created.id.clone(), Some(created.display_title()));
        Ok(created)
    }

    pub async fn rename_conversation(&mut self, id: &str, title: &str) -> Result<ConversationSummary> {
        let result = self.directory.rename(id, title).await;
        let renamed = self.surface(result)?;
        if self.session.is_active(id) {
            self.session.set_title(renamed.display_title());
        }
        Ok(renamed)
    }

    /// Delete a conversation; the active session falls back to a draft when it
    /// was showing it.
    pub async fn delete_conversation(&mut self, id: &str) -> Result<Confirmation> {
        let result = self.directory.delete(id, self.dialogs.as_ref()).await;
        let outcome = self.surface(result)?;
        if outcome == Confirmation::Done && self.session.is_active(id) {
            self.session.start_draft();
        }
        Ok(outcome)
    }

    /// Delete every conversation and fall back to a draft.
    pub async fn clear_history(&mut self) -> Result<Confirmation> {
        let result = self.directory.clear_all(self.dialogs.as_ref()).await;
        let outcome = self.surface(result)?;
        if outcome == Confirmation::Done {
            self.session.start_draft();
            self.dialogs.alert(HISTORY_CLEARED);
        }
        Ok(outcome)
    }

    /// First half of a send; see [`ConversationSession::begin_send`].
    pub fn begin_send(&mut self, text: &str) -> Result<SendTicket> {
        self.session.begin_send(text)
    }

    /// Second half of a send. A promoted draft is added to the directory.
    pub fn complete_send(&mut self, ticket: SendTicket, result: Result<ChatResponse>) -> SendOutcome {
        let outcome = self.session.complete_send(ticket, result);
        if let SendOutcome::Answered {
            promoted: Some(id),
        } = &outcome
        {
            self.directory.note_created(ConversationSummary {
                id: id.clone(),
                title: Some(DRAFT_TITLE.to_string()),
                updated_at: Some(Utc::now()),
            });
        }
        outcome
    }

    /// Send `text` from the active session and wait for the answer.
    pub async fn send(&mut self, text: &str) -> Result<SendOutcome> {
        let ticket = self.begin_send(text)?;
        let result = self.api.send_message(ticket.request().clone()).await;
        Ok(self.complete_send(ticket, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Message, MessageRole};
    use crate::testing::{FakeApi, Failure, summary};
    use crate::ports::ScriptedDialogs;

    fn seeded() -> Arc<FakeApi> {
        Arc::new(
            FakeApi::with_conversations(vec![summary("c1", "Premier", 30), summary("c2", "Second", 20)])
                .with_messages("c1", vec![Message::local_user("bonjour"), Message::local_assistant("salut")])
                .with_messages("c2", Vec::new()),
        )
    }

    async fn view_with(api: &Arc<FakeApi>, dialogs: &ScriptedDialogs) -> ChatView {
        let mut view = ChatView::new(
            Arc::clone(api) as Arc<dyn ConversationApi>,
            Arc::new(dialogs.clone()),
            100,
        );
        view.refresh().await.unwrap();
        view
    }

    #[tokio::test]
    async fn test_select_loads_once() {
        let api = seeded();
        let mut view = view_with(&api, &ScriptedDialogs::accepting()).await;

        view.select_conversation("c1").await.unwrap();
        assert_eq!(view.session().title(), "Premier");
        assert_eq!(view.session().messages().len(), 2);

        view.select_conversation("c1").await.unwrap();
        assert_eq!(api.calls(), ["list", "history:c1"]);
    }

    #[tokio::test]
    async fn test_create_selects_new_conversation() {
        let api = seeded();
        let mut view = view_with(&api, &ScriptedDialogs::accepting()).await;
        view.select_conversation("c1").await.unwrap();

        let created = view.create_conversation(Some("Projet".into())).await.unwrap();
        assert_eq!(view.session().conversation_id(), Some(created.id.as_str()));
        assert_eq!(view.session().title(), "Projet");
        assert!(view.session().messages().is_empty());
        assert_eq!(view.directory().items()[0].id, created.id);
    }

    #[tokio::test]
    async fn test_rename_active_updates_title() {
        let api = seeded();
        let mut view = view_with(&api, &ScriptedDialogs::accepting()).await;
        view.select_conversation("c1").await.unwrap();

        view.rename_conversation("c1", "Renommé").await.unwrap();
        assert_eq!(view.session().title(), "Renommé");

        view.rename_conversation("c2", "Autre").await.unwrap();
        assert_eq!(view.session().title(), "Renommé");
    }

    #[tokio::test]
    async fn test_delete_active_resets_to_draft() {
        let api = seeded();
        let mut view = view_with(&api, &ScriptedDialogs::accepting()).await;
        view.select_conversation("c1").await.unwrap();

        view.delete_conversation("c2").await.unwrap();
        assert_eq!(view.session().conversation_id(), Some("c1"));

        view.delete_conversation("c1").await.unwrap();
        assert!(view.session().is_draft());
        assert!(view.session().messages().is_empty());
        assert_eq!(view.session().title(), DRAFT_TITLE);
        assert!(view.directory().is_empty());
    }

    #[tokio::test]
    async fn test_declined_delete_keeps_everything() {
        let api = seeded();
        let dialogs = ScriptedDialogs::declining();
        let mut view = view_with(&api, &dialogs).await;
        view.select_conversation("c1").await.unwrap();

        let outcome = view.delete_conversation("c1").await.unwrap();
        assert_eq!(outcome, Confirmation::Cancelled);
        assert_eq!(view.session().conversation_id(), Some("c1"));
        assert_eq!(view.directory().len(), 2);
        assert_eq!(dialogs.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_history_alerts() {
        let api = seeded();
        let dialogs = ScriptedDialogs::accepting();
        let mut view = view_with(&api, &dialogs).await;
        view.select_conversation("c2").await.unwrap();

        view.clear_history().await.unwrap();
        assert!(view.directory().is_empty());
        assert!(view.session().is_draft());
        assert_eq!(dialogs.alerts(), [HISTORY_CLEARED]);
    }

    #[tokio::test]
    async fn test_errors_are_alerted_and_state_kept() {
        let api = seeded();
        let dialogs = ScriptedDialogs::accepting();
        let mut view = view_with(&api, &dialogs).await;
        view.select_conversation("c1").await.unwrap();

        api.fail_next(Failure::Http(404, "Conversation not found"));
        assert!(view.delete_conversation("c1").await.is_err());
        assert_eq!(view.session().conversation_id(), Some("c1"));
        assert_eq!(view.directory().len(), 2);
        assert_eq!(dialogs.alerts(), ["Conversation not found"]);
    }

    #[tokio::test]
    async fn test_first_send_lists_promoted_draft() {
        let api = seeded();
        let mut view = view_with(&api, &ScriptedDialogs::accepting()).await;

        let outcome = view.send("hi").await.unwrap();
        let SendOutcome::Answered { promoted: Some(id) } = outcome else {
            panic!("expected promotion, got {outcome:?}");
        };
        assert_eq!(view.directory().items()[0].id, id);
        assert_eq!(view.directory().len(), 3);

        view.send("encore").await.unwrap();
        assert_eq!(view.directory().len(), 3);
        let roles: Vec<MessageRole> = view.session().messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            [MessageRole::User, MessageRole::Assistant, MessageRole::User, MessageRole::Assistant]
        );
    }

    #[tokio::test]
    async fn test_answer_after_switch_is_dropped() {
        let api = seeded();
        let mut view = view_with(&api, &ScriptedDialogs::accepting()).await;
        view.select_conversation("c2").await.unwrap();

        let ticket = view.begin_send("question").unwrap();
        view.select_conversation("c1").await.unwrap();

        let result = api.send_message(ticket.request().clone()).await;
        let outcome = view.complete_send(ticket, result);
        assert!(matches!(outcome, SendOutcome::Stale));
        assert_eq!(view.session().conversation_id(), Some("c1"));
        assert_eq!(view.session().messages().len(), 2);
    }
}
