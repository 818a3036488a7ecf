//! Administration panel: the user table.

use std::sync::Arc;

use crate::api::{AccountApi, UserProfile};
use crate::directory::Confirmation;
use crate::error::{ClientError, Result};
use crate::ports::Dialogs;

pub const DELETE_USER_PROMPT: &str = "Voulez-vous vraiment supprimer cet utilisateur ?";

/// User list as shown to an administrator.
#[derive(Debug)]
pub struct AdminPanel {
    api: Arc<dyn AccountApi>,
    current_user_id: String,
    users: Vec<UserProfile>,
}

impl AdminPanel {
    /// Panel for the administrator `current_user_id`, who can never delete
    /// themselves from here.
    pub fn new(api: Arc<dyn AccountApi>, current_user_id: impl Into<String>) -> Self {
        Self {
            api,
            current_user_id: current_user_id.into(),
            users: Vec::new(),
        }
    }

    #[must_use]
    pub fn users(&self) -> &[UserProfile] {
        &self.users
    }

    /// Fetch the user table.
    pub async fn load(&mut self) -> Result<&[UserProfile]> {
        let users = self.api.list_users().await?;
        tracing::debug!(name: "admin.users.loaded", count = users.len(), "User list loaded");
        self.users = users;
        Ok(&self.users)
    }

    /// Users whose email, id or role contains `needle`, ignoring case.
    #[must_use]
    pub fn filtered(&self, needle: &str) -> Vec<&UserProfile> {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return self.users.iter().collect();
        }
        self.users
            .iter()
            .filter(|u| {
                let haystack = format!(
                    "{} {} {}",
                    u.email,
                    u.id,
                    u.role.as_deref().unwrap_or_default()
                )
                .to_lowercase();
                haystack.contains(&needle)
            })
            .collect()
    }

    /// Delete another user after confirmation.
    pub async fn delete_user(&mut self, id: &str, dialogs: &dyn Dialogs) -> Result<Confirmation> {
        if id == self.current_user_id {
            return Err(ClientError::validation(
                "Vous ne pouvez pas supprimer votre propre compte depuis l'administration.",
            ));
        }
        if !dialogs.confirm(DELETE_USER_PROMPT) {
            return Ok(Confirmation::Cancelled);
        }
        self.api.delete_user(id).await?;
        self.users.retain(|u| u.id != id);
        tracing::info!(name: "admin.user.deleted", user_id = %id, "User deleted");
        Ok(Confirmation::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ScriptedDialogs;
    use crate::testing::{FakeAccounts, Failure, user};

    fn panel() -> (Arc<FakeAccounts>, AdminPanel) {
        let api = Arc::new(
            FakeAccounts::new(user("u1", "admin@site.fr", "admin"), "secret").with_users(vec![
                user("u2", "alice@site.fr", "user"),
                user("u3", "Bob@Example.com", "user"),
            ]),
        );
        let panel = AdminPanel::new(Arc::clone(&api) as Arc<dyn AccountApi>, "u1");
        (api, panel)
    }

    #[tokio::test]
    async fn test_filter_is_case_insensitive() {
        let (_api, mut panel) = panel();
        panel.load().await.unwrap();

        let emails: Vec<&str> = panel.filtered("bob").iter().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, ["Bob@Example.com"]);
        assert_eq!(panel.filtered("ADMIN").len(), 1);
        assert_eq!(panel.filtered("u2").len(), 1);
        assert_eq!(panel.filtered("  ").len(), 3);
    }

    #[tokio::test]
    async fn test_cannot_delete_self() {
        let (api, mut panel) = panel();
        panel.load().await.unwrap();

        let dialogs = ScriptedDialogs::accepting();
        assert!(panel.delete_user("u1", &dialogs).await.is_err());
        assert!(dialogs.prompts().is_empty());
        assert_eq!(api.calls(), ["users"]);
    }

    #[tokio::test]
    async fn test_delete_user() {
        let (api, mut panel) = panel();
        panel.load().await.unwrap();

        let outcome = panel
            .delete_user("u2", &ScriptedDialogs::declining())
            .await
            .unwrap();
        assert_eq!(outcome, Confirmation::Cancelled);
        assert_eq!(panel.users().len(), 3);

        api.fail_next(Failure::Http(403, "Forbidden"));
        assert!(panel
            .delete_user("u2", &ScriptedDialogs::accepting())
            .await
            .is_err());
        assert_eq!(panel.users().len(), 3);

        panel
            .delete_user("u2", &ScriptedDialogs::accepting())
            .await
            .unwrap();
        assert!(panel.users().iter().all(|u| u.id != "u2"));
        assert_eq!(api.user_ids(), ["u1", "u3"]);
    }
}
