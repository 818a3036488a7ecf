//! Login, registration and account lifecycle.

use std::sync::Arc;

use crate::api::{AccountApi, AuthRequest, UserProfile};
use crate::directory::Confirmation;
use crate::error::{ClientError, Result};
use crate::gate::{GateState, SessionGate};
use crate::ports::{Dialogs, Route};

pub const MIN_PASSWORD_CHARS: usize = 6;
pub const MAX_PASSWORD_CHARS: usize = 200;

pub const INVALID_CREDENTIALS: &str = "Identifiants incorrects.";
pub const DELETE_ACCOUNT_PROMPT: &str =
    "Voulez-vous vraiment supprimer votre compte ? Cette action est irréversible.";

/// Light local check; the backend does the real validation.
pub fn validate_email(raw: &str) -> Result<String> {
    let email = raw.trim();
    if email.is_empty() || !email.contains('@') || !email.contains('.') {
        return Err(ClientError::validation("Adresse email invalide."));
    }
    Ok(email.to_string())
}

pub fn validate_password(raw: &str) -> Result<()> {
    let len = raw.chars().count();
    if !(MIN_PASSWORD_CHARS..=MAX_PASSWORD_CHARS).contains(&len) {
        return Err(ClientError::validation(format!(
            "Le mot de passe doit contenir entre {MIN_PASSWORD_CHARS} et {MAX_PASSWORD_CHARS} caractères."
        )));
    }
    Ok(())
}

/// Account flows of the current user.
#[derive(Debug, Clone)]
pub struct Account {
    api: Arc<dyn AccountApi>,
    gate: SessionGate,
}

impl Account {
    pub fn new(api: Arc<dyn AccountApi>, gate: SessionGate) -> Self {
        Self { api, gate }
    }

    #[must_use]
    pub fn gate(&self) -> &SessionGate {
        &self.gate
    }

    /// Exchange email and password for a credential and enter the chat view.
    ///
    /// A rejected password is a validation failure, not an expired session.
    pub async fn login(&self, email: &str, password: &str) -> Result<GateState> {
        let email = validate_email(email)?;
        if password.is_empty() {
            return Err(ClientError::validation("Le mot de passe est requis."));
        }

        let request = AuthRequest {
            email,
            password: password.to_string(),
        };
        let token = self.api.login(&request).await.map_err(|e| match e {
            ClientError::Unauthorized { .. } => ClientError::validation(INVALID_CREDENTIALS),
            other => other,
        })?;
        self.gate.admit(&token.access_token)
    }

    /// Create an account, then send the user to the login view.
    pub async fn register(&self, email: &str, password: &str) -> Result<()> {
        let email = validate_email(email)?;
        validate_password(password)?;

        let request = AuthRequest {
            email,
            password: password.to_string(),
        };
        self.api.register(&request).await?;
        tracing::info!(name: "account.registered", "Account created");
        self.gate.navigate(Route::Login);
        Ok(())
    }

    pub fn logout(&self) {
        self.gate.logout();
    }

    pub async fn current_user(&self) -> Result<UserProfile> {
        self.api.current_user().await
    }

    /// Delete the current account after confirmation, then log out.
    pub async fn delete_account(&self, dialogs: &dyn Dialogs) -> Result<Confirmation> {
        if !dialogs.confirm(DELETE_ACCOUNT_PROMPT) {
            return Ok(Confirmation::Cancelled);
        }
        self.api.delete_account().await?;
        tracing::info!(name: "account.deleted", "Account deleted");
        self.gate.logout();
        Ok(Confirmation::Done)
    }
}
