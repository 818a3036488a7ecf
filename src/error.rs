//! Error types for the client core.

use thiserror::Error;

/// Broad failure category used to decide how an error is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Blocked locally before any network call.
    Validation,
    /// The request could not complete.
    Connectivity,
    /// The backend rejected the credential (HTTP 401).
    Authentication,
    /// Any other non-2xx response, or a malformed body.
    Http,
    /// The local credential store failed.
    Storage,
}

/// Client error type.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Input rejected locally.
    #[error("{0}")]
    Validation(String),

    /// HTTP request could not complete.
    #[error("cannot reach server: {0}")]
    Connectivity(String),

    /// The credential is missing or was rejected by the backend.
    #[error("session expired: {detail}")]
    Unauthorized {
        /// Detail returned by the backend, if any.
        detail: String,
    },

    /// API returned an error response.
    #[error("API error ({status}): {detail}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        detail: String,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Credential could not be stored or read back.
    #[error("credential storage error: {0}")]
    Credential(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Connectivity(err.to_string())
    }
}

impl ClientError {
    /// Shorthand for a local validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Credential(_) => ErrorKind::Storage,
            Self::Connectivity(_) => ErrorKind::Connectivity,
            Self::Unauthorized { .. } => ErrorKind::Authentication,
            Self::Http { .. } | Self::Decode(_) | Self::InvalidUrl(_) => ErrorKind::Http,
        }
    }

    /// Whether this error must end the authenticated session.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.kind() == ErrorKind::Authentication
    }

    /// Message suitable for showing to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::Credential(_) => "Impossible d'enregistrer la session.".to_string(),
            Self::Connectivity(_) => "Impossible de joindre le serveur.".to_string(),
            Self::Unauthorized { .. } => {
                "Votre session a expiré. Veuillez vous reconnecter.".to_string()
            }
            Self::Http { detail, .. } => detail.clone(),
            Self::Decode(_) | Self::InvalidUrl(_) => "Réponse invalide du serveur.".to_string(),
        }
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            ClientError::validation("empty").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            ClientError::Unauthorized {
                detail: "expired".into()
            }
            .kind(),
            ErrorKind::Authentication
        );
        assert_eq!(
            ClientError::Http {
                status: 404,
                detail: "Conversation not found".into()
            }
            .kind(),
            ErrorKind::Http
        );
        assert_eq!(
            ClientError::Credential("permission denied".into()).kind(),
            ErrorKind::Storage
        );
    }

    #[test]
    fn test_user_message_uses_detail() {
        let err = ClientError::Http {
            status: 403,
            detail: "Forbidden".into(),
        };
        assert_eq!(err.user_message(), "Forbidden");
        assert!(!err.is_unauthorized());
    }
}
