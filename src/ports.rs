//! Collaborators supplied by whatever renders the client.
//!
//! The core never draws anything. It asks a [`Navigator`] to change view and a
//! [`Dialogs`] implementation to confirm destructive actions or show alerts.
//! Headless implementations are provided for embedding and tests.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Top-level views of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Public login form.
    Login,
    /// Public registration form.
    Register,
    /// Protected chat view.
    Chat,
}

/// Moves the user between views.
pub trait Navigator: Send + Sync + fmt::Debug {
    fn navigate(&self, route: Route);
}

/// Blocking user prompts.
pub trait Dialogs: Send + Sync + fmt::Debug {
    /// Ask a yes/no question. Only `true` lets a destructive call proceed.
    fn confirm(&self, prompt: &str) -> bool;
    /// Show a non-blocking notice.
    fn alert(&self, message: &str);
}

/// Navigator that remembers every requested route.
#[derive(Debug, Clone, Default)]
pub struct MemoryNavigator {
    history: Arc<RwLock<Vec<Route>>>,
}

impl MemoryNavigator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent route, if any navigation happened.
    #[must_use]
    pub fn current(&self) -> Option<Route> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .copied()
    }

    /// Every route requested so far, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<Route> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Navigator for MemoryNavigator {
    fn navigate(&self, route: Route) {
        self.history
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(route);
    }
}

/// Dialogs with a fixed answer; alerts are recorded instead of shown.
#[derive(Debug, Clone)]
pub struct ScriptedDialogs {
    answer: bool,
    prompts: Arc<RwLock<Vec<String>>>,
    alerts: Arc<RwLock<Vec<String>>>,
}

impl ScriptedDialogs {
    /// Dialogs that confirm everything.
    #[must_use]
    pub fn accepting() -> Self {
        Self::answering(true)
    }

    /// Dialogs that decline everything.
    #[must_use]
    pub fn declining() -> Self {
        Self::answering(false)
    }

    fn answering(answer: bool) -> Self {
        Self {
            answer,
            prompts: Arc::default(),
            alerts: Arc::default(),
        }
    }

    /// Confirmation prompts shown so far.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Alerts shown so far.
    #[must_use]
    pub fn alerts(&self) -> Vec<String> {
        self.alerts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Dialogs for ScriptedDialogs {
    fn confirm(&self, prompt: &str) -> bool {
        self.prompts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.to_string());
        self.answer
    }

    fn alert(&self, message: &str) {
        self.alerts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }
}
