//! Access gate in front of protected views.
//!
//! The gate is a small state machine: it starts out [`GateState::Validating`]
//! on every mount and settles on [`GateState::Authenticated`] or
//! [`GateState::Unauthenticated`] from a purely local check of the
//! [`CredentialStore`]. No network call is made at gate time; a stale token is
//! let through and caught by the first 401, which drives the gate back to
//! `Unauthenticated` through [`SessionGate::reject`].

use std::sync::{Arc, PoisonError, RwLock};

use crate::api::UnauthorizedHandler;
use crate::credential::CredentialStore;
use crate::error::Result;
use crate::ports::{Navigator, Route};

/// Gate state for the protected subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Mounted, credential not inspected yet.
    Validating,
    /// Protected views may render.
    Authenticated,
    /// Terminal until the next mount; the user belongs on the login view.
    Unauthenticated,
}

/// Inputs to the gate state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEvent {
    /// Result of reading the credential store at mount.
    Checked {
        /// Whether a well-formed credential was found.
        present: bool,
    },
    /// The backend answered 401 somewhere in the protected subtree.
    Rejected,
    /// The user logged out or deleted their account.
    LoggedOut,
}

/// Pure transition function of the gate.
#[must_use]
pub fn transition(state: GateState, event: GateEvent) -> GateState {
    match (state, event) {
        (GateState::Validating, GateEvent::Checked { present: true }) => GateState::Authenticated,
        (_, GateEvent::Checked { present: false } | GateEvent::Rejected | GateEvent::LoggedOut) => {
            GateState::Unauthenticated
        }
        // A credential check only resolves a pending validation.
        (state, GateEvent::Checked { present: true }) => state,
    }
}

/// Where the shell should go after landing in `state`, if anywhere.
#[must_use]
pub fn redirect_for(state: GateState) -> Option<Route> {
    match state {
        GateState::Unauthenticated => Some(Route::Login),
        GateState::Validating | GateState::Authenticated => None,
    }
}

#[derive(Debug)]
struct GateInner {
    store: CredentialStore,
    navigator: Arc<dyn Navigator>,
    state: RwLock<GateState>,
}

/// Shared gate handle; clones observe the same state.
#[derive(Debug, Clone)]
pub struct SessionGate {
    inner: Arc<GateInner>,
}

impl SessionGate {
    pub fn new(store: CredentialStore, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            inner: Arc::new(GateInner {
                store,
                navigator,
                state: RwLock::new(GateState::Validating),
            }),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> GateState {
        *self
            .inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether protected views may render.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state() == GateState::Authenticated
    }

    /// The credential store this gate reads.
    #[must_use]
    pub fn store(&self) -> &CredentialStore {
        &self.inner.store
    }

    /// Run the mount-time check and redirect to login if it fails.
    pub fn mount(&self) -> GateState {
        self.set_state(GateState::Validating);
        let present = self.inner.store.is_present();
        let state = self.apply(GateEvent::Checked { present });
        tracing::debug!(name: "gate.mounted", ?state, "Session gate evaluated");
        state
    }

    /// Store a freshly issued credential and enter the protected views.
    ///
    /// An invalid credential is refused and leaves the gate as it was.
    pub fn admit(&self, token: &str) -> Result<GateState> {
        self.inner.store.set(token)?;
        let state = self.mount();
        if state == GateState::Authenticated {
            tracing::info!(name: "gate.admitted", "Logged in");
            self.inner.navigator.navigate(Route::Chat);
        }
        Ok(state)
    }

    /// Forward a view change to the navigator.
    pub fn navigate(&self, route: Route) {
        self.inner.navigator.navigate(route);
    }

    /// Session-expiry cascade for a 401 seen on a request issued under `epoch`.
    ///
    /// A rejection of a credential that has since been replaced by a fresh login
    /// is ignored.
    pub fn reject(&self, epoch: u64) {
        if !self.inner.store.clear_if_current(epoch) {
            return;
        }
        tracing::info!(name: "gate.session.expired", "Credential rejected, returning to login");
        self.apply(GateEvent::Rejected);
    }

    /// Cascade for a user-initiated exit (logout, account deletion).
    pub fn logout(&self) {
        self.inner.store.clear();
        tracing::info!(name: "gate.logged_out", "Session ended by user");
        self.apply(GateEvent::LoggedOut);
    }

    /// Step the state machine; redirects only on an actual state change.
    fn apply(&self, event: GateEvent) -> GateState {
        let (previous, next) = {
            let mut guard = self
                .inner
                .state
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let previous = *guard;
            *guard = transition(previous, event);
            (previous, *guard)
        };
        if previous != next {
            if let Some(route) = redirect_for(next) {
                self.inner.navigator.navigate(route);
            }
        }
        next
    }

    fn set_state(&self, state: GateState) {
        *self
            .inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner) = state;
    }
}

impl UnauthorizedHandler for SessionGate {
    fn on_unauthorized(&self, epoch: u64) {
        self.reject(epoch);
    }
}
