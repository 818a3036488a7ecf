//! Chat Session Core
//!
//! Client-side state for a conversational-AI chat backend: who is logged in,
//! which views they may see, and an in-memory copy of their conversations
//! kept consistent with the server under optimistic updates and failures.
//!
//! # Architecture
//!
//! - **Credential**: process-wide bearer token holder with pluggable storage
//! - **Gate**: local access check in front of protected views, plus the
//!   session-expiry cascade triggered by any 401
//! - **API**: reqwest client for the backend behind two narrow traits
//! - **Directory / Session**: the conversation list and the active conversation
//! - **View**: coordinates directory and session the way the chat screen does
//!
//! Rendering is left to the embedder through the [`ports`] traits.
//!
//! # Modules
//!
//! - [`config`]: layered CLI, file and environment configuration
//! - [`credential`]: credential store and backends
//! - [`gate`]: session gate state machine
//! - [`api`]: backend client and wire types
//! - [`directory`]: conversation list
//! - [`session`]: active conversation and message sending
//! - [`account`]: login, registration, account deletion
//! - [`admin`]: administration user table
//! - [`view`]: chat view coordination

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]

pub mod account;
pub mod admin;
pub mod api;
pub mod config;
pub mod credential;
pub mod directory;
pub mod error;
pub mod gate;
pub mod ports;
pub mod session;
pub mod view;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ClientError, ErrorKind, Result};
