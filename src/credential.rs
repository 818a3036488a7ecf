//! Process-wide holder of the access credential.
//!
//! The [`CredentialStore`] is the only component allowed to mutate the
//! credential. Everything else reads it through [`CredentialStore::get`] or
//! [`CredentialStore::snapshot`].
//!
//! Every successful [`CredentialStore::set`] advances an epoch. Requests record
//! the epoch they were issued under, so a late 401 can only clear the credential
//! it was actually sent with and never one stored by a newer login.
//!
//! # Example
//!
//! ```rust
//! use chat_session_core::credential::CredentialStore;
//!
//! let store = CredentialStore::in_memory();
//! assert!(store.get().is_none());
//!
//! store.set("T").unwrap();
//! assert_eq!(store.get().unwrap().as_str(), "T");
//!
//! store.clear();
//! store.clear();
//! assert!(store.get().is_none());
//! ```

use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{ClientError, Result};

/// Stringified placeholders some storage surfaces hand back instead of "absent".
const SENTINELS: [&str; 2] = ["null", "undefined"];

/// An opaque, well-formed access credential.
///
/// Well-formed only means non-empty and not a sentinel; validity is decided by
/// the backend on first use.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Normalize raw stored text into a credential, or `None` if it is absent.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || SENTINELS.contains(&trimmed) {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    /// The raw token text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Raw key-value surface the credential is persisted to.
pub trait CredentialBackend: Send + Sync + fmt::Debug {
    /// Read the stored text, if any. No normalization is expected here.
    fn load(&self) -> Result<Option<String>>;
    /// Replace the stored text.
    fn save(&self, raw: &str) -> Result<()>;
    /// Remove the stored text. Removing nothing is not an error.
    fn remove(&self) -> Result<()>;
}

/// Volatile backend, lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    slot: RwLock<Option<String>>,
}

impl MemoryBackend {
    /// Create a backend pre-loaded with raw text (useful for sentinel tests).
    #[must_use]
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            slot: RwLock::new(Some(raw.into())),
        }
    }
}

impl CredentialBackend for MemoryBackend {
    fn load(&self) -> Result<Option<String>> {
        Ok(self
            .slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, raw: &str) -> Result<()> {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(raw.to_string());
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Backend persisting the credential as a single text file.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn storage_error(err: &io::Error) -> ClientError {
    ClientError::Credential(err.to_string())
}

impl CredentialBackend for FileBackend {
    fn load(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error(&e)),
        }
    }

    fn save(&self, raw: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| storage_error(&e))?;
            }
        }
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path).map_err(|e| storage_error(&e))?;
        // `mode` only applies on creation; tighten a file left by an older run.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .map_err(|e| storage_error(&e))?;
        }
        file.write_all(raw.as_bytes()).map_err(|e| storage_error(&e))
    }

    fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error(&e)),
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    value: Option<Credential>,
    epoch: u64,
}

#[derive(Debug)]
struct StoreInner {
    backend: Box<dyn CredentialBackend>,
    slot: RwLock<Slot>,
}

/// Shared handle to the current credential.
///
/// Cloning the handle shares the same underlying slot.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    inner: Arc<StoreInner>,
}

impl CredentialStore {
    /// Open a store on top of a backend, reading back whatever it holds.
    ///
    /// Unreadable or sentinel contents start the store out empty.
    pub fn new(backend: impl CredentialBackend + 'static) -> Self {
        let value = match backend.load() {
            Ok(raw) => raw.as_deref().and_then(Credential::parse),
            Err(e) => {
                tracing::warn!(name: "credential.load.failed", error = %e, "Stored credential unreadable");
                None
            }
        };
        Self {
            inner: Arc::new(StoreInner {
                backend: Box::new(backend),
                slot: RwLock::new(Slot { value, epoch: 0 }),
            }),
        }
    }

    /// Store that lives only in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::default())
    }

    /// Current credential, or `None` when absent.
    #[must_use]
    pub fn get(&self) -> Option<Credential> {
        self.read_slot().value.clone()
    }

    /// Whether a well-formed credential is held.
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.read_slot().value.is_some()
    }

    /// Current credential together with the epoch it was stored under.
    #[must_use]
    pub fn snapshot(&self) -> Option<(Credential, u64)> {
        let slot = self.read_slot();
        slot.value.clone().map(|c| (c, slot.epoch))
    }

    /// Epoch of the most recent [`set`](Self::set).
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.read_slot().epoch
    }

    /// Store a freshly issued credential.
    ///
    /// Empty and sentinel values are refused and leave the store untouched.
    pub fn set(&self, raw: &str) -> Result<()> {
        let credential = Credential::parse(raw)
            .ok_or_else(|| ClientError::validation("refusing to store an empty credential"))?;

        let mut slot = self.write_slot();
        self.inner.backend.save(credential.as_str())?;
        slot.value = Some(credential);
        slot.epoch += 1;
        tracing::debug!(name: "credential.set", epoch = slot.epoch, "Credential stored");
        Ok(())
    }

    /// Drop the credential. Clearing an empty store is a no-op.
    pub fn clear(&self) {
        let mut slot = self.write_slot();
        self.clear_locked(&mut slot);
    }

    /// Drop the credential only if no newer one was stored since `epoch`.
    ///
    /// Returns `false` when a newer credential was kept.
    pub fn clear_if_current(&self, epoch: u64) -> bool {
        let mut slot = self.write_slot();
        if slot.epoch != epoch {
            tracing::debug!(
                name: "credential.clear.skipped",
                stale_epoch = epoch,
                epoch = slot.epoch,
                "Ignoring rejection of a superseded credential"
            );
            return false;
        }
        self.clear_locked(&mut slot);
        true
    }

    fn clear_locked(&self, slot: &mut Slot) {
        if let Err(e) = self.inner.backend.remove() {
            tracing::warn!(name: "credential.remove.failed", error = %e, "Failed to remove stored credential");
        }
        if slot.value.take().is_some() {
            tracing::debug!(name: "credential.cleared", epoch = slot.epoch, "Credential cleared");
        }
    }

    fn read_slot(&self) -> std::sync::RwLockReadGuard<'_, Slot> {
        self.inner.slot.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_slot(&self) -> std::sync::RwLockWriteGuard<'_, Slot> {
        self.inner.slot.write().unwrap_or_else(PoisonError::into_inner)
    }
}
