//! Explicit authentication session
//!
//! The bearer token lives in a value that is created from storage at startup
//! and torn down by `logout`, instead of in process-wide state.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredSession {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Clone, Default)]
pub struct AuthSession {
    token: Option<String>,
    storage: Option<PathBuf>,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("authenticated", &self.token.is_some())
            .field("storage", &self.storage)
            .finish()
    }
}

impl AuthSession {
    /// Session that is never written to disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Restore the session stored at `path`.
    ///
    /// A missing file yields an unauthenticated session bound to `path`.
    pub fn load_from_storage(path: &Path) -> Result<Self> {
        let mut session = Self {
            token: None,
            storage: Some(path.to_path_buf()),
        };
        if !path.exists() {
            log::debug!("No stored session at {}", path.display());
            return Ok(session);
        }
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session file: {}", path.display()))?;
        let stored: StoredSession = serde_json::from_str(&json)
            .with_context(|| format!("Malformed session file: {}", path.display()))?;
        session.token = stored.token.filter(|t| !t.trim().is_empty());
        Ok(session)
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn storage_path(&self) -> Option<&Path> {
        self.storage.as_deref()
    }

    /// Replace the token and persist it when the session is backed by a file
    pub fn set_token(&mut self, token: impl Into<String>) -> Result<()> {
        let token = token.into();
        anyhow::ensure!(!token.trim().is_empty(), "Token must not be empty");
        self.token = Some(token);
        if let Some(path) = &self.storage {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let json = serde_json::to_string_pretty(&StoredSession {
                token: self.token.clone(),
            })?;
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write session file: {}", path.display()))?;
        }
        Ok(())
    }

    /// Drop the token and delete the stored session
    pub fn logout(&mut self) -> Result<()> {
        self.token = None;
        if let Some(path) = &self.storage
            && path.exists()
        {
            std::fs::remove_file(path)
                .with_context(|| format!("Failed to remove session file: {}", path.display()))?;
            log::info!("Removed stored session {}", path.display());
        }
        Ok(())
    }
}
