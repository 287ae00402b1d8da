//! Session token storage and retrieval.
//!
//! Stores the provider session in `<base>/session.json` with restricted
//! permissions (0600). Tokens are never logged or displayed in full.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::paths;
use crate::session::UserIdentity;

/// Session cache filename.
const SESSION_CACHE_FILE: &str = "session.json";

fn now_millis_u64() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| u64::try_from(d.as_millis()).ok())
        .unwrap_or(u64::MAX)
}

/// A signed-in session as persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSession {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// The provider session token (short-lived; no refresh handling).
    pub id_token: String,
    /// Issue timestamp in milliseconds since epoch
    pub issued_at: u64,
}

impl CachedSession {
    pub fn new(user_id: impl Into<String>, email: Option<String>, id_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email,
            id_token: id_token.into(),
            issued_at: now_millis_u64(),
        }
    }

    /// The identity this session belongs to.
    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            user_id: self.user_id.clone(),
            email: self.email.clone(),
        }
    }
}

/// Returns the path to the session cache file.
pub fn cache_path() -> PathBuf {
    paths::signon_home().join(SESSION_CACHE_FILE)
}

/// Loads the cached session from disk.
/// Returns `None` if the file doesn't exist.
///
/// # Errors
/// Returns an error if the operation fails.
pub fn load() -> Result<Option<CachedSession>> {
    let path = cache_path();
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read session cache from {}", path.display()))?;

    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse session cache from {}", path.display()))
        .map(Some)
}

/// Saves the session to disk with restricted permissions (0600).
///
/// # Errors
/// Returns an error if the operation fails.
pub fn save(session: &CachedSession) -> Result<()> {
    let path = cache_path();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let contents =
        serde_json::to_string_pretty(session).context("Failed to serialize session cache")?;

    // Write with restricted permissions
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&path)
            .with_context(|| format!("Failed to open {} for writing", path.display()))?;
        file.write_all(contents.as_bytes())
            .with_context(|| format!("Failed to write to {}", path.display()))?;
    }

    #[cfg(not(unix))]
    {
        fs::write(&path, contents)
            .with_context(|| format!("Failed to write to {}", path.display()))?;
    }

    Ok(())
}

/// Removes the cached session. Returns true if one existed.
///
/// # Errors
/// Returns an error if the operation fails.
pub fn clear() -> Result<bool> {
    let path = cache_path();
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_file(&path)
        .with_context(|| format!("Failed to remove session cache at {}", path.display()))?;
    Ok(true)
}
