//! Configuration management for signon.
//!
//! Loads configuration from ${SIGNON_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Identity-provider connection settings.
///
/// Both fields are optional here; resolution (env overrides, defaults)
/// happens in [`crate::providers`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API key sent with every identity request.
    pub api_key: Option<String>,
    /// Identity endpoint override.
    pub base_url: Option<String>,
}

/// Verification-challenge widget settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeConfig {
    /// Seconds before an unresolved token expires (0 disables expiry).
    pub token_ttl_secs: u32,
    /// Local port for the verification callback (0 picks a free port).
    pub callback_port: u16,
    /// Element id the hosted page mounts the widget on.
    pub mount: String,
    /// Hosted page that renders the verification widget.
    pub page_url: Option<String>,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            token_ttl_secs: Config::DEFAULT_TOKEN_TTL_SECS,
            callback_port: 0,
            mount: Config::DEFAULT_MOUNT.to_string(),
            page_url: None,
        }
    }
}

impl ChallengeConfig {
    /// Returns the token TTL as a Duration, or None when expiry is disabled.
    pub fn token_ttl(&self) -> Option<Duration> {
        if self.token_ttl_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(u64::from(self.token_ttl_secs)))
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identity-provider connection settings.
    pub provider: ProviderConfig,

    /// Verification-challenge widget settings.
    pub challenge: ChallengeConfig,
}

/// Returns the default config template with comments.
///
/// This is embedded from default_config.toml at compile time.
/// To update, edit default_config.toml directly.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

/// Merges user config values into the default template.
///
/// This ensures new comments/sections from the template are always present,
/// while preserving user's customized values.
fn merge_with_template(user_config: &str) -> Result<String> {
    use toml_edit::DocumentMut;

    // Parse the template as the base
    let mut doc: DocumentMut = default_config_template()
        .parse()
        .context("Failed to parse default config template")?;

    // Parse user's existing config
    let user_doc: DocumentMut = user_config.parse().context("Failed to parse user config")?;

    // Overlay user values onto template
    merge_items(doc.as_table_mut(), user_doc.as_table());

    Ok(doc.to_string())
}

/// Recursively merges items from source table into target table.
fn merge_items(target: &mut toml_edit::Table, source: &toml_edit::Table) {
    use toml_edit::Item;

    for (key, value) in source.iter() {
        match value {
            Item::Value(v) => {
                // Scalar value: override in target
                target[key] = Item::Value(v.clone());
            }
            Item::Table(src_table) => {
                // Nested table: recursively merge
                if let Some(Item::Table(target_table)) = target.get_mut(key) {
                    merge_items(target_table, src_table);
                } else {
                    // Target doesn't have this table, copy it
                    target[key] = Item::Table(src_table.clone());
                }
            }
            Item::ArrayOfTables(src_arr) => {
                // Array of tables: replace entirely with user's version
                target[key] = Item::ArrayOfTables(src_arr.clone());
            }
            Item::None => {}
        }
    }
}

pub mod paths {
    //! Path resolution for signon configuration and data directories.
    //!
    //! SIGNON_HOME resolution order:
    //! 1. SIGNON_HOME environment variable (if set)
    //! 2. ~/.config/signon (default)

    use std::path::PathBuf;

    /// Returns the signon home directory.
    ///
    /// Checks SIGNON_HOME env var first, falls back to ~/.config/signon
    pub fn signon_home() -> PathBuf {
        if let Ok(home) = std::env::var("SIGNON_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir()
            .map(|h| h.join(".config").join("signon"))
            .expect("Could not determine home directory")
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        signon_home().join("config.toml")
    }

    /// Returns the directory log files are written to.
    pub fn logs_dir() -> PathBuf {
        signon_home().join("logs")
    }
}

impl Config {
    const DEFAULT_TOKEN_TTL_SECS: u32 = 120;
    const DEFAULT_MOUNT: &str = "signin-challenge";

    /// Loads configuration from the default config path.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Writes the config template to the given path.
    ///
    /// If the file already exists, user values are merged into the latest
    /// template so new keys and comments show up without clobbering
    /// customizations. Returns true when the file was freshly created.
    pub fn init(path: &Path) -> Result<bool> {
        let created = !path.exists();
        let contents = if created {
            default_config_template().to_string()
        } else {
            let user_config = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            merge_with_template(&user_config)?
        };

        Self::write_config(path, &contents)?;
        Ok(created)
    }

    /// Writes config content to a file, creating parent directories as needed.
    /// Uses atomic write (temp file + rename) to prevent corruption.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to move config into place at {}",
                path.display()
            )
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    /// Test: missing file loads as pure defaults.
    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("nonexistent.toml");

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.provider.api_key, None);
        assert_eq!(config.challenge.token_ttl_secs, 120);
        assert_eq!(config.challenge.mount, "signin-challenge");
    }

    /// Test: partial config merges with defaults.
    #[test]
    fn test_load_partial_config_merges_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(&config_path, "[challenge]\ntoken_ttl_secs = 30\n").unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.challenge.token_ttl_secs, 30);
        assert_eq!(config.challenge.callback_port, 0);
        assert_eq!(config.provider.base_url, None);
    }

    /// Test: malformed TOML is an error, not silent defaults.
    #[test]
    fn test_load_rejects_malformed_config() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(&config_path, "[challenge\ntoken_ttl_secs = ").unwrap();

        assert!(Config::load_from(&config_path).is_err());
    }

    /// Test: init creates the commented template, creating parent dirs.
    #[test]
    fn test_init_creates_config_with_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("subdir").join("config.toml");

        let created = Config::init(&config_path).unwrap();

        assert!(created);
        assert!(config_path.exists());
        let contents = fs::read_to_string(&config_path).unwrap();
        assert!(contents.contains("token_ttl_secs = 120"));
        assert!(contents.contains("# api_key ="));
    }

    /// Test: init on an existing file keeps user values and restores
    /// template comments.
    #[test]
    fn test_init_merges_existing_values_into_template() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(
            &config_path,
            "[provider]\napi_key = \"km-123\"\n\n[challenge]\ntoken_ttl_secs = 45\n",
        )
        .unwrap();

        let created = Config::init(&config_path).unwrap();

        assert!(!created);
        let contents = fs::read_to_string(&config_path).unwrap();
        assert!(contents.contains("api_key = \"km-123\""));
        assert!(contents.contains("token_ttl_secs = 45"));
        // Template commentary survives the refresh.
        assert!(contents.contains("# Local port for the verification callback"));

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.provider.api_key.as_deref(), Some("km-123"));
        assert_eq!(config.challenge.token_ttl_secs, 45);
    }

    /// Test: zero TTL disables challenge expiry.
    #[test]
    fn test_token_ttl_zero_disables() {
        let challenge = ChallengeConfig {
            token_ttl_secs: 0,
            ..Default::default()
        };
        assert_eq!(challenge.token_ttl(), None);

        let challenge = ChallengeConfig::default();
        assert_eq!(
            challenge.token_ttl(),
            Some(std::time::Duration::from_secs(120))
        );
    }

    /// Test: the embedded template itself parses into defaults.
    #[test]
    fn test_template_parses_as_defaults() {
        let config: Config = toml::from_str(default_config_template()).unwrap();
        assert_eq!(config.challenge.token_ttl_secs, 120);
        assert_eq!(config.challenge.mount, "signin-challenge");
        assert_eq!(config.provider.api_key, None);
    }
}
