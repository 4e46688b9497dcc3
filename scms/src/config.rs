//! Operator configuration: a TOML file with per-field defaults, then
//! environment overrides.

use anyhow::{Context, Result};
use scms_core::codec::{DEFAULT_PASSPHRASE, DEFAULT_SALT};
use scms_core::credentials::DEFAULT_SALT_PHRASE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const REDACTED: &str = "<redacted>";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Directory holding one JSON file per collection (default `data`)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// HS256 secret for session tokens
    #[serde(default = "default_session_secret")]
    pub session_secret: String,

    /// Session lifetime in seconds (default 86400 = 1 day)
    #[serde(default = "default_session_max_age")]
    pub session_max_age_secs: u64,

    /// Password for the seeded administrator
    #[serde(default = "default_admin_password")]
    pub admin_password: String,

    /// Used when `RUST_LOG` is unset (default `info`)
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Prefix of the per-user password salt
    #[serde(default = "default_password_salt")]
    pub password_salt: String,

    #[serde(default)]
    pub codec: CodecConfig,
}

/// Key derivation input for document bodies. Changing either value makes
/// existing bodies unreadable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodecConfig {
    #[serde(default = "default_passphrase")]
    pub passphrase: String,
    #[serde(default = "default_salt")]
    pub salt: String,
}

fn default_data_dir() -> PathBuf { PathBuf::from("data") }
fn default_session_secret() -> String { "change-me".to_string() }
fn default_session_max_age() -> u64 { 86400 }
fn default_admin_password() -> String { "admin".to_string() }
fn default_log_filter() -> String { "info".to_string() }
fn default_password_salt() -> String { DEFAULT_SALT_PHRASE.to_string() }
fn default_passphrase() -> String { DEFAULT_PASSPHRASE.to_string() }
fn default_salt() -> String { DEFAULT_SALT.to_string() }

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            session_secret: default_session_secret(),
            session_max_age_secs: default_session_max_age(),
            admin_password: default_admin_password(),
            log_filter: default_log_filter(),
            password_salt: default_password_salt(),
            codec: CodecConfig::default(),
        }
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            passphrase: default_passphrase(),
            salt: default_salt(),
        }
    }
}

impl Config {
    /// Read `path` when given, otherwise start from defaults, then apply the
    /// `SCMS_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                Self::parse(&text)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("parsing config")
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("SCMS_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(secret) = lookup("SCMS_SESSION_SECRET") {
            self.session_secret = secret;
        }
        if let Some(password) = lookup("SCMS_ADMIN_PASSWORD") {
            self.admin_password = password;
        }
        if let Some(filter) = lookup("SCMS_LOG") {
            self.log_filter = filter;
        }
    }

    /// Copy safe to print.
    pub fn redacted(&self) -> Self {
        let mut shown = self.clone();
        shown.session_secret = REDACTED.to_string();
        shown.admin_password = REDACTED.to_string();
        shown.codec.passphrase = REDACTED.to_string();
        shown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.session_max_age_secs, 86400);
        assert_eq!(config.codec.salt, "verse");
    }

    #[test]
    fn file_values_override_defaults() {
        let config = Config::parse(
            r#"
            data_dir = "/var/lib/scms"
            session_max_age_secs = 60

            [codec]
            salt = "other"
            "#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/scms"));
        assert_eq!(config.session_max_age_secs, 60);
        assert_eq!(config.codec.salt, "other");
        assert_eq!(config.codec.passphrase, DEFAULT_PASSPHRASE);
    }

    #[test]
    fn environment_wins_over_file() {
        let mut config = Config::parse(r#"admin_password = "from-file""#).unwrap();
        let env: HashMap<&str, &str> =
            [("SCMS_ADMIN_PASSWORD", "from-env"), ("SCMS_LOG", "debug")].into();
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.admin_password, "from-env");
        assert_eq!(config.log_filter, "debug");
        assert_eq!(config.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn load_reads_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scms.toml");
        std::fs::write(&path, "session_secret = \"s3cret\"\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert!(!config.session_secret.is_empty());
        assert!(Config::load(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn redacted_hides_secrets() {
        let shown = Config::default().redacted();
        assert_eq!(shown.session_secret, REDACTED);
        assert_eq!(shown.admin_password, REDACTED);
        assert_eq!(shown.codec.passphrase, REDACTED);
        assert_eq!(shown.codec.salt, DEFAULT_SALT);
    }
}
