//! Configuration of the example bot.
//!
//! The configuration is read from a YAML file, then overridden by environment
//! variables prefixed with `BASIC_BOT_`. Nested keys are separated by `__`.
//!
//! ```yaml
//! matrix:
//!   user_id: "@bot:matrix.org"
//!   password: "secret-password"
//!   homeserver_url: "https://matrix.org"
//!
//! # Optional, every key has a default
//! options:
//!   message_types: ["m.text", "m.emote"]
//!   automatically_join_rooms: true
//!   automatically_leave_rooms: true
//!   automatically_verify_devices: true
//! ```
//!
//! ```bash
//! export BASIC_BOT_MATRIX__PASSWORD="secret-from-env"
//! ```

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::Deserialize;

use crate::bot::BotOptions;

/// Prefix of the environment variables overriding the file.
const ENV_PREFIX: &str = "BASIC_BOT_";

/// Root configuration structure.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Matrix account configuration
    pub matrix: Matrix,
    /// Automatic actions and message filtering
    #[serde(default)]
    pub options: BotOptions,
}

/// Matrix account configuration.
#[derive(Debug, Deserialize)]
pub struct Matrix {
    /// Matrix user id or localpart of the bot account.
    ///
    /// # Examples
    ///
    /// - `@bot:matrix.org`
    /// - `bot`
    pub user_id: String,

    /// Account password.
    ///
    /// Only used for the first login and to authenticate the cross-signing
    /// setup. The session is persisted afterwards.
    pub password: String,

    /// Base URL of the homeserver, e.g. `https://matrix.org`.
    pub homeserver_url: String,
}

impl Config {
    /// Loads the YAML file at `path` with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a required key is missing from both the file and
    /// the environment, or if a value has the wrong type.
    pub fn load(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::{collections::BTreeSet, fs};
    use tempfile::TempDir;

    fn write_config(temp_dir: &TempDir, content: &str) -> String {
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, content).unwrap();
        path.to_string_lossy().to_string()
    }

    #[test]
    #[serial]
    fn test_load_with_default_options() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(
            &temp_dir,
            r#"
matrix:
  user_id: "@bot:example.com"
  password: "secret"
  homeserver_url: "https://example.com"
"#,
        );

        let config = Config::load(&path).unwrap();

        assert_eq!(config.matrix.user_id, "@bot:example.com");
        assert_eq!(config.matrix.password, "secret");
        assert_eq!(config.matrix.homeserver_url, "https://example.com");
        assert_eq!(config.options, BotOptions::default());
    }

    #[test]
    #[serial]
    fn test_load_options() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(
            &temp_dir,
            r#"
matrix:
  user_id: "bot"
  password: "secret"
  homeserver_url: "https://example.com"
options:
  message_types: "m.notice"
  automatically_leave_rooms: false
"#,
        );

        let config = Config::load(&path).unwrap();

        assert_eq!(
            config.options.message_types,
            BTreeSet::from(["m.notice".to_owned()])
        );
        assert!(config.options.automatically_join_rooms);
        assert!(!config.options.automatically_leave_rooms);
        assert!(config.options.automatically_verify_devices);
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(
            &temp_dir,
            r#"
matrix:
  user_id: "bot"
  password: "from-file"
  homeserver_url: "https://example.com"
"#,
        );

        // SAFETY: tests touching the environment run serially
        unsafe { std::env::set_var("BASIC_BOT_MATRIX__PASSWORD", "from-env") };
        let config = Config::load(&path);
        unsafe { std::env::remove_var("BASIC_BOT_MATRIX__PASSWORD") };

        assert_eq!(config.unwrap().matrix.password, "from-env");
    }

    #[test]
    #[serial]
    fn test_missing_key_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(
            &temp_dir,
            r#"
matrix:
  user_id: "bot"
"#,
        );

        assert!(Config::load(&path).is_err());
    }
}
