use anyhow::{bail, Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::translate::TopicRule;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub zulip: ZulipConfig,
    #[serde(default = "default_bridge_config")]
    pub bridge: BridgeConfig,
    #[serde(default = "default_db_config")]
    pub db: DbConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ZulipConfig {
    pub email: String,
    pub api_key: String,
    /// Base URL of the Zulip server, e.g. "https://chat.example.org".
    pub site: String,
    /// Stream forwarded messages are posted to.
    pub stream: String,
    /// Fixed topic. Leave empty to use the message date as the topic.
    #[serde(default)]
    pub topic: String,
    /// JSON file mapping Telegram names/usernames to Zulip handles.
    #[serde(default = "default_users_file")]
    pub users_file: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BridgeConfig {
    /// IANA time zone used for topics and quoted-reply dates.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Zulip refuses edits older than this (server default: 60 minutes).
    #[serde(default = "default_edit_window_minutes")]
    pub edit_window_minutes: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_users_file() -> PathBuf {
    PathBuf::from("zulip_users.json")
}

fn default_timezone() -> String {
    "Europe/Zurich".to_string()
}

fn default_edit_window_minutes() -> i64 {
    60
}

fn default_db_path() -> PathBuf {
    PathBuf::from("bridge.db")
}

fn default_bridge_config() -> BridgeConfig {
    BridgeConfig {
        timezone: default_timezone(),
        edit_window_minutes: default_edit_window_minutes(),
    }
}

fn default_db_config() -> DbConfig {
    DbConfig {
        path: default_db_path(),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.is_empty() {
            bail!("Telegram 'bot_token' is required");
        }
        if self.zulip.email.is_empty() || self.zulip.api_key.is_empty() {
            bail!("Zulip API: 'api_key' and 'email' are required");
        }
        if self.zulip.site.is_empty() || self.zulip.stream.is_empty() {
            bail!("Zulip 'site' and 'stream' are required");
        }
        self.timezone()?;
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.bridge
            .timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("Invalid time zone '{}': {}", self.bridge.timezone, e))
    }

    /// Empty topic in the config enables the date-as-topic fallback.
    pub fn topic_rule(&self) -> TopicRule {
        if self.zulip.topic.is_empty() {
            TopicRule::MessageDate
        } else {
            TopicRule::Fixed(self.zulip.topic.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_toml() -> String {
        r#"
            [telegram]
            bot_token = "123:abc"

            [zulip]
            email = "bridge-bot@chat.example.org"
            api_key = "secret"
            site = "https://chat.example.org"
            stream = "From Telegram"
        "#
        .to_string()
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let config: Config = toml::from_str(&base_toml()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.bridge.timezone, "Europe/Zurich");
        assert_eq!(config.bridge.edit_window_minutes, 60);
        assert_eq!(config.db.path, PathBuf::from("bridge.db"));
        assert_eq!(config.zulip.users_file, PathBuf::from("zulip_users.json"));
    }

    #[test]
    fn empty_topic_means_date_fallback() {
        let config: Config = toml::from_str(&base_toml()).unwrap();
        assert_eq!(config.topic_rule(), TopicRule::MessageDate);

        // topic belongs to the [zulip] table, which is last in base_toml
        let with_topic = format!("{}topic = \"General\"\n", base_toml());
        let config: Config = toml::from_str(&with_topic).unwrap();
        assert_eq!(config.topic_rule(), TopicRule::Fixed("General".to_string()));
    }

    #[test]
    fn missing_credentials_fail_validation() {
        let toml_str = base_toml().replace("api_key = \"secret\"", "api_key = \"\"");
        let config: Config = toml::from_str(&toml_str).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_timezone_fails_validation() {
        let toml_str = format!("{}\n[bridge]\ntimezone = \"Mars/Olympus\"", base_toml());
        let config: Config = toml::from_str(&toml_str).unwrap();
        assert!(config.validate().is_err());
    }
}
