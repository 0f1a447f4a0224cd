//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

/// A delivery channel that posts to a single endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub url: String,
    /// Destination keys: names, or channel ids as decimal strings.
    pub destinations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    pub api_url: String,
    pub token: String,
    pub destinations: Vec<String>,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP API.
    /// Env: `TIDINGS_HOST` + `TIDINGS_PORT`
    /// Default: `0.0.0.0:3100`
    pub http_addr: SocketAddr,

    /// Durable log backing the channel store.
    /// Env: `TIDINGS_CHANNEL_LOG`
    /// Default: `channels.log`
    pub channel_log: PathBuf,

    /// Global notifications switch.
    /// Env: `TIDINGS_NOTIFICATIONS_ENABLED` (true/false)
    /// Default: `true`
    pub notifications_enabled: bool,

    /// Timer period between envelopes.
    /// Env: `TIDINGS_NOTIFY_INTERVAL_SECS`
    /// Default: `30`
    pub notify_interval: Duration,

    /// Writer identity stamped on every envelope.
    /// Env: `TIDINGS_WRITER_ID`
    /// Default: `tidings`
    pub writer_id: String,

    /// Where the chain head survives restarts. Unset means every start
    /// begins a fresh chain from genesis.
    /// Env: `TIDINGS_CHAIN_HEAD_PATH`
    pub chain_head_path: Option<PathBuf>,

    /// Env: `TIDINGS_WEBHOOK_URL`, `TIDINGS_WEBHOOK_DESTINATIONS`
    pub webhook: Option<EndpointConfig>,

    /// Env: `TIDINGS_BOT_API_URL`, `TIDINGS_BOT_TOKEN`, `TIDINGS_BOT_DESTINATIONS`
    pub bot: Option<BotConfig>,

    /// Env: `TIDINGS_SMS_URL`, `TIDINGS_SMS_DESTINATIONS`
    pub sms: Option<EndpointConfig>,

    /// Dispatch reports kept for `GET /deliveries`.
    /// Env: `TIDINGS_RECENT_REPORTS`
    /// Default: `64`
    pub recent_reports: usize,
}

pub const DEFAULT_BOT_API_URL: &str = "https://api.telegram.org";

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 3100).into(),
            channel_log: PathBuf::from("channels.log"),
            notifications_enabled: true,
            notify_interval: Duration::from_secs(30),
            writer_id: "tidings".to_string(),
            chain_head_path: None,
            webhook: None,
            bot: None,
            sms: None,
            recent_reports: 64,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key/value source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let host = get("TIDINGS_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = match get("TIDINGS_PORT") {
            Some(v) => v.parse().with_context(|| format!("TIDINGS_PORT: invalid port '{}'", v))?,
            None => defaults.http_addr.port(),
        };
        let http_addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("TIDINGS_HOST: invalid address '{}'", host))?;

        let notify_secs: u64 = match get("TIDINGS_NOTIFY_INTERVAL_SECS") {
            Some(v) => v
                .parse()
                .with_context(|| format!("TIDINGS_NOTIFY_INTERVAL_SECS: invalid number '{}'", v))?,
            None => defaults.notify_interval.as_secs(),
        };
        if notify_secs == 0 {
            bail!("TIDINGS_NOTIFY_INTERVAL_SECS must be at least 1");
        }

        let notifications_enabled = match get("TIDINGS_NOTIFICATIONS_ENABLED") {
            Some(v) => parse_bool(&v).with_context(|| format!("TIDINGS_NOTIFICATIONS_ENABLED: '{}'", v))?,
            None => defaults.notifications_enabled,
        };

        let recent_reports = match get("TIDINGS_RECENT_REPORTS") {
            Some(v) => v
                .parse()
                .with_context(|| format!("TIDINGS_RECENT_REPORTS: invalid number '{}'", v))?,
            None => defaults.recent_reports,
        };

        let webhook = get("TIDINGS_WEBHOOK_URL").map(|url| EndpointConfig {
            url,
            destinations: split_list(get("TIDINGS_WEBHOOK_DESTINATIONS")),
        });

        let bot = get("TIDINGS_BOT_TOKEN").map(|token| BotConfig {
            api_url: get("TIDINGS_BOT_API_URL").unwrap_or_else(|| DEFAULT_BOT_API_URL.into()),
            token,
            destinations: split_list(get("TIDINGS_BOT_DESTINATIONS")),
        });

        let sms = get("TIDINGS_SMS_URL").map(|url| EndpointConfig {
            url,
            destinations: split_list(get("TIDINGS_SMS_DESTINATIONS")),
        });

        Ok(Self {
            http_addr,
            channel_log: get("TIDINGS_CHANNEL_LOG").map(PathBuf::from).unwrap_or(defaults.channel_log),
            notifications_enabled,
            notify_interval: Duration::from_secs(notify_secs),
            writer_id: get("TIDINGS_WRITER_ID").unwrap_or(defaults.writer_id),
            chain_head_path: get("TIDINGS_CHAIN_HEAD_PATH").map(PathBuf::from),
            webhook,
            bot,
            sms,
            recent_reports,
        })
    }
}

fn parse_bool(value: &str) -> anyhow::Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => bail!("expected true or false"),
    }
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> anyhow::Result<ServerConfig> {
        let env: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ServerConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_with_empty_environment() {
        let config = load(&[]).unwrap();
        assert_eq!(config.http_addr, "0.0.0.0:3100".parse::<SocketAddr>().unwrap());
        assert_eq!(config.channel_log, PathBuf::from("channels.log"));
        assert!(config.notifications_enabled);
        assert_eq!(config.notify_interval, Duration::from_secs(30));
        assert_eq!(config.writer_id, "tidings");
        assert_eq!(config.chain_head_path, None);
        assert!(config.webhook.is_none() && config.bot.is_none() && config.sms.is_none());
        assert_eq!(config.recent_reports, 64);
    }

    #[test]
    fn overrides_are_applied() {
        let config = load(&[
            ("TIDINGS_HOST", "127.0.0.1"),
            ("TIDINGS_PORT", "8088"),
            ("TIDINGS_CHANNEL_LOG", "/var/lib/tidings/channels.log"),
            ("TIDINGS_NOTIFICATIONS_ENABLED", "false"),
            ("TIDINGS_NOTIFY_INTERVAL_SECS", "5"),
            ("TIDINGS_WRITER_ID", "node-7"),
            ("TIDINGS_CHAIN_HEAD_PATH", "/var/lib/tidings/head"),
        ])
        .unwrap();
        assert_eq!(config.http_addr, "127.0.0.1:8088".parse::<SocketAddr>().unwrap());
        assert_eq!(config.channel_log, PathBuf::from("/var/lib/tidings/channels.log"));
        assert!(!config.notifications_enabled);
        assert_eq!(config.notify_interval, Duration::from_secs(5));
        assert_eq!(config.writer_id, "node-7");
        assert_eq!(config.chain_head_path, Some(PathBuf::from("/var/lib/tidings/head")));
    }

    #[test]
    fn channels_and_destination_lists() {
        let config = load(&[
            ("TIDINGS_WEBHOOK_URL", "https://hooks.example/in"),
            ("TIDINGS_WEBHOOK_DESTINATIONS", "alice, ops ,,42"),
            ("TIDINGS_BOT_TOKEN", "123:abc"),
            ("TIDINGS_BOT_DESTINATIONS", "alice"),
            ("TIDINGS_SMS_DESTINATIONS", "bob"),
        ])
        .unwrap();

        assert_eq!(
            config.webhook,
            Some(EndpointConfig {
                url: "https://hooks.example/in".into(),
                destinations: vec!["alice".into(), "ops".into(), "42".into()],
            })
        );
        let bot = config.bot.unwrap();
        assert_eq!(bot.api_url, DEFAULT_BOT_API_URL);
        assert_eq!(bot.token, "123:abc");
        // Destinations without a URL do not enable the channel
        assert!(config.sms.is_none());
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = load(&[("TIDINGS_PORT", "  "), ("TIDINGS_WEBHOOK_URL", "")]).unwrap();
        assert_eq!(config.http_addr.port(), 3100);
        assert!(config.webhook.is_none());
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(load(&[("TIDINGS_PORT", "http")]).is_err());
        assert!(load(&[("TIDINGS_NOTIFICATIONS_ENABLED", "maybe")]).is_err());
        assert!(load(&[("TIDINGS_NOTIFY_INTERVAL_SECS", "0")]).is_err());
        assert!(load(&[("TIDINGS_NOTIFY_INTERVAL_SECS", "-1")]).is_err());
        assert!(load(&[("TIDINGS_RECENT_REPORTS", "many")]).is_err());
        assert!(load(&[("TIDINGS_HOST", "not a host")]).is_err());
    }

    #[test]
    fn boolean_spellings() {
        for v in ["true", "TRUE", "1", "yes", "on"] {
            assert!(parse_bool(v).unwrap());
        }
        for v in ["false", "False", "0", "no", "off"] {
            assert!(!parse_bool(v).unwrap());
        }
    }
}
