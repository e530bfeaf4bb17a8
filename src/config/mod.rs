use std::collections::HashMap;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal configuration problems. Any of these leaves the feeder disabled
/// for the remainder of the process lifetime.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("umami_host is not set")]
    MissingHost,
    #[error("retrieved token is empty")]
    EmptyToken,
    #[error("either umami_token or websites must be set")]
    MissingCredentials,
    #[error("umami_token is required to create new websites")]
    TokenRequired,
    #[error("invalid ignore_ips entry {entry:?}: {source}")]
    InvalidIgnoreIp {
        entry: String,
        #[source]
        source: ipnet::AddrParseError,
    },
    #[error("failed to compile ignore_urls pattern {pattern:?}: {source}")]
    InvalidIgnoreUrl {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeederConfig {
    /// Set to `false` to switch tracking off entirely.
    pub enabled: bool,
    /// Deprecated inverse of `enabled`.
    pub disabled: bool,
    /// Emit debug diagnostics (classifier decisions, connection progress).
    pub debug: bool,
    /// Number of events that may wait for delivery before new ones are dropped.
    pub queue_size: usize,

    /// Base URL of the Umami instance.
    pub umami_host: String,
    /// API token. Either this, username/password or `websites` must be set.
    pub umami_token: String,
    pub umami_username: String,
    pub umami_password: String,
    /// Team used to scope website listing and creation.
    pub umami_team_id: String,

    /// Static hostname to website id map. Entries here win over websites
    /// fetched from the collector.
    pub websites: HashMap<String, String>,
    /// Create a website on the collector the first time an unknown hostname is seen.
    pub create_new_websites: bool,

    /// Track responses with status >= 400.
    pub track_errors: bool,
    /// Track every resource instead of only page-like content.
    pub track_all_resources: bool,
    /// Replacement for the built-in list of trackable extensions, e.g. `[".html", ""]`.
    pub track_extensions: Vec<String>,

    pub ignore_user_agents: Vec<String>,
    /// Regular expressions matched against the request URL.
    pub ignore_urls: Vec<String>,
    /// IP addresses or CIDR ranges.
    pub ignore_ips: Vec<String>,
    /// Header carrying the real client address.
    pub header_ip: String,
    /// Inbound headers copied onto event submissions.
    pub forward_headers: Vec<String>,
}

impl Default for FeederConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            disabled: false,
            debug: false,
            queue_size: 1000,

            umami_host: String::new(),
            umami_token: String::new(),
            umami_username: String::new(),
            umami_password: String::new(),
            umami_team_id: String::new(),

            websites: HashMap::new(),
            create_new_websites: false,

            track_errors: false,
            track_all_resources: false,
            track_extensions: Vec::new(),

            ignore_user_agents: Vec::new(),
            ignore_urls: Vec::new(),
            ignore_ips: Vec::new(),
            header_ip: "X-Real-IP".to_string(),
            forward_headers: FeederConfig::default_forward_headers(),
        }
    }
}

impl FeederConfig {
    fn default_forward_headers() -> Vec<String> {
        [
            "User-Agent",
            "Accept-Language",
            "X-Real-IP",
            "CF-Connecting-IP",
            "CF-IPCountry",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    /// Whether tracking was requested at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled && !self.disabled
    }

    pub fn team_id(&self) -> Option<&str> {
        non_empty(&self.umami_team_id)
    }

    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (non_empty(&self.umami_username), non_empty(&self.umami_password)) {
            (Some(username), Some(password)) => Some((username, password)),
            _ => None,
        }
    }

    /// Load configuration from defaults, an optional file and `FEEDER_*`
    /// environment variables, in that order of precedence.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        let environment = config::Environment::with_prefix("FEEDER")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("track_extensions")
            .with_list_parse_key("ignore_user_agents")
            .with_list_parse_key("ignore_urls")
            .with_list_parse_key("ignore_ips")
            .with_list_parse_key("forward_headers");

        let settings = builder
            .add_source(environment)
            .build()
            .context("failed to read feeder configuration")?;

        settings
            .try_deserialize()
            .context("invalid feeder configuration")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Where proxied requests are forwarded to.
    pub upstream_url: String,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = std::env::var("LISTEN_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = std::env::var("LISTEN_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("LISTEN_PORT must be a valid port number")?;
        let upstream_url =
            std::env::var("UPSTREAM_URL").context("UPSTREAM_URL must be set")?;

        Ok(ServerConfig {
            host,
            port,
            upstream_url: upstream_url.trim_end_matches('/').to_string(),
        })
    }
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
