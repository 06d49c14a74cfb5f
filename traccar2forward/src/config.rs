use forwarder::config::{AprsServer, Config as ForwarderConfig, Listener};
use serde::Deserialize;
use std::fs::File;
use std::str::FromStr;

const DEFAULT_STATSD_PORT: u16 = 8125;

#[derive(Debug, Deserialize, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    #[serde(default = "default_statsd_port")]
    pub statsd_port: u16,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub sentry_dsn: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            log_level: default_log_level(),
            sentry_dsn: None,
        }
    }
}

fn default_statsd_port() -> u16 {
    DEFAULT_STATSD_PORT
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct Config {
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub forwarder: ForwarderConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_vars(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from the flat variables of a container
    /// deployment. Empty variables count as unset.
    pub fn from_env_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| var(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut config = Config::default();
        let forwarder = &mut config.forwarder;

        if let Some(port) = parse_var(&get, "PORT")? {
            forwarder.listener.port = port;
        }
        if let Some(port) = parse_var(&get, "ADMIN_PORT")? {
            forwarder.admin_listener = Some(Listener {
                host: forwarder.listener.host.clone(),
                port,
            });
        }

        forwarder.keywords.json = get("JSON_KEYWORD");
        forwarder.keywords.get = get("GET_KEYWORD");
        forwarder.keywords.post = get("POST_KEYWORD");
        forwarder.keywords.phonetrack = get("PHONETRACK_KEYWORD");
        forwarder.keywords.webdav = get("WEBDAV_KEYWORD");
        forwarder.keywords.aprs = get("APRS_KEYWORD");
        forwarder.keywords.aprs_local = get("APRSLOCAL_KEYWORD");

        forwarder.phonetrack_host = get("PHONETRACK_HOST");

        if let Some(host) = get("APRS_HOST") {
            forwarder.aprs.host = host;
        }
        if let Some(port) = parse_var(&get, "APRS_PORT")? {
            forwarder.aprs.port = port;
        }
        if let Some(host) = get("APRSLOCAL_HOST") {
            let mut server = AprsServer {
                host,
                ..Default::default()
            };
            if let Some(port) = parse_var(&get, "APRSLOCAL_PORT")? {
                server.port = port;
            }
            forwarder.aprs_local = Some(server);
        }

        if let Some(level) = get("LOG_LEVEL") {
            config.logging.log_level = level.to_lowercase();
        }
        config.logging.sentry_dsn = get("SENTRY_DSN");

        if let Some(statsd_host) = get("STATSD_HOST") {
            config.metrics = Some(MetricsConfig {
                statsd_host,
                statsd_port: parse_var(&get, "STATSD_PORT")?.unwrap_or(DEFAULT_STATSD_PORT),
            });
        }

        Ok(config)
    }
}

fn parse_var<T, G>(get: &G, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    get(name)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidVariable { name, value })
        })
        .transpose()
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid value {value:?} for {name}")]
    InvalidVariable { name: &'static str, value: String },
}
