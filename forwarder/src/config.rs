use crate::dispatcher::DestinationKind;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use url::Url;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_APRS_HOST: &str = "rotate.aprs.net";
pub const DEFAULT_APRS_PORT: u16 = 14580;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Keyword {0:?} must only contain lowercase letters, digits, '-' or '_'")]
    InvalidKeyword(String),

    #[error("Keyword {keyword:?} is configured for both {first} and {second}")]
    DuplicateKeyword {
        keyword: String,
        first: DestinationKind,
        second: DestinationKind,
    },

    #[error("PhoneTrack keyword is set but no PhoneTrack host is configured")]
    MissingPhoneTrackHost,

    #[error("Invalid PhoneTrack host {0:?}")]
    InvalidPhoneTrackHost(String),

    #[error("APRS local keyword is set but no APRS local host is configured")]
    MissingAprsLocalHost,

    #[error("Empty APRS host")]
    EmptyAprsHost,
}

/// Forwarder configuration
///
/// Built once at start-up and shared read-only by every request.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for incoming position events
    #[serde(default)]
    pub listener: Listener,
    /// Optional listener for health and readiness endpoints
    #[serde(default)]
    pub admin_listener: Option<Listener>,
    /// Attribute keyword per destination kind
    #[serde(default)]
    pub keywords: Keywords,
    /// Base URL of the Nextcloud instance running PhoneTrack
    #[serde(default)]
    pub phonetrack_host: Option<String>,
    /// APRS-IS server used by the `aprs` keyword
    #[serde(default)]
    pub aprs: AprsServer,
    /// Second APRS-IS server (e.g. a local igate) used by the `aprs_local` keyword
    #[serde(default)]
    pub aprs_local: Option<AprsServer>,
    #[serde(default)]
    pub timeouts: Timeouts,
}

impl Config {
    /// Validates the forwarder configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        if let Some(admin) = &self.admin_listener {
            admin.validate()?;
        }

        // Keywords must be distinct so that matching never depends on priority
        let mut seen: HashMap<&str, DestinationKind> = HashMap::new();
        let keywords = self.keywords.prioritized();
        for (kind, keyword) in &keywords {
            if !keyword
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
            {
                return Err(ValidationError::InvalidKeyword(keyword.clone()));
            }

            if let Some(first) = seen.insert(keyword.as_str(), *kind) {
                return Err(ValidationError::DuplicateKeyword {
                    keyword: keyword.clone(),
                    first,
                    second: *kind,
                });
            }
        }

        if self.keywords.phonetrack().is_some() {
            let host = self
                .phonetrack_host
                .as_deref()
                .filter(|h| !h.trim().is_empty())
                .ok_or(ValidationError::MissingPhoneTrackHost)?;
            Url::parse(host.trim())
                .map_err(|_| ValidationError::InvalidPhoneTrackHost(host.to_string()))?;
        }

        if self.aprs.host.is_empty() {
            return Err(ValidationError::EmptyAprsHost);
        }

        if self.keywords.aprs_local().is_some() {
            match &self.aprs_local {
                Some(server) if !server.host.is_empty() => {}
                _ => return Err(ValidationError::MissingAprsLocalHost),
            }
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: DEFAULT_PORT,
        }
    }
}

impl Listener {
    /// Validates the listener configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Attribute name keywords. An unset or empty keyword disables that destination kind.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Keywords {
    pub json: Option<String>,
    pub get: Option<String>,
    pub post: Option<String>,
    pub phonetrack: Option<String>,
    pub webdav: Option<String>,
    pub aprs: Option<String>,
    pub aprs_local: Option<String>,
}

impl Keywords {
    /// Configured keywords in matching priority order, trimmed and lowercased
    pub fn prioritized(&self) -> Vec<(DestinationKind, String)> {
        DestinationKind::PRIORITY
            .iter()
            .filter_map(|kind| self.get(*kind).map(|keyword| (*kind, keyword)))
            .collect()
    }

    pub fn get(&self, kind: DestinationKind) -> Option<String> {
        let raw = match kind {
            DestinationKind::Json => &self.json,
            DestinationKind::Get => &self.get,
            DestinationKind::Post => &self.post,
            DestinationKind::PhoneTrack => &self.phonetrack,
            DestinationKind::WebDav => &self.webdav,
            DestinationKind::Aprs => &self.aprs,
            DestinationKind::AprsLocal => &self.aprs_local,
        };

        raw.as_deref()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
    }

    fn phonetrack(&self) -> Option<String> {
        self.get(DestinationKind::PhoneTrack)
    }

    fn aprs_local(&self) -> Option<String> {
        self.get(DestinationKind::AprsLocal)
    }
}

/// APRS-IS server address
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AprsServer {
    pub host: String,
    #[serde(default = "default_aprs_port")]
    pub port: u16,
}

impl Default for AprsServer {
    fn default() -> Self {
        AprsServer {
            host: DEFAULT_APRS_HOST.into(),
            port: DEFAULT_APRS_PORT,
        }
    }
}

fn default_aprs_port() -> u16 {
    DEFAULT_APRS_PORT
}

/// Outbound call timeouts
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Timeouts {
    #[serde(default = "default_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub aprs_timeout_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            http_timeout_secs: default_timeout_secs(),
            aprs_timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}
