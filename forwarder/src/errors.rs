use crate::aprs::client::AprsError;
use crate::config::ValidationError;
use crate::template::TemplateError;
use thiserror::Error;

/// Result type alias for forwarder operations
pub type Result<T, E = ForwarderError> = std::result::Result<T, E>;

/// Errors that stop the forwarder itself
#[derive(Error, Debug)]
pub enum ForwarderError {
    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The inbound event could not be turned into a position record.
/// Nothing is dispatched for it.
#[derive(Error, Debug)]
pub enum EventError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("missing or invalid field: {0}")]
    InvalidField(String),

    #[error("invalid timestamp in {field}: {value:?}")]
    InvalidTimestamp { field: &'static str, value: String },
}

/// Failure of a single destination. Never propagated past the dispatcher.
#[derive(Error, Debug)]
pub enum ForwardError {
    /// The attribute value does not have the shape the destination expects.
    #[error("configuration mismatch: {0}")]
    ConfigurationMismatch(String),

    #[error("url template error: {0}")]
    Template(#[from] TemplateError),

    /// The rendered URL is not a usable absolute URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("transport error for {target}: {message}")]
    Transport { target: String, message: String },

    #[error("upstream {target} responded with {status}: {body}")]
    UpstreamStatus {
        target: String,
        status: u16,
        body: String,
    },

    #[error("aprs error: {0}")]
    Aprs(#[from] AprsError),

    /// The event could not be encoded for upload.
    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ForwardError {
    pub fn transport(target: impl Into<String>, err: impl std::fmt::Display) -> Self {
        ForwardError::Transport {
            target: target.into(),
            message: err.to_string(),
        }
    }

    /// Short label used for metrics and report output
    pub fn label(&self) -> &'static str {
        match self {
            ForwardError::ConfigurationMismatch(_) => "configuration_mismatch",
            ForwardError::Template(_) => "template",
            ForwardError::InvalidUrl(_) => "invalid_url",
            ForwardError::Transport { .. } => "transport",
            ForwardError::UpstreamStatus { .. } => "upstream_status",
            ForwardError::Aprs(_) => "aprs",
            ForwardError::Serialization(_) => "serialization",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_error_labels() {
        assert_eq!(
            ForwardError::ConfigurationMismatch("bad token".into()).label(),
            "configuration_mismatch"
        );
        assert_eq!(
            ForwardError::InvalidUrl("http//".into()).label(),
            "invalid_url"
        );

        let err = ForwardError::transport("example.com", "connection refused");
        assert_eq!(err.label(), "transport");
        assert_eq!(
            err.to_string(),
            "transport error for example.com: connection refused"
        );

        let err = ForwardError::from(serde_json::from_str::<serde_json::Value>("{").unwrap_err());
        assert_eq!(err.label(), "serialization");
        assert!(err.to_string().starts_with("failed to serialize event"), "{err}");
    }
}
