//! Error types for the newsletter client.
//!
//! # Design
//! Each layer gets its own enum: the transport only knows about timeouts and
//! I/O, configuration only about reading and validating the file, and
//! `NewsletterError` wraps both alongside the API-level failures. A non-2xx
//! response is reported as `Api` with the status and the detail the provider
//! sent back, never as a panic.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for newsletter operations.
pub type Result<T> = std::result::Result<T, NewsletterError>;

/// Errors raised while executing an `HttpRequest`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request did not complete within the per-call timeout.
    #[error("request timed out after {} seconds", .0.as_secs_f64())]
    Timeout(Duration),

    /// Connection, TLS or protocol failure.
    #[error("transport failure: {0}")]
    Io(String),
}

/// Errors raised while loading `NewsletterConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no api key configured")]
    MissingApiKey,

    #[error("no lists configured")]
    NoLists,

    #[error("timeout_secs must be greater than zero")]
    ZeroTimeout,
}

/// Errors returned by `Newsletter` and `MailChimp` operations.
#[derive(Debug, Error)]
pub enum NewsletterError {
    /// A list name was given that is not part of the configured collection.
    #[error("There is no list named `{0}`.")]
    UnknownList(String),

    /// The configured default list name does not match any list.
    #[error("Could not find a default list named `{0}`.")]
    DefaultListMissing(String),

    #[error("list `{0}` is configured more than once")]
    DuplicateList(String),

    /// The api key carries no `-<datacenter>` suffix.
    #[error("invalid Mailchimp API key `{0}`: expected `<key>-<datacenter>`")]
    InvalidApiKey(String),

    /// The API answered with a non-2xx status.
    #[error("API error (status {status}): {detail}")]
    Api { status: u16, detail: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The response body was not valid JSON.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl NewsletterError {
    /// True for failures reported by the remote API or the transport, as
    /// opposed to local configuration and list resolution problems.
    pub fn is_api_failure(&self) -> bool {
        matches!(
            self,
            Self::Api { .. } | Self::Transport(_) | Self::Deserialization(_)
        )
    }

    /// True when the API answered 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }
}
