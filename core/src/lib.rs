//! Mailchimp list-subscription and campaign facade.
//!
//! # Overview
//! `Newsletter` resolves human-readable list names to Mailchimp list ids,
//! merges caller options over sensible defaults and issues one HTTP call per
//! operation through the wrapped `MailChimp` client. Any non-2xx answer comes
//! back as an `Err` and is also recorded on the client as its last error.
//!
//! # Design
//! - `MailChimp` splits every call into `build_request` and `parse_response`
//!   around a pluggable `Transport`, so the request shaping is testable
//!   without a network.
//! - `UreqTransport` is the blocking production transport.
//! - Configuration is a TOML file (`NewsletterConfig`) with environment
//!   overrides for the api key and endpoint.
//!
//! ```no_run
//! use newsletter_core::{Newsletter, NewsletterConfig, Subscription};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = NewsletterConfig::load(std::path::Path::new("newsletter.toml"))?;
//! let mut newsletter = Newsletter::from_config(&config)?;
//!
//! let jane = Subscription::new("jane@example.com").merge_field("FNAME", "Jane");
//! newsletter.subscribe_or_update(&jane, None)?;
//! assert!(newsletter.is_subscribed("jane@example.com", None)?);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod http;
pub mod lists;
pub mod newsletter;

pub use api::{MailChimp, Params};
pub use config::{ListConfig, NewsletterConfig};
pub use error::{ConfigError, NewsletterError, Result, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
pub use lists::{NewsletterList, NewsletterListCollection};
pub use newsletter::{subscription_options, Campaign, Newsletter, Subscription, TIMEOUT};
