//! Per-request tracking decisions
//!
//! Everything in here runs on the request path and never suspends:
//! extracting request facts, evaluating ignore rules and looking up the
//! hostname in the site directory.
//!
//! The same request facts also produce the header block forwarded with each
//! event, so the collector sees the visitor's user agent and address rather
//! than the feeder's.

pub mod classifier;
pub mod directory;
pub mod headers;
pub mod ip_extractor;
pub mod request;
pub mod rules;

pub use classifier::Classifier;
pub use directory::SiteDirectory;
pub use headers::forwarded_headers;
pub use ip_extractor::{extract_client_ip, normalize_hostname, parse_accept_language};
pub use request::RequestView;
pub use rules::IgnoreRules;
