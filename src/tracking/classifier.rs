//! Track / no-track decision for inbound requests
//!
//! Rules are evaluated cheapest first: client IP, user agent, URL pattern,
//! resource extension, then site directory membership. The first rule
//! that matches suppresses tracking and logs why at debug level.

use std::sync::Arc;
use tracing::debug;

use super::directory::SiteDirectory;
use super::ip_extractor::{extract_client_ip, normalize_hostname};
use super::request::RequestView;
use super::rules::IgnoreRules;
use crate::config::FeederConfig;

/// Extensions that are likely to be page content rather than assets.
const CONTENT_EXTENSIONS: &[&str] = &[
    "", ".htm", ".html", ".xhtml", ".jsf", ".md", ".php", ".rss", ".rtf", ".txt", ".xml", ".pdf",
];

/// Decides whether a request should produce an event.
///
/// Checks run cheapest first and stop at the first rule that suppresses
/// tracking.
pub struct Classifier {
    rules: IgnoreRules,
    directory: Arc<SiteDirectory>,
    header_ip: String,
    track_all_resources: bool,
    track_extensions: Vec<String>,
    create_new_websites: bool,
}

impl Classifier {
    pub fn new(config: &FeederConfig, rules: IgnoreRules, directory: Arc<SiteDirectory>) -> Self {
        Self {
            rules,
            directory,
            header_ip: config.header_ip.clone(),
            track_all_resources: config.track_all_resources,
            track_extensions: config.track_extensions.clone(),
            create_new_websites: config.create_new_websites,
        }
    }

    /// Decide whether `request` produces an event.
    ///
    /// # Arguments
    /// * `request` - Facts about the inbound request
    ///
    /// # Returns
    /// `true` only if no ignore rule matched and the hostname is known (or
    /// websites may be created). An unparsable client IP is never tracked
    /// while IP rules are configured.
    pub fn should_track(&self, request: &RequestView<'_>) -> bool {
        if !self.rules.networks.is_empty() {
            match extract_client_ip(request.headers, &self.header_ip, request.peer) {
                Ok(ip) if self.rules.ignores_ip(ip) => {
                    debug!(%ip, "ignoring IP");
                    return false;
                }
                Ok(_) => {}
                Err(raw) => {
                    debug!(ip = %raw, "invalid IP");
                    return false;
                }
            }
        }

        if !self.rules.user_agents.is_empty() {
            let user_agent = request.user_agent();
            if self.rules.ignores_user_agent(user_agent) {
                debug!(user_agent, "ignoring user-agent");
                return false;
            }
        }

        if !self.rules.url_patterns.is_empty() {
            let url = request.url();
            if self.rules.ignores_url(url) {
                debug!(url, "ignoring location");
                return false;
            }
        }

        if !self.should_track_resource(request.path()) {
            debug!(path = request.path(), "ignoring resource");
            return false;
        }

        if self.create_new_websites {
            return true;
        }

        let hostname = normalize_hostname(request.host());
        if self.directory.contains(&hostname) {
            return true;
        }

        debug!(%hostname, "ignoring domain");
        false
    }

    fn should_track_resource(&self, path: &str) -> bool {
        if self.track_all_resources {
            return true;
        }

        let ext = path_extension(path);

        if !self.track_extensions.is_empty() {
            return self.track_extensions.iter().any(|e| e == ext);
        }

        CONTENT_EXTENSIONS.contains(&ext)
    }
}

/// Extension of the last path segment including the dot, or `""`.
pub fn path_extension(path: &str) -> &str {
    let segment = path.rsplit('/').next().unwrap_or(path);
    match segment.rfind('.') {
        Some(idx) => &segment[idx..],
        None => "",
    }
}
