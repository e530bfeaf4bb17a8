//! Bringing the feeder online
//!
//! A connection attempt authenticates (when credentials are configured),
//! merges the collector's websites into the directory and compiles the
//! ignore rules. Transport problems are retried with exponential backoff;
//! configuration problems stop the feeder for good.

pub mod state;

pub use state::{retry_delay, ConnectionState};

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::collector::{Collector, CollectorError};
use crate::config::{ConfigError, FeederConfig};
use crate::pipeline::Session;
use crate::tracking::{IgnoreRules, SiteDirectory};

#[derive(Debug, Error)]
pub enum ConnectError {
    /// Worth retrying later
    #[error(transparent)]
    Transient(#[from] CollectorError),
    /// Retrying cannot help
    #[error(transparent)]
    Fatal(#[from] ConfigError),
}

/// Everything a successful attempt hands over to the running feeder.
#[derive(Debug)]
pub struct Established {
    pub session: Session,
    pub rules: IgnoreRules,
}

pub struct Connector {
    config: Arc<FeederConfig>,
    collector: Arc<dyn Collector>,
    directory: Arc<SiteDirectory>,
}

impl Connector {
    pub fn new(
        config: Arc<FeederConfig>,
        collector: Arc<dyn Collector>,
        directory: Arc<SiteDirectory>,
    ) -> Self {
        Self {
            config,
            collector,
            directory,
        }
    }

    /// One full connect + verify attempt.
    pub async fn establish(&self) -> Result<Established, ConnectError> {
        let session = self.connect().await?;
        debug!("connected to Umami, verifying configuration");
        let rules = IgnoreRules::compile(&self.config)?;
        Ok(Established { session, rules })
    }

    async fn connect(&self) -> Result<Session, ConnectError> {
        let config = &self.config;
        if config.umami_host.is_empty() {
            return Err(ConfigError::MissingHost.into());
        }

        let mut token = Some(config.umami_token.clone()).filter(|t| !t.is_empty());

        if let Some((username, password)) = config.credentials() {
            let fetched = self.collector.authenticate(username, password).await?;
            if fetched.is_empty() {
                return Err(ConfigError::EmptyToken.into());
            }
            debug!("token received");
            token = Some(fetched);
        }

        if token.is_none() && self.directory.is_empty() {
            return Err(ConfigError::MissingCredentials.into());
        }
        if token.is_none() && config.create_new_websites {
            return Err(ConfigError::TokenRequired.into());
        }

        if let Some(token) = &token {
            let websites = self
                .collector
                .list_websites(token, config.team_id())
                .await?;
            let added = self.directory.merge(
                websites
                    .iter()
                    .map(|w| (w.domain.as_str(), w.id.as_str()))
                    .filter(|(_, id)| !id.is_empty()),
            );
            debug!(fetched = websites.len(), added, total = self.directory.len(), "websites fetched");
        }

        Ok(Session {
            token,
            team_id: config.team_id().map(str::to_string),
            create_new_websites: config.create_new_websites,
        })
    }
}
