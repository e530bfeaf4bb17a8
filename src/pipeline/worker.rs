//! Background delivery of queued events
//!
//! A single worker drains the event queue in FIFO order. For each event it
//! resolves the destination website (creating it on the collector when
//! allowed) and submits the event. Failures drop the event; a panic while
//! processing restarts the drain loop instead of killing the worker.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, Instrument};

use crate::collector::{Collector, CollectorError};
use crate::models::Event;
use crate::tracking::SiteDirectory;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("no website known for {0} and website creation is disabled")]
    UnknownSite(String),
    #[error("skip tracking, website id is unknown: {0}")]
    EmptySiteId(String),
    #[error("failed to create website: {0}")]
    CreateWebsite(#[source] CollectorError),
    #[error("failed to send tracking: {0}")]
    Send(#[source] CollectorError),
}

/// Credentials and options established by a successful connection.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub token: Option<String>,
    pub team_id: Option<String>,
    pub create_new_websites: bool,
}

/// Single consumer of the event queue.
pub struct DeliveryWorker {
    receiver: mpsc::Receiver<Event>,
    collector: Arc<dyn Collector>,
    directory: Arc<SiteDirectory>,
    session: Session,
    cancel: CancellationToken,
}

impl DeliveryWorker {
    pub fn new(
        receiver: mpsc::Receiver<Event>,
        collector: Arc<dyn Collector>,
        directory: Arc<SiteDirectory>,
        session: Session,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            receiver,
            collector,
            directory,
            session,
            cancel,
        }
    }

    /// Spawn the worker in the current tracing span.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run().in_current_span())
    }

    /// Drain the queue until shutdown, restarting the drain loop whenever
    /// processing an event panics.
    pub async fn run(mut self) {
        loop {
            match AssertUnwindSafe(self.drain()).catch_unwind().await {
                Ok(()) => return,
                Err(panic) => {
                    error!(panic = %panic_message(panic.as_ref()), "worker failed, restarting");
                }
            }
        }
    }

    async fn drain(&mut self) {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("worker shutting down (canceled)");
                    return;
                }
                event = self.receiver.recv() => match event {
                    Some(event) => event,
                    None => {
                        debug!("worker shutting down (queue closed)");
                        return;
                    }
                },
            };

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("worker shutting down, abandoning in-flight event");
                    return;
                }
                result = self.deliver(event) => {
                    if let Err(e) = result {
                        error!(error = %e, "event dropped");
                    }
                }
            }
        }
    }

    /// Resolve the destination website and submit one event.
    pub async fn deliver(&self, mut event: Event) -> Result<(), DeliveryError> {
        event.website = self.resolve_website(&event.hostname).await?;

        debug!(hostname = %event.hostname, url = %event.url, website = %event.website, "sending tracking request");
        self.collector
            .send_event(self.session.token.as_deref(), &event)
            .await
            .map_err(DeliveryError::Send)
    }

    /// Look the hostname up in the directory, creating a website on the
    /// collector when it is unknown and creation is enabled.
    ///
    /// # Arguments
    /// * `hostname` - Normalized hostname of the event
    ///
    /// # Returns
    /// The website id stored for the hostname. A failed creation is not
    /// cached, so the next event for the host tries again.
    pub async fn resolve_website(&self, hostname: &str) -> Result<String, DeliveryError> {
        if let Some(site_id) = self.directory.lookup(hostname) {
            return non_empty_site(hostname, site_id);
        }

        let token = match (&self.session.token, self.session.create_new_websites) {
            (Some(token), true) => token,
            _ => return Err(DeliveryError::UnknownSite(hostname.to_string())),
        };

        let website = self
            .collector
            .create_website(token, hostname, self.session.team_id.as_deref())
            .await
            .map_err(DeliveryError::CreateWebsite)?;
        let site_id = non_empty_site(hostname, website.id)?;

        debug!(%hostname, website = %site_id, "created website");
        Ok(self.directory.insert_if_absent(hostname, &site_id))
    }
}

fn non_empty_site(hostname: &str, site_id: String) -> Result<String, DeliveryError> {
    if site_id.is_empty() {
        Err(DeliveryError::EmptySiteId(hostname.to_string()))
    } else {
        Ok(site_id)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
