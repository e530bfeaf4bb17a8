use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use axum::http::{header, Request, StatusCode};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument, Span};

use crate::collector::{Collector, CollectorResult, UmamiClient};
use crate::config::FeederConfig;
use crate::connection::{state::connect_with_retry, ConnectionState, Connector, Established};
use crate::models::Event;
use crate::pipeline::{DeliveryWorker, EventQueue};
use crate::tracking::ip_extractor::raw_client_ip;
use crate::tracking::{
    forwarded_headers, normalize_hostname, parse_accept_language, Classifier, RequestView,
    SiteDirectory,
};

/// Per-middleware-instance tracking state, cheap to clone.
///
/// Starts disabled and only starts producing events once the collector
/// connection and configuration have been verified in the background.
#[derive(Clone)]
pub struct Feeder {
    inner: Arc<FeederInner>,
}

struct FeederInner {
    config: Arc<FeederConfig>,
    enabled: AtomicBool,
    classifier: OnceLock<Classifier>,
    directory: Arc<SiteDirectory>,
    queue: EventQueue,
    /// Taken exactly once, when the delivery worker starts
    receiver: Mutex<Option<mpsc::Receiver<Event>>>,
    collector: Arc<dyn Collector>,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    span: Span,
}

impl Feeder {
    /// Build a feeder talking to the Umami instance named in the config.
    /// Must be called from within a Tokio runtime.
    pub fn from_config(
        name: &str,
        config: FeederConfig,
        cancel: CancellationToken,
    ) -> CollectorResult<Self> {
        let collector = Arc::new(UmamiClient::new(&config.umami_host)?);
        Ok(Self::new(name, config, collector, cancel))
    }

    /// Build a feeder and, if tracking is enabled in `config`, start
    /// connecting in the background.
    pub fn new(
        name: &str,
        config: FeederConfig,
        collector: Arc<dyn Collector>,
        cancel: CancellationToken,
    ) -> Self {
        let (queue, receiver) = EventQueue::new(config.queue_size);
        let (state, _) = watch::channel(ConnectionState::Disabled);
        let directory = Arc::new(SiteDirectory::new(&config.websites));
        let requested = config.is_enabled();

        let feeder = Self {
            inner: Arc::new(FeederInner {
                config: Arc::new(config),
                enabled: AtomicBool::new(false),
                classifier: OnceLock::new(),
                directory,
                queue,
                receiver: Mutex::new(Some(receiver)),
                collector,
                state,
                cancel,
                span: info_span!("feeder", middleware = %name),
            }),
        };

        if requested {
            feeder.spawn_connection();
        } else {
            let _guard = feeder.inner.span.enter();
            debug!("tracking disabled by configuration");
        }

        feeder
    }

    fn spawn_connection(&self) {
        let feeder = self.clone();
        let span = self.inner.span.clone();

        tokio::spawn(
            async move {
                let connector = Connector::new(
                    Arc::clone(&feeder.inner.config),
                    Arc::clone(&feeder.inner.collector),
                    Arc::clone(&feeder.inner.directory),
                );

                if let Some(established) =
                    connect_with_retry(&connector, &feeder.inner.cancel, &feeder.inner.state).await
                {
                    feeder.enable(established);
                }
            }
            .instrument(span),
        );
    }

    fn enable(&self, established: Established) {
        let inner = &self.inner;

        let receiver = inner
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(receiver) = receiver else {
            return;
        };

        let classifier = Classifier::new(
            &inner.config,
            established.rules,
            Arc::clone(&inner.directory),
        );
        if inner.classifier.set(classifier).is_err() {
            return;
        }

        DeliveryWorker::new(
            receiver,
            Arc::clone(&inner.collector),
            Arc::clone(&inner.directory),
            established.session,
            inner.cancel.clone(),
        )
        .spawn();

        inner.enabled.store(true, Ordering::Release);
        inner.state.send_replace(ConnectionState::Enabled);
        info!(websites = inner.directory.len(), "Umami tracking enabled");
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Wait until the connection step has either enabled tracking or given up.
    ///
    /// # Returns
    /// `Enabled` or `Failed` once the connection step finished, `Disabled`
    /// right away when tracking is switched off by configuration, and
    /// `Disabled` after [`Feeder::shutdown`] stopped the retries.
    pub async fn wait_until_settled(&self) -> ConnectionState {
        if !self.inner.config.is_enabled() {
            return self.state();
        }

        let mut rx = self.subscribe();
        tokio::select! {
            biased;
            settled = rx.wait_for(|state| {
                matches!(state, ConnectionState::Enabled | ConnectionState::Failed)
            }) => {
                if let Ok(state) = settled {
                    return *state;
                }
            }
            _ = self.inner.cancel.cancelled() => {}
        }

        // Cancelled: the retry loop publishes its final state promptly
        let settled = rx
            .wait_for(|state| !matches!(state, ConnectionState::Connecting { .. }))
            .await
            .map(|state| *state);
        settled.unwrap_or_else(|_| self.state())
    }

    pub fn queue(&self) -> &EventQueue {
        &self.inner.queue
    }

    pub fn directory(&self) -> &SiteDirectory {
        &self.inner.directory
    }

    /// Build the event for a request if it should be tracked.
    pub fn prepare<B>(&self, request: &Request<B>) -> Option<Event> {
        if !self.is_enabled() {
            return None;
        }
        let classifier = self.inner.classifier.get()?;
        let _guard = self.inner.span.enter();

        let view = RequestView::from_request(request);
        if !classifier.should_track(&view) {
            return None;
        }

        let config = &self.inner.config;
        Some(Event {
            website: String::new(),
            hostname: normalize_hostname(view.host()),
            language: parse_accept_language(view.header(header::ACCEPT_LANGUAGE)),
            referrer: view.header(header::REFERER).to_string(),
            url: view.url().to_string(),
            ip: raw_client_ip(view.headers, &config.header_ip, view.peer).unwrap_or_default(),
            user_agent: view.user_agent().to_string(),
            timestamp: chrono::Utc::now().timestamp(),
            headers: forwarded_headers(&view, &config.forward_headers),
        })
    }

    /// Enqueue a prepared event once the response status is known.
    /// Returns `true` if the event was queued.
    pub fn complete(&self, event: Event, status: StatusCode) -> bool {
        let _guard = self.inner.span.enter();

        if status.as_u16() >= 400 && !self.inner.config.track_errors {
            debug!(status = status.as_u16(), "not reporting error");
            return false;
        }

        self.inner.queue.submit(event)
    }

    /// Stop connection retries and the delivery worker.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }
}
