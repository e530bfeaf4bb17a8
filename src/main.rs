use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use umami_feeder::{with_tracking, Feeder, FeederConfig, ServerConfig};

const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

const HOP_BY_HOP: [header::HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

struct ProxyState {
    client: reqwest::Client,
    upstream: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::var("FEEDER_CONFIG").ok();
    let feeder_config = FeederConfig::load(config_path.as_deref())?;
    init_tracing(feeder_config.debug);

    let server = ServerConfig::from_env()?;
    info!("Loaded configuration");

    let cancel = CancellationToken::new();
    let feeder = Feeder::from_config("umami-feeder", feeder_config, cancel.clone())
        .context("failed to create Umami client")?;

    let proxy_state = Arc::new(ProxyState {
        client: reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("failed to build upstream HTTP client")?,
        upstream: server.upstream_url.clone(),
    });

    let app = Router::new().fallback(forward).with_state(proxy_state);
    let app = with_tracking(app, feeder.clone()).layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", server.host, server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Proxy listening on http://{} -> {}", addr, server.upstream_url);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Shutting down feeder");
    feeder.shutdown();

    Ok(())
}

fn init_tracing(debug: bool) {
    let default_filter = if debug { "info,umami_feeder=debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Pass the request through to the upstream unchanged.
async fn forward(State(state): State<Arc<ProxyState>>, request: Request) -> Response {
    match proxy(&state, request).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "upstream request failed");
            (StatusCode::BAD_GATEWAY, "Bad gateway").into_response()
        }
    }
}

async fn proxy(state: &ProxyState, request: Request) -> Result<Response> {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .context("failed to read request body")?;

    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);

    let upstream = state
        .client
        .request(parts.method, format!("{}{}", state.upstream, path))
        .headers(headers)
        .body(body)
        .send()
        .await
        .context("failed to reach upstream")?;

    let status = upstream.status();
    let mut response_headers = upstream.headers().clone();
    strip_hop_by_hop(&mut response_headers);
    let bytes = upstream
        .bytes()
        .await
        .context("failed to read upstream response")?;

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    Ok(response)
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}
