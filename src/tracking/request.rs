use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Method, Request, Uri};
use std::net::SocketAddr;

/// Borrowed view of the facts about an inbound request that tracking needs.
#[derive(Debug, Clone, Copy)]
pub struct RequestView<'a> {
    pub method: &'a Method,
    pub uri: &'a Uri,
    pub headers: &'a HeaderMap,
    /// Socket address of the peer, when the server recorded one
    pub peer: Option<SocketAddr>,
}

impl<'a> RequestView<'a> {
    pub fn from_request<B>(request: &'a Request<B>) -> Self {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Self {
            method: request.method(),
            uri: request.uri(),
            headers: request.headers(),
            peer,
        }
    }

    /// Raw host as sent by the client, port included.
    pub fn host(&self) -> &'a str {
        self.headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .or_else(|| self.uri.authority().map(|a| a.as_str()))
            .unwrap_or("")
    }

    pub fn path(&self) -> &'a str {
        self.uri.path()
    }

    /// Path plus query string, e.g. `/catalog/item.html?ref=mail`.
    pub fn url(&self) -> &'a str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| self.uri.path())
    }

    pub fn header(&self, name: impl header::AsHeaderName) -> &'a str {
        self.headers
            .get(name)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("")
    }

    pub fn user_agent(&self) -> &'a str {
        self.header(header::USER_AGENT)
    }

    /// Whether the request URI carries an `https` scheme.
    ///
    /// Requests accepted by a server arrive in origin form without a scheme,
    /// so this is only `true` for absolute-form URIs. Deployments that
    /// terminate TLS in front of the proxy should pass `X-Forwarded-Proto`,
    /// which takes precedence when forwarding.
    pub fn is_tls(&self) -> bool {
        self.uri.scheme_str() == Some("https")
    }
}
