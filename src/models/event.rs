use axum::http::HeaderMap;
use serde::Serialize;

/// A single pageview destined for the collector.
///
/// Everything except `website` is captured while the request is being
/// classified; `website` is filled in by the delivery worker once the
/// hostname has been resolved.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub website: String,
    pub hostname: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub language: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub referrer: String,
    pub url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ip: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user_agent: String,
    /// Unix timestamp in seconds
    pub timestamp: i64,
    /// Headers sent alongside the event so the collector sees the visitor,
    /// not the proxy.
    #[serde(skip)]
    pub headers: HeaderMap,
}

/// Body of `POST /api/send`.
#[derive(Debug, Serialize)]
pub struct SendBody<'a> {
    pub payload: &'a Event,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl<'a> SendBody<'a> {
    pub fn event(payload: &'a Event) -> Self {
        Self {
            payload,
            kind: "event",
        }
    }
}
