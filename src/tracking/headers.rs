use axum::http::{header::HeaderName, HeaderMap, HeaderValue};

use super::request::RequestView;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
const X_FORWARDED_PORT: HeaderName = HeaderName::from_static("x-forwarded-port");
const X_FORWARDED_URI: HeaderName = HeaderName::from_static("x-forwarded-uri");
const X_FORWARDED_METHOD: HeaderName = HeaderName::from_static("x-forwarded-method");

/// Build the header block sent with an event submission: the allow-listed
/// inbound headers followed by the synthesized `X-Forwarded-*` set.
pub fn forwarded_headers(request: &RequestView<'_>, allow_list: &[String]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    copy_headers(&mut headers, request.headers, allow_list);
    write_x_forwarded_headers(&mut headers, request);
    headers
}

/// Copy every value of each allow-listed header. Unknown or invalid names are skipped.
pub fn copy_headers(dst: &mut HeaderMap, src: &HeaderMap, allow_list: &[String]) {
    for name in allow_list {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };

        for value in src.get_all(&name) {
            dst.append(name.clone(), value.clone());
        }
    }
}

pub fn write_x_forwarded_headers(dst: &mut HeaderMap, request: &RequestView<'_>) {
    let src = request.headers;

    if let Some(peer) = request.peer {
        let client_ip = peer.ip().to_string();
        let mut chain: Vec<&str> = src
            .get_all(&X_FORWARDED_FOR)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        chain.push(&client_ip);
        set_or_remove(dst, X_FORWARDED_FOR, Some(&chain.join(", ")));
    }

    let method = first_non_empty(src, &X_FORWARDED_METHOD).or(Some(request.method.as_str()));
    set_or_remove(dst, X_FORWARDED_METHOD, method);

    let proto = first_non_empty(src, &X_FORWARDED_PROTO)
        .unwrap_or(if request.is_tls() { "https" } else { "http" });
    set_or_remove(dst, X_FORWARDED_PROTO, Some(proto));

    if let Some(port) = first_non_empty(src, &X_FORWARDED_PORT) {
        set_or_remove(dst, X_FORWARDED_PORT, Some(port));
    }

    let host = first_non_empty(src, &X_FORWARDED_HOST).or_else(|| non_empty(request.host()));
    set_or_remove(dst, X_FORWARDED_HOST, host);

    let uri = first_non_empty(src, &X_FORWARDED_URI).or_else(|| non_empty(request.url()));
    set_or_remove(dst, X_FORWARDED_URI, uri);
}

fn set_or_remove(dst: &mut HeaderMap, name: HeaderName, value: Option<&str>) {
    match value.and_then(|v| HeaderValue::from_str(v).ok()) {
        Some(value) => {
            dst.insert(name, value);
        }
        None => {
            dst.remove(name);
        }
    }
}

fn first_non_empty<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(non_empty)
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
