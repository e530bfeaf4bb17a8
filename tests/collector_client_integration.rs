//! Umami client tests against a mock collector

use axum::http::{HeaderMap, HeaderValue, StatusCode};
use serde_json::json;
use umami_feeder::collector::{Collector, CollectorError, UmamiClient};
use umami_feeder::Event;
use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client(server: &MockServer) -> UmamiClient {
    UmamiClient::new(&server.uri()).unwrap()
}

#[tokio::test]
async fn test_authenticate_returns_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({"username": "admin", "password": "umami"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "abc", "user": {}})))
        .expect(1)
        .mount(&server)
        .await;

    let token = client(&server).await.authenticate("admin", "umami").await.unwrap();
    assert_eq!(token, "abc");
}

#[tokio::test]
async fn test_non_success_status_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client(&server)
        .await
        .authenticate("admin", "wrong")
        .await
        .unwrap_err();
    assert!(matches!(err, CollectorError::Status(StatusCode::UNAUTHORIZED)));
}

#[tokio::test]
async fn test_invalid_json_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/websites"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let err = client(&server)
        .await
        .list_websites("token", None)
        .await
        .unwrap_err();
    assert!(matches!(err, CollectorError::Decode(_)));
}

#[tokio::test]
async fn test_transport_failure_is_transport_error() {
    // Nothing listens on the discard port
    let client = UmamiClient::new("http://127.0.0.1:9").unwrap();
    let err = client.authenticate("a", "b").await.unwrap_err();
    assert!(matches!(err, CollectorError::Transport(_)));
}

#[tokio::test]
async fn test_list_websites_with_and_without_team() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/websites"))
        .and(query_param("pageSize", "200"))
        .and(header("authorization", "Bearer token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "w1", "name": "Shop", "domain": "shop.example.com"}],
            "count": 1, "page": 1, "pageSize": 200
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/teams/team-7/websites"))
        .and(query_param("pageSize", "200"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "w2", "name": "Blog", "domain": "blog.example.com"}],
            "count": 1, "page": 1, "pageSize": 200
        })))
        .mount(&server)
        .await;

    let client = client(&server).await;

    let all = client.list_websites("token", None).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, "w1");
    assert_eq!(all[0].domain, "shop.example.com");

    let team = client.list_websites("token", Some("team-7")).await.unwrap();
    assert_eq!(team[0].domain, "blog.example.com");
}

#[tokio::test]
async fn test_create_website_sends_team() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/websites"))
        .and(header("authorization", "Bearer token"))
        .and(body_json(json!({
            "name": "new.example.com",
            "domain": "new.example.com",
            "teamId": "team-7"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "w3", "name": "new.example.com", "domain": "new.example.com"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let website = client(&server)
        .await
        .create_website("token", "new.example.com", Some("team-7"))
        .await
        .unwrap();
    assert_eq!(website.id, "w3");
}

#[tokio::test]
async fn test_send_event_forwards_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/send"))
        .and(header("user-agent", "Mozilla/5.0 (visitor)"))
        .and(header("x-forwarded-for", "203.0.113.9"))
        .and(header("authorization", "Bearer token"))
        .and(body_partial_json(json!({
            "type": "event",
            "payload": {"website": "site-123", "hostname": "shop.example.com", "url": "/"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let mut headers = HeaderMap::new();
    headers.insert("user-agent", HeaderValue::from_static("Mozilla/5.0 (visitor)"));
    headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));
    let event = Event {
        website: "site-123".to_string(),
        hostname: "shop.example.com".to_string(),
        url: "/".to_string(),
        timestamp: 1_700_000_000,
        headers,
        ..Event::default()
    };

    client(&server)
        .await
        .send_event(Some("token"), &event)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_send_event_without_token_has_no_authorization() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/send"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let event = Event {
        website: "site-123".to_string(),
        ..Event::default()
    };
    client(&server).await.send_event(None, &event).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get("authorization").is_none());
}
