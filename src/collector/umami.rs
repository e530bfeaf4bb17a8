use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::trait_def::{Collector, CollectorError, CollectorResult};
use crate::models::{
    AuthRequest, AuthResponse, CreateWebsiteRequest, Event, SendBody, Website, WebsitesPage,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const WEBSITES_PAGE_SIZE: u32 = 200;

/// HTTP client for the Umami API
#[derive(Clone)]
pub struct UmamiClient {
    host: String,
    client: Client,
}

impl UmamiClient {
    pub fn new(host: &str) -> CollectorResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("umami-feeder/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(CollectorError::Client)?;

        Ok(Self {
            host: host.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }

    /// Send the request and reject anything outside 2xx.
    async fn execute(request: RequestBuilder) -> CollectorResult<reqwest::Response> {
        let response = request.send().await.map_err(CollectorError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollectorError::Status(status));
        }

        Ok(response)
    }

    async fn execute_and_parse<T: DeserializeOwned>(request: RequestBuilder) -> CollectorResult<T> {
        let response = Self::execute(request).await?;
        let body = response.bytes().await.map_err(CollectorError::Transport)?;
        serde_json::from_slice(&body).map_err(CollectorError::Decode)
    }
}

#[async_trait]
impl Collector for UmamiClient {
    async fn authenticate(&self, username: &str, password: &str) -> CollectorResult<String> {
        let request = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&AuthRequest { username, password });

        let response: AuthResponse = Self::execute_and_parse(request).await?;
        Ok(response.token)
    }

    async fn list_websites(
        &self,
        token: &str,
        team_id: Option<&str>,
    ) -> CollectorResult<Vec<Website>> {
        let path = match team_id {
            Some(team_id) => format!("/api/teams/{team_id}/websites?pageSize={WEBSITES_PAGE_SIZE}"),
            None => format!("/api/websites?pageSize={WEBSITES_PAGE_SIZE}"),
        };

        let request = self.client.get(self.url(&path)).bearer_auth(token);
        let page: WebsitesPage = Self::execute_and_parse(request).await?;
        debug!(count = page.data.len(), total = page.count, "fetched websites");

        Ok(page.data)
    }

    async fn create_website(
        &self,
        token: &str,
        domain: &str,
        team_id: Option<&str>,
    ) -> CollectorResult<Website> {
        let request = self
            .client
            .post(self.url("/api/websites"))
            .bearer_auth(token)
            .json(&CreateWebsiteRequest {
                name: domain,
                domain,
                team_id,
            });

        Self::execute_and_parse(request).await
    }

    async fn send_event(&self, token: Option<&str>, event: &Event) -> CollectorResult<()> {
        let mut request = self
            .client
            .post(self.url("/api/send"))
            .headers(event.headers.clone());
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        Self::execute(request.json(&SendBody::event(event))).await?;
        Ok(())
    }
}
