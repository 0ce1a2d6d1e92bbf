use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{redirect, Client};

use super::{ProxyRoute, RequestExecutor, RequestOptions};
use crate::error::ExecutionError;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub timeout: Duration,
    pub expect_status: u16,
    /// Text the page body must contain for the visit to count.
    pub expect_text: Option<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            expect_status: 200,
            expect_text: Some("Destination".into()),
        }
    }
}

/// Visits the target the way a desktop Chrome would at the HTTP layer.
///
/// Every attempt gets a fresh client, so cookies and connections never leak
/// between visits, the same isolation a new browser context gives.
pub struct BrowserExecutor {
    settings: BrowserSettings,
    headers: HeaderMap,
}

impl BrowserExecutor {
    pub fn new(settings: BrowserSettings) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));

        Self { settings, headers }
    }

    fn new_context(&self, route: Option<ProxyRoute<'_>>) -> Result<Client, ExecutionError> {
        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(self.headers.clone())
            .cookie_store(true)
            .danger_accept_invalid_certs(true)
            .redirect(redirect::Policy::limited(10))
            .timeout(self.settings.timeout)
            .no_proxy();
        if let Some(route) = route {
            builder = builder.proxy(route.to_reqwest()?);
        }
        Ok(builder.build()?)
    }
}

#[async_trait]
impl RequestExecutor for BrowserExecutor {
    async fn execute(
        &self,
        target: &str,
        options: &RequestOptions,
        sequence: u64,
    ) -> Result<u16, ExecutionError> {
        let route = options.proxy_for(sequence);
        let client = self.new_context(route)?;
        let response = client.get(target).send().await?;
        let status = response.status().as_u16();
        if status != self.settings.expect_status {
            return Err(ExecutionError::Status(status));
        }

        let page = response.text().await?;
        if let Some(expected) = &self.settings.expect_text {
            if !page.contains(expected.as_str()) {
                return Err(ExecutionError::ContentMismatch(expected.clone()));
            }
        }

        tracing::debug!(
            sequence,
            status,
            via = route.map_or("direct", |r| r.url),
            "page loaded"
        );
        Ok(status)
    }
}
