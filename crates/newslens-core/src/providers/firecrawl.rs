use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{ContentFetcher, endpoint};
use crate::error::ProviderError;
use crate::security::SecretValue;

/// Firecrawl scrape endpoint returning page markdown.
pub struct FirecrawlFetcher {
    http: reqwest::Client,
    url: String,
    api_key: Option<SecretValue>,
    api_key_env: String,
    timeout: Duration,
}

impl FirecrawlFetcher {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        api_key: Option<SecretValue>,
        api_key_env: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            url: endpoint(base_url, "v1/scrape"),
            api_key,
            api_key_env: api_key_env.to_string(),
            timeout,
        }
    }
}

#[derive(Deserialize)]
struct ScrapeResponse {
    #[serde(default)]
    data: Option<ScrapeData>,
}

#[derive(Deserialize)]
struct ScrapeData {
    #[serde(default)]
    markdown: Option<String>,
}

#[async_trait]
impl ContentFetcher for FirecrawlFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ProviderError> {
        let key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ProviderError::NotConfigured(self.api_key_env.clone()))?;

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(key.expose())
            .timeout(self.timeout)
            .json(&json!({ "url": url, "formats": ["markdown"] }))
            .send()
            .await?;

        let status = response.status();
        if is_blocked(status) {
            return Err(ProviderError::NotFoundOrBlocked(format!(
                "{url} (status {})",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::status("firecrawl", status.as_u16(), body));
        }

        let payload: ScrapeResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::Decode(format!("firecrawl payload: {err}")))?;

        let markdown = payload
            .data
            .and_then(|data| data.markdown)
            .filter(|markdown| !markdown.trim().is_empty())
            .ok_or_else(|| ProviderError::Decode("firecrawl returned no markdown".into()))?;

        debug!(%url, bytes = markdown.len(), "firecrawl scrape succeeded");
        Ok(markdown)
    }

    fn source_name(&self) -> &'static str {
        "firecrawl"
    }
}

pub(super) fn is_blocked(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::FORBIDDEN
            | StatusCode::NOT_FOUND
            | StatusCode::GONE
            | StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS
    )
}
