use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::ContentFetcher;
use super::firecrawl::is_blocked;
use crate::error::ProviderError;

/// Keyless markdown conversion service (`GET <base>?url=<target>`).
pub struct MarkdownerFetcher {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl MarkdownerFetcher {
    pub fn new(http: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            http,
            base_url: base_url.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl ContentFetcher for MarkdownerFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ProviderError> {
        let response = self
            .http
            .get(&self.base_url)
            .query(&[("url", url)])
            .timeout(self.timeout)
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
            return Err(ProviderError::status("markdowner", status.as_u16(), body));
        }

        let markdown = response.text().await?;
        if markdown.trim().is_empty() {
            return Err(ProviderError::Decode("markdowner returned an empty page".into()));
        }
        debug!(%url, bytes = markdown.len(), "markdowner fetch succeeded");
        Ok(markdown)
    }

    fn source_name(&self) -> &'static str {
        "markdowner"
    }
}
