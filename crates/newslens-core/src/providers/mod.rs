//! Narrow interfaces to the external collaborators and their HTTP adapters.
//!
//! The orchestrator only ever sees the traits below. Concrete clients are
//! constructed once by the caller (see [`Providers::from_config`]) and shared
//! by every run and every agent task.

mod anthropic;
mod exa;
mod firecrawl;
mod markdowner;
mod openai;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::config::{Config, FetchBackend};
use crate::error::ProviderError;
use crate::search::SearchSource;

pub use anthropic::AnthropicStructuredGenerator;
pub use exa::ExaSearch;
pub use firecrawl::FirecrawlFetcher;
pub use markdowner::MarkdownerFetcher;
pub use openai::OpenAiCompatGenerator;

/// Lazy, finite, non-restartable sequence of text fragments.
pub type TextStream = BoxStream<'static, Result<String, ProviderError>>;

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Markdown text of the page at `url`.
    async fn fetch(&self, url: &str) -> Result<String, ProviderError>;

    /// Label reported in `article`/`articleError` events.
    fn source_name(&self) -> &'static str;
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn stream(&self, system: &str, prompt: &str) -> Result<TextStream, ProviderError>;

    /// Non-streaming convenience built on [`TextGenerator::stream`].
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ProviderError> {
        let mut stream = self.stream(system, prompt).await?;
        let mut text = String::new();
        while let Some(fragment) = stream.next().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }

    fn model_name(&self) -> &str;
}

#[async_trait]
pub trait StructuredGenerator: Send + Sync {
    /// Object produced against `schema`. Validation is the caller's job.
    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        schema: &Value,
    ) -> Result<Value, ProviderError>;
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchSource>, ProviderError>;
}

/// Which upstream credentials were present when the providers were built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Credentials {
    pub generation: bool,
    pub search: bool,
    pub fetch: bool,
    pub synthesis: bool,
}

/// Provider handles injected into the orchestrator.
#[derive(Clone)]
pub struct Providers {
    pub fetcher: Arc<dyn ContentFetcher>,
    pub generator: Arc<dyn TextGenerator>,
    pub structured: Arc<dyn StructuredGenerator>,
    pub search: Option<Arc<dyn SearchProvider>>,
    pub credentials: Credentials,
}

impl Providers {
    /// Production provider set. Fetch and search share one HTTP client.
    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("newslens/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(15))
            .build()?;

        let fetch_timeout = Duration::from_secs(config.fetch.timeout_secs.max(1));
        let (fetcher, fetch_ready): (Arc<dyn ContentFetcher>, bool) = match config.fetch.backend {
            FetchBackend::Firecrawl => {
                let key = config.fetch.api_key();
                let ready = key.is_some();
                (
                    Arc::new(FirecrawlFetcher::new(
                        http.clone(),
                        &config.fetch.firecrawl_url,
                        key,
                        &config.fetch.api_key_env,
                        fetch_timeout,
                    )),
                    ready,
                )
            }
            FetchBackend::Markdowner => (
                Arc::new(MarkdownerFetcher::new(
                    http.clone(),
                    &config.fetch.markdowner_url,
                    fetch_timeout,
                )),
                true,
            ),
        };

        let generation_key = config.generation.api_key();
        let synthesis_key = config.synthesis.api_key();
        let search_key = config.search.api_key();

        let credentials = Credentials {
            generation: generation_key.is_some(),
            search: search_key.is_some(),
            fetch: fetch_ready,
            synthesis: synthesis_key.is_some(),
        };

        let generator = Arc::new(OpenAiCompatGenerator::new(
            &config.generation.base_url,
            &config.generation.model,
            generation_key,
            &config.generation.api_key_env,
        ));

        let structured = Arc::new(AnthropicStructuredGenerator::new(
            &config.synthesis.model,
            synthesis_key,
            &config.synthesis.api_key_env,
            config.synthesis.max_tokens,
        ));

        let search = search_key.map(|key| {
            Arc::new(ExaSearch::new(
                http.clone(),
                &config.search.base_url,
                key,
                Duration::from_secs(config.search.timeout_secs.max(1)),
            ))
                as Arc<dyn SearchProvider>
        });

        Ok(Self {
            fetcher,
            generator,
            structured,
            search,
            credentials,
        })
    }
}

/// Join a base URL and a path without doubling slashes.
fn endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_cleanly() {
        assert_eq!(
            endpoint("https://api.exa.ai/", "/search"),
            "https://api.exa.ai/search"
        );
        assert_eq!(
            endpoint("https://api.cerebras.ai/v1", "chat/completions"),
            "https://api.cerebras.ai/v1/chat/completions"
        );
    }

    #[test]
    fn markdowner_backend_counts_as_ready_without_keys() {
        let mut config = Config::default();
        config.fetch.backend = FetchBackend::Markdowner;
        config.fetch.api_key_env = "NEWSLENS_TEST_UNSET_FETCH_KEY".into();
        config.generation.api_key_env = "NEWSLENS_TEST_UNSET_GEN_KEY".into();
        config.synthesis.api_key_env = "NEWSLENS_TEST_UNSET_SYN_KEY".into();
        config.search.api_key_env = "NEWSLENS_TEST_UNSET_SEARCH_KEY".into();

        let providers = Providers::from_config(&config).expect("client builds");
        assert!(providers.credentials.fetch);
        assert!(!providers.credentials.generation);
        assert!(providers.search.is_none());
        assert_eq!(providers.fetcher.source_name(), "markdowner");
    }
}
