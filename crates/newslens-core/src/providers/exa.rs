use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{SearchProvider, endpoint};
use crate::error::ProviderError;
use crate::search::SearchSource;
use crate::security::SecretValue;

const SNIPPET_CHARS: usize = 160;

/// Exa neural search.
pub struct ExaSearch {
    http: reqwest::Client,
    url: String,
    api_key: SecretValue,
    timeout: Duration,
}

impl ExaSearch {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        api_key: SecretValue,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            url: endpoint(base_url, "search"),
            api_key,
            timeout,
        }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<ExaResult>,
}

#[derive(Deserialize)]
struct ExaResult {
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    highlights: Vec<String>,
    #[serde(default)]
    text: Option<String>,
}

impl From<ExaResult> for SearchSource {
    fn from(result: ExaResult) -> Self {
        let snippet = result
            .highlights
            .into_iter()
            .find(|h| !h.trim().is_empty())
            .or_else(|| {
                result
                    .text
                    .map(|text| text.chars().take(SNIPPET_CHARS).collect::<String>())
            })
            .filter(|s| !s.trim().is_empty());
        SearchSource {
            url: result.url,
            title: result.title.filter(|t| !t.trim().is_empty()),
            snippet,
        }
    }
}

#[async_trait]
impl SearchProvider for ExaSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchSource>, ProviderError> {
        let response = self
            .http
            .post(&self.url)
            .header("x-api-key", self.api_key.expose())
            .timeout(self.timeout)
            .json(&json!({
                "query": query,
                "numResults": limit,
                "contents": {
                    "highlights": {"numSentences": 2, "highlightsPerUrl": 1},
                    "text": {"maxCharacters": SNIPPET_CHARS * 2},
                },
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::status("exa", status.as_u16(), body));
        }

        let payload: SearchResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::Decode(format!("exa payload: {err}")))?;

        Ok(payload
            .results
            .into_iter()
            .take(limit)
            .map(SearchSource::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn maps_results_and_prefers_highlights() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("x-api-key", "exa-key"))
            .and(body_partial_json(json!({"query": "who fired first", "numResults": 2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"url": "https://a.example", "title": "A", "highlights": ["key sentence"], "text": "long text"},
                    {"url": "https://b.example", "title": "", "text": "x".repeat(400)},
                    {"url": "https://c.example"}
                ]
            })))
            .mount(&server)
            .await;

        let exa = ExaSearch::new(
            reqwest::Client::new(),
            &server.uri(),
            SecretValue::new("exa-key"),
            Duration::from_secs(5),
        );
        let sources = exa.search("who fired first", 2).await.unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].snippet.as_deref(), Some("key sentence"));
        assert_eq!(sources[1].title, None);
        assert_eq!(sources[1].snippet.as_ref().map(|s| s.len()), Some(SNIPPET_CHARS));
    }

    #[tokio::test]
    async fn status_errors_propagate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let exa = ExaSearch::new(
            reqwest::Client::new(),
            &server.uri(),
            SecretValue::new("nope"),
            Duration::from_secs(5),
        );
        let err = exa.search("q", 3).await.unwrap_err();
        assert!(matches!(err, ProviderError::Status { status: 401, .. }));
    }

    #[tokio::test]
    async fn slow_responses_hit_the_request_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"results": []}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let exa = ExaSearch::new(
            reqwest::Client::new(),
            &server.uri(),
            SecretValue::new("exa-key"),
            Duration::from_millis(100),
        );
        let err = exa.search("q", 3).await.unwrap_err();
        assert!(matches!(err, ProviderError::Http(ref e) if e.is_timeout()));
    }
}
