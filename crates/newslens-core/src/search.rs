//! Batch search over an optional external index.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::providers::SearchProvider;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSource {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// Results of one query, capped and immutable once returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultBundle {
    pub query: String,
    pub sources: Vec<SearchSource>,
}

/// Runs a batch of queries; individual failures are dropped, never fatal.
#[derive(Clone)]
pub struct SearchAdapter {
    provider: Option<Arc<dyn SearchProvider>>,
    max_results: usize,
}

impl SearchAdapter {
    pub fn new(provider: Option<Arc<dyn SearchProvider>>, max_results: usize) -> Self {
        Self {
            provider,
            max_results: max_results.max(1),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, 1)
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// One bundle per query that succeeded, in input order.
    pub async fn search(&self, queries: &[String]) -> Vec<SearchResultBundle> {
        let Some(provider) = self.provider.as_ref() else {
            return Vec::new();
        };
        if queries.is_empty() {
            return Vec::new();
        }

        let limit = self.max_results;
        let lookups = queries.iter().map(|query| {
            let provider = provider.clone();
            async move {
                match provider.search(query, limit).await {
                    Ok(mut sources) => {
                        sources.truncate(limit);
                        debug!(%query, results = sources.len(), "search query completed");
                        Some(SearchResultBundle {
                            query: query.clone(),
                            sources,
                        })
                    }
                    Err(err) => {
                        warn!(%query, error = %err, "search query failed; omitting");
                        None
                    }
                }
            }
        });

        join_all(lookups).await.into_iter().flatten().collect()
    }
}

/// Evidence block embedded in agent prompts.
pub fn render_search_context(bundles: &[SearchResultBundle]) -> String {
    if bundles.iter().all(|bundle| bundle.sources.is_empty()) {
        return "<search />".to_string();
    }

    bundles
        .iter()
        .filter(|bundle| !bundle.sources.is_empty())
        .map(|bundle| {
            let sources = bundle
                .sources
                .iter()
                .map(|source| {
                    format!(
                        "<source url=\"{}\"><![CDATA[{}\n{}]]></source>",
                        escape_attr(&source.url),
                        cdata_safe(source.title.as_deref().unwrap_or_default()),
                        cdata_safe(source.snippet.as_deref().unwrap_or_default()),
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "\n<search query=\"{}\">\n{}\n</search>",
                escape_attr(&bundle.query),
                sources
            )
        })
        .collect()
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

fn cdata_safe(value: &str) -> String {
    value.replace("]]>", "]]&gt;")
}
