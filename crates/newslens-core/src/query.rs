//! Fact-check query derivation from article text.

use std::collections::HashSet;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::providers::TextGenerator;

const MAX_HEURISTIC_CHARS: usize = 120;

static QUERIES_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<queries\b[^>]*>(.*?)</queries>").expect("invalid queries regex"));
static QUERY_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<q\b[^>]*>(.*?)</q>").expect("invalid q regex"));
static TRIGGER_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(verify|unclear|claim|allege|according)\b").expect("invalid trigger regex")
});

const QUERY_SYSTEM: &str = "You are a news fact extraction assistant.";

/// Lenient parse of `<queries><q>..</q></queries>` output.
///
/// Prose around the block, a missing wrapper, CDATA sections and the common
/// XML entities are all tolerated.
pub fn parse_query_list(text: &str) -> Vec<String> {
    let scope = QUERIES_BLOCK
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text);

    QUERY_ITEM
        .captures_iter(scope)
        .filter_map(|caps| caps.get(1))
        .map(|m| unescape_xml(strip_cdata(m.as_str())))
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect()
}

/// Strip wrapping quotes, trim, lower-case, dedupe and cap.
pub fn normalize_queries<I, S>(raw: I, max: usize) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut queries = Vec::new();
    for candidate in raw {
        if queries.len() >= max {
            break;
        }
        let cleaned = candidate
            .as_ref()
            .trim()
            .trim_matches(|c| matches!(c, '"' | '\'' | '`'))
            .trim()
            .to_lowercase();
        if cleaned.is_empty() {
            continue;
        }
        if seen.insert(cleaned.clone()) {
            queries.push(cleaned);
        }
    }
    queries
}

/// Deterministic fallback: lines carrying claim/verification vocabulary.
pub fn heuristic_queries(text: &str, max: usize) -> Vec<String> {
    let candidates = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| TRIGGER_WORDS.is_match(line))
        .map(|line| {
            let stripped: String = line
                .chars()
                .filter(|c| !matches!(c, '*' | '`' | '>' | '#' | '_' | '-'))
                .collect();
            stripped.trim().chars().take(MAX_HEURISTIC_CHARS).collect::<String>()
        });
    normalize_queries(candidates, max)
}

/// Produces up to `max` short fact-check queries for an article.
#[derive(Clone)]
pub struct QueryExtractor {
    generator: Option<Arc<dyn TextGenerator>>,
    article_chars: usize,
}

impl QueryExtractor {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>, article_chars: usize) -> Self {
        Self {
            generator,
            article_chars,
        }
    }

    /// Heuristic-only extractor.
    pub fn heuristic() -> Self {
        Self::new(None, 0)
    }

    pub async fn extract(&self, article: &str, max: usize) -> Vec<String> {
        if max == 0 {
            return Vec::new();
        }

        if let Some(generator) = self.generator.as_ref() {
            let prompt = self.prompt(article, max);
            match generator.complete(QUERY_SYSTEM, &prompt).await {
                Ok(text) => {
                    let queries = normalize_queries(parse_query_list(&text), max);
                    if !queries.is_empty() {
                        debug!(count = queries.len(), "generated fact-check queries");
                        return queries;
                    }
                    debug!("query generation yielded nothing usable; using heuristic");
                }
                Err(err) => {
                    warn!(error = %err, "query generation failed; using heuristic");
                }
            }
        }

        heuristic_queries(article, max)
    }

    fn prompt(&self, article: &str, max: usize) -> String {
        let excerpt: String = article.chars().take(self.article_chars).collect();
        format!(
            "Given the article markdown below, output ONLY XML of the form <queries><q>query 1</q><q>query 2</q></queries> with up to {max} short DISTINCT fact-check queries (5-10 words each).\n\
             Rules:\n\
             - Output ONLY the XML. No commentary.\n\
             - Each <q> must be unique and concise.\n\
             ---ARTICLE START---\n{excerpt}\n---ARTICLE END---"
        )
    }
}

fn strip_cdata(value: &str) -> &str {
    let trimmed = value.trim();
    trimmed
        .strip_prefix("<![CDATA[")
        .and_then(|inner| inner.strip_suffix("]]>"))
        .unwrap_or(trimmed)
}

pub(crate) fn unescape_xml(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::providers::TextStream;
    use async_trait::async_trait;
    use futures::stream;

    struct CannedGenerator(Result<String, ()>);

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        async fn stream(&self, _system: &str, _prompt: &str) -> Result<TextStream, ProviderError> {
            match &self.0 {
                Ok(text) => Ok(Box::pin(stream::iter(vec![Ok(text.clone())]))),
                Err(()) => Err(ProviderError::Stream("offline".into())),
            }
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    const ARTICLE: &str = "# Breaking\n\
        Police claim the suspect fled north.\n\
        - Witnesses **allege** a second shooter\n\
        Weather was mild.\n\
        According to officials, 3 people were hurt.\n\
        It is unclear who called first.";

    #[test]
    fn parses_wrapped_and_unwrapped_lists() {
        let text = "Sure! <queries>\n<q>first query</q><q> <![CDATA[second &amp; more]]> </q></queries> done";
        assert_eq!(parse_query_list(text), vec!["first query", "second & more"]);
        assert_eq!(parse_query_list("<q>lonely</q>"), vec!["lonely"]);
        assert!(parse_query_list("no xml at all").is_empty());
    }

    #[test]
    fn normalization_dedupes_case_insensitively_and_caps() {
        let raw = vec!["\"Who Fired\"", "who fired", "  `When`  ", "", "where", "why"];
        assert_eq!(normalize_queries(raw, 3), vec!["who fired", "when", "where"]);
    }

    #[test]
    fn heuristic_picks_trigger_lines_and_is_deterministic() {
        let first = heuristic_queries(ARTICLE, 3);
        let second = heuristic_queries(ARTICLE, 3);
        assert_eq!(first, second);
        assert_eq!(
            first,
            vec![
                "police claim the suspect fled north.",
                "witnesses allege a second shooter",
                "according to officials, 3 people were hurt.",
            ]
        );
    }

    #[test]
    fn heuristic_truncates_long_lines() {
        let line = format!("claim {}", "x".repeat(300));
        let queries = heuristic_queries(&line, 3);
        assert_eq!(queries[0].chars().count(), MAX_HEURISTIC_CHARS);
    }

    #[test]
    fn heuristic_yields_nothing_without_triggers() {
        assert!(heuristic_queries("plain text\nno triggers here", 3).is_empty());
    }

    #[tokio::test]
    async fn generated_queries_win_when_usable() {
        let extractor = QueryExtractor::new(
            Some(Arc::new(CannedGenerator(Ok(
                "<queries><q>A</q><q>a</q><q>B</q><q>C</q><q>D</q></queries>".into(),
            )))),
            8_000,
        );
        assert_eq!(extractor.extract(ARTICLE, 3).await, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn falls_back_when_generation_is_unusable_or_fails() {
        let garbage = QueryExtractor::new(
            Some(Arc::new(CannedGenerator(Ok("I cannot help with that".into())))),
            8_000,
        );
        assert_eq!(garbage.extract(ARTICLE, 2).await, heuristic_queries(ARTICLE, 2));

        let failing = QueryExtractor::new(Some(Arc::new(CannedGenerator(Err(())))), 8_000);
        assert_eq!(failing.extract(ARTICLE, 3).await, heuristic_queries(ARTICLE, 3));

        assert_eq!(
            QueryExtractor::heuristic().extract(ARTICLE, 3).await,
            heuristic_queries(ARTICLE, 3)
        );
    }
}
