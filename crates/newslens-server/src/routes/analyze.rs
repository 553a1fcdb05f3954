use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::header,
    response::{
        IntoResponse,
        sse::{KeepAlive, Sse},
    },
    routing::post,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::AppError;
use crate::state::AppState;

/// Request body. Every field is optional and malformed input falls back to defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeBody {
    #[serde(default)]
    pub url: Option<Value>,
    #[serde(default)]
    pub reading_level: Option<Value>,
}

impl AnalyzeBody {
    pub fn parse(raw: &[u8]) -> Self {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Self::default();
        }
        serde_json::from_slice(raw).unwrap_or_else(|err| {
            debug!(error = %err, "unparseable analyze body; using defaults");
            Self::default()
        })
    }

    fn url(&self) -> Option<String> {
        self.url.as_ref().and_then(Value::as_str).map(str::to_string)
    }

    fn reading_level(&self) -> Option<&str> {
        self.reading_level.as_ref().and_then(Value::as_str)
    }
}

pub fn analyze_router() -> Router<AppState> {
    Router::new().route("/analyze/stream", post(analyze_stream))
}

#[instrument(skip_all)]
async fn analyze_stream(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let body = AnalyzeBody::parse(&body);
    let service = state.run_service();
    let request = service.request_from_wire(body.url(), body.reading_level());
    let stream = service.start(request)?;

    Ok((
        [(header::CACHE_CONTROL, "no-cache, no-transform")],
        Sse::new(stream).keep_alive(KeepAlive::new()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_parsing_is_lenient() {
        let body = AnalyzeBody::parse(br#"{"url": "https://a.example", "readingLevel": "simple"}"#);
        assert_eq!(body.url().as_deref(), Some("https://a.example"));
        assert_eq!(body.reading_level(), Some("simple"));

        let wrong_types = AnalyzeBody::parse(br#"{"url": 42, "readingLevel": ["simple"]}"#);
        assert_eq!(wrong_types.url(), None);
        assert_eq!(wrong_types.reading_level(), None);

        let garbage = AnalyzeBody::parse(b"{not json");
        assert!(garbage.url().is_none());
        assert!(AnalyzeBody::parse(b"  ").url.is_none());
    }
}
