use std::{fmt, path::PathBuf};

use thiserror::Error;

/// Core error type for NewsLens configuration and setup.
#[derive(Debug, Error)]
pub enum NewsLensError {
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("missing environment variable: {0}")]
    MissingSecret(String),
    #[error("I/O error while reading {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NewsLensError {
    pub fn config_io(path: PathBuf, source: std::io::Error) -> Self {
        Self::ConfigIo { path, source }
    }
}

/// Failure reported by an external collaborator (fetcher, generator, search index).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("missing credentials: {0} is not set")]
    NotConfigured(String),
    #[error("page not found or blocked: {0}")]
    NotFoundOrBlocked(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{provider} returned status {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("{provider} request failed: {message}")]
    Upstream {
        provider: &'static str,
        message: String,
    },
    #[error("stream error: {0}")]
    Stream(String),
}

impl ProviderError {
    /// Failure reported by an SDK client before any output arrived.
    pub fn upstream(provider: &'static str, err: impl fmt::Display) -> Self {
        Self::Upstream {
            provider,
            message: err.to_string(),
        }
    }

    pub fn status(provider: &'static str, status: u16, body: impl Into<String>) -> Self {
        let mut body = body.into();
        if body.len() > 200 {
            let cut = (0..=200)
                .rev()
                .find(|idx| body.is_char_boundary(*idx))
                .unwrap_or(0);
            body.truncate(cut);
        }
        Self::Status {
            provider,
            status,
            body,
        }
    }
}

/// Content fetch failure. The only error that aborts a whole run.
#[derive(Debug, Error)]
#[error("article fetch failed for {url}: {source}")]
pub struct FetchError {
    pub url: String,
    #[source]
    pub source: ProviderError,
}

/// Failure isolated to a single agent task.
#[derive(Debug, Clone)]
pub struct TaskError {
    pub agent: String,
    pub reason: String,
}

impl TaskError {
    pub fn new(agent: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent {} failed: {}", self.agent, self.reason)
    }
}

impl std::error::Error for TaskError {}

/// Verdict generation or validation failure. Reported, never fatal to the run.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("synthesis provider failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("verdict failed schema validation: {0}")]
    SchemaViolation(String),
    #[error("synthesis timed out after {0}s")]
    TimedOut(u64),
}

/// The consumer of the event channel went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("event channel closed by consumer")]
pub struct ChannelClosed;
