//! NewsLens core: streaming multi-agent trust analysis of news articles.
//!
//! An [`Orchestrator`] fetches one article, runs every agent of the
//! [`AgentRegistry`] concurrently against it, and merges their markdown into a
//! structured [`TrustVerdict`]. Progress is reported as a single ordered
//! stream of [`Event`]s suitable for Server-Sent Events.

pub mod agent;
pub mod config;
pub mod envelope;
mod error;
pub mod events;
pub mod metrics;
pub mod orchestrator;
pub mod providers;
pub mod query;
pub mod registry;
pub mod search;
mod security;
pub mod synthesizer;
pub mod telemetry;

pub use agent::{AgentContext, AgentOutcome, AgentRun, AgentStatus, run_agent};
pub use config::{AnalysisSettings, Config, ConfigLoader, FetchBackend};
pub use envelope::{final_markdown, try_extract_payload};
pub use error::{ChannelClosed, FetchError, NewsLensError, ProviderError, SynthesisError, TaskError};
pub use events::{Event, EventLog, EventReceiver, EventSink};
pub use orchestrator::{ABORT_ARTICLE_FETCH_FAILED, AnalysisRequest, Orchestrator, RunReport};
pub use providers::{
    ContentFetcher, Credentials, Providers, SearchProvider, StructuredGenerator, TextGenerator,
    TextStream,
};
pub use query::{QueryExtractor, heuristic_queries, normalize_queries, parse_query_list};
pub use registry::{AgentRegistry, AgentSpec, DEFAULT_ARTICLE_URL, ReadingLevel};
pub use search::{SearchAdapter, SearchResultBundle, SearchSource};
pub use security::{SecretValue, optional_env, redact_secrets, require_env};
pub use synthesizer::{
    AgentOutput, Synthesizer, TrustLevel, TrustVerdict, validate_verdict, verdict_schema,
};
pub use telemetry::{TelemetryOptions, init_telemetry};
