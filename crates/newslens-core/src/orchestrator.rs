//! Streaming orchestration of one analysis run.
//!
//! Fetches the article once, fans it out to every registered agent as an
//! independent tokio task, waits for all of them to settle, then asks the
//! synthesizer for a verdict. Every step is reported on the run's
//! [`EventSink`]; only a failed article fetch ends the run early.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::agent::{AgentContext, AgentOutcome, run_agent};
use crate::config::AnalysisSettings;
use crate::error::{FetchError, TaskError};
use crate::events::{Event, EventReceiver, EventSink};
use crate::metrics;
use crate::providers::Providers;
use crate::query::QueryExtractor;
use crate::registry::{AgentRegistry, AgentSpec, ReadingLevel};
use crate::search::SearchAdapter;
use crate::security::redact_secrets;
use crate::synthesizer::{AgentOutput, Synthesizer, TrustVerdict};

pub const ABORT_ARTICLE_FETCH_FAILED: &str = "article_fetch_failed";

/// Immutable inputs of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub url: String,
    pub reading_level: ReadingLevel,
}

impl AnalysisRequest {
    pub fn new(url: impl Into<String>, reading_level: ReadingLevel) -> Self {
        Self {
            url: url.into(),
            reading_level,
        }
    }

    /// Lenient construction from wire values: a missing or blank url falls
    /// back to `default_url`, anything but `"simple"` reads as standard.
    pub fn from_wire(url: Option<String>, reading_level: Option<&str>, default_url: &str) -> Self {
        let url = url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| default_url.to_string());
        Self::new(url, ReadingLevel::from_wire(reading_level))
    }
}

/// Summary of a finished run, for callers that do not read the event stream.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub agents_total: usize,
    pub agents_failed: usize,
    pub verdict: Option<TrustVerdict>,
    pub aborted: bool,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn outcome(&self) -> &'static str {
        if self.aborted {
            "aborted"
        } else if self.cancelled {
            "cancelled"
        } else {
            "completed"
        }
    }
}

pub struct Orchestrator {
    providers: Providers,
    registry: AgentRegistry,
    settings: Arc<AnalysisSettings>,
    queries: QueryExtractor,
    search: SearchAdapter,
    synthesizer: Synthesizer,
}

impl Orchestrator {
    pub fn new(providers: Providers, registry: AgentRegistry, settings: AnalysisSettings) -> Self {
        let queries = if providers.credentials.generation {
            QueryExtractor::new(
                Some(providers.generator.clone()),
                settings.query_article_chars,
            )
        } else {
            QueryExtractor::heuristic()
        };
        let search = SearchAdapter::new(providers.search.clone(), settings.max_results_per_query);
        let synthesizer = Synthesizer::new(providers.structured.clone(), settings.synthesis_attempts)
            .with_timeout(Duration::from_secs(settings.synthesis_timeout_secs.max(1)));

        Self {
            providers,
            registry,
            settings: Arc::new(settings),
            queries,
            search,
            synthesizer,
        }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Run on a background task; the receiver yields every event and closes
    /// once the run and all of its agents have finished.
    pub fn spawn(self: Arc<Self>, request: AnalysisRequest) -> (JoinHandle<RunReport>, EventReceiver) {
        let (sink, receiver) = EventSink::channel();
        let handle = tokio::spawn(async move { self.run(request, sink).await });
        (handle, receiver)
    }

    /// Execute one run to its final `done` event.
    #[instrument(
        name = "orchestrator.run",
        skip_all,
        fields(url = %request.url, reading_level = request.reading_level.as_str(), run_id)
    )]
    pub async fn run(&self, request: AnalysisRequest, sink: EventSink) -> RunReport {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        let started = Instant::now();
        let agents_total = self.registry.len();

        let _ = sink.emit(Event::Start {
            url: request.url.clone(),
            has_key: self.providers.credentials.generation,
            reading_level: request.reading_level,
        });

        let source = self.providers.fetcher.source_name().to_string();
        let article = match self.fetch_article(&request.url).await {
            Ok(article) => article,
            Err(err) => {
                let message = redact_secrets(&err.source.to_string());
                warn!(error = %message, "article fetch failed; aborting run");
                let _ = sink.emit(Event::ArticleError { message, source });
                let _ = sink.emit(Event::aborted(ABORT_ARTICLE_FETCH_FAILED));
                metrics::record_analysis_run("aborted");
                return RunReport {
                    run_id,
                    agents_total,
                    agents_failed: 0,
                    verdict: None,
                    aborted: true,
                    cancelled: sink.is_closed(),
                    duration_ms: started.elapsed().as_millis() as u64,
                };
            }
        };

        info!(bytes = article.len(), %source, "article fetched");
        let _ = sink.emit(Event::Article {
            bytes: article.len(),
            source,
        });

        let outcomes = self.run_agents(article, request.reading_level, &sink).await;
        let agents_failed = outcomes.iter().filter(|o| o.error.is_some()).count();
        let _ = sink.emit(Event::AgentsComplete);
        info!(agents_total, agents_failed, "all agents settled");

        let mut report = RunReport {
            run_id,
            agents_total,
            agents_failed,
            verdict: None,
            aborted: false,
            cancelled: false,
            duration_ms: 0,
        };

        if sink.is_closed() {
            debug!("consumer gone; skipping synthesis");
            report.cancelled = true;
        } else {
            let outputs: Vec<AgentOutput> = outcomes.iter().map(AgentOutput::from_outcome).collect();
            match self.synthesizer.synthesize(&outputs, request.reading_level).await {
                Ok(verdict) => {
                    report.verdict = Some(verdict.clone());
                    let _ = sink.emit(Event::SummaryObject { object: verdict });
                }
                Err(err) => {
                    let error = redact_secrets(&err.to_string());
                    warn!(%error, "synthesis failed");
                    let _ = sink.emit(Event::SummaryError { error });
                }
            }
            report.cancelled = sink.is_closed();
        }

        let _ = sink.emit(Event::done());
        report.duration_ms = started.elapsed().as_millis() as u64;
        metrics::record_analysis_run(report.outcome());
        info!(
            duration_ms = report.duration_ms,
            verdict = report.verdict.is_some(),
            outcome = report.outcome(),
            "analysis run finished"
        );
        report
    }

    async fn fetch_article(&self, url: &str) -> Result<String, FetchError> {
        self.providers
            .fetcher
            .fetch(url)
            .await
            .map_err(|source| FetchError {
                url: url.to_string(),
                source,
            })
    }

    /// Settle-all join: one slot per registered agent, in registry order.
    async fn run_agents(
        &self,
        article: String,
        reading_level: ReadingLevel,
        sink: &EventSink,
    ) -> Vec<AgentOutcome> {
        let ctx = AgentContext {
            article: Arc::from(article),
            reading_level,
            generator: self.providers.generator.clone(),
            queries: self.queries.clone(),
            search: self.search.clone(),
            settings: self.settings.clone(),
            sink: sink.clone(),
            run_date: Utc::now().date_naive(),
        };

        let specs = self.registry.specs();
        let handles: Vec<JoinHandle<AgentOutcome>> = specs
            .iter()
            .map(|spec| tokio::spawn(run_agent(spec.clone(), ctx.clone())))
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .zip(specs)
            .map(|(settled, spec)| match settled {
                Ok(outcome) => outcome,
                Err(err) => crashed_outcome(spec, err, sink),
            })
            .collect()
    }
}

/// Terminal events for a task that never reached its own `agentDone`.
fn crashed_outcome(spec: &AgentSpec, err: JoinError, sink: &EventSink) -> AgentOutcome {
    let reason = if err.is_panic() {
        "agent task panicked"
    } else {
        "agent task cancelled"
    };
    error!(agent = %spec.id, error = %err, "{reason}");
    metrics::record_agent_run(&spec.id, "errored", 0);

    let _ = sink.emit(Event::AgentError {
        id: spec.id.clone(),
        error: reason.to_string(),
    });
    let _ = sink.emit(Event::AgentDone {
        id: spec.id.clone(),
        markdown: String::new(),
    });

    AgentOutcome {
        id: spec.id.clone(),
        name: spec.name.clone(),
        markdown: String::new(),
        error: Some(TaskError::new(spec.id.clone(), reason)),
        duration_ms: 0,
    }
}
