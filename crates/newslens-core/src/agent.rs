//! A single analysis agent: optional search, streamed generation, envelope
//! extraction. Failures end as events, never as errors returned to the caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use futures::StreamExt;
use tracing::{debug, info, instrument, warn};

use crate::config::AnalysisSettings;
use crate::envelope::final_markdown;
use crate::error::{ProviderError, TaskError};
use crate::events::{Event, EventSink};
use crate::metrics;
use crate::providers::TextGenerator;
use crate::query::QueryExtractor;
use crate::registry::{AgentSpec, ReadingLevel, build_agent_system};
use crate::search::{SearchAdapter, SearchResultBundle, render_search_context};
use crate::security::redact_secrets;

const ENVELOPE_INSTRUCTIONS: &str = "You will output XML with root <agentOutput> containing exactly one <markdown><![CDATA[ ...markdown... ]]></markdown>.</agentOutput>";
const OUTPUT_RULES: &str = "Rules: Only produce required markdown (GitHub flavored). No analysis outside your role. No extra XML nodes. Do NOT list search queries or headings like \"Search 1\". Ignore and omit search enumeration; integrate evidence silently.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStatus {
    Pending,
    Running,
    Searching,
    Generating,
    Done,
    Errored,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Pending => "pending",
            AgentStatus::Running => "running",
            AgentStatus::Searching => "searching",
            AgentStatus::Generating => "generating",
            AgentStatus::Done => "done",
            AgentStatus::Errored => "errored",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentStatus::Done | AgentStatus::Errored)
    }
}

/// Mutable state of one agent invocation, owned by its task.
#[derive(Debug)]
pub struct AgentRun {
    pub spec: Arc<AgentSpec>,
    pub accumulated_text: String,
    pub search_queries: Vec<String>,
    pub status: AgentStatus,
}

impl AgentRun {
    pub fn new(spec: Arc<AgentSpec>) -> Self {
        Self {
            spec,
            accumulated_text: String::new(),
            search_queries: Vec::new(),
            status: AgentStatus::Pending,
        }
    }

    fn advance(&mut self, status: AgentStatus) {
        debug!(agent = %self.spec.id, from = self.status.as_str(), to = status.as_str(), "agent status");
        self.status = status;
    }
}

/// Per-run inputs shared by every agent task.
#[derive(Clone)]
pub struct AgentContext {
    pub article: Arc<str>,
    pub reading_level: ReadingLevel,
    pub generator: Arc<dyn TextGenerator>,
    pub queries: QueryExtractor,
    pub search: SearchAdapter,
    pub settings: Arc<AnalysisSettings>,
    pub sink: EventSink,
    pub run_date: NaiveDate,
}

/// What survives an agent task once its terminal event is out.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub id: String,
    pub name: String,
    pub markdown: String,
    pub error: Option<TaskError>,
    pub duration_ms: u64,
}

impl AgentOutcome {
    pub fn status(&self) -> AgentStatus {
        if self.error.is_some() {
            AgentStatus::Errored
        } else {
            AgentStatus::Done
        }
    }
}

/// Drive one agent to its terminal `agentDone` event.
#[instrument(name = "agent.run", skip_all, fields(agent = %spec.id))]
pub async fn run_agent(spec: Arc<AgentSpec>, ctx: AgentContext) -> AgentOutcome {
    let started = Instant::now();
    let mut run = AgentRun::new(spec.clone());
    let mut error = None;

    let _ = ctx.sink.emit(Event::AgentStart {
        id: spec.id.clone(),
    });
    run.advance(AgentStatus::Running);

    let evidence = if spec.search_enabled && ctx.search.is_enabled() && !ctx.sink.is_closed() {
        gather_evidence(&mut run, &ctx).await
    } else {
        Vec::new()
    };

    if ctx.sink.is_closed() {
        debug!("consumer gone before generation; skipping");
    } else {
        run.advance(AgentStatus::Generating);
        if let Err(reason) = generate(&mut run, &ctx, &evidence).await {
            let reason = redact_secrets(&reason);
            warn!(error = %reason, chars = run.accumulated_text.len(), "agent generation failed");
            let _ = ctx.sink.emit(Event::AgentError {
                id: spec.id.clone(),
                error: reason.clone(),
            });
            error = Some(TaskError::new(spec.id.clone(), reason));
        }
    }

    let markdown = final_markdown(&run.accumulated_text);
    run.advance(if error.is_some() {
        AgentStatus::Errored
    } else {
        AgentStatus::Done
    });

    let duration_ms = started.elapsed().as_millis() as u64;
    info!(
        chars = markdown.len(),
        queries = run.search_queries.len(),
        duration_ms,
        status = run.status.as_str(),
        "agent done"
    );
    metrics::record_agent_run(&spec.id, run.status.as_str(), duration_ms);

    let _ = ctx.sink.emit(Event::AgentDone {
        id: spec.id.clone(),
        markdown: markdown.clone(),
    });

    AgentOutcome {
        id: spec.id.clone(),
        name: spec.name.clone(),
        markdown,
        error,
        duration_ms,
    }
}

/// Query extraction plus batch search, bounded by `search_timeout_secs`.
/// Never fails; no evidence is a valid result.
async fn gather_evidence(run: &mut AgentRun, ctx: &AgentContext) -> Vec<SearchResultBundle> {
    run.advance(AgentStatus::Searching);
    pause(ctx.settings.search_stagger_ms).await;

    let limit = ctx.settings.search_timeout_secs.max(1);
    match tokio::time::timeout(Duration::from_secs(limit), collect_evidence(run, ctx)).await {
        Ok(bundles) => bundles,
        Err(_) => {
            warn!(limit_secs = limit, "search phase timed out; continuing without evidence");
            Vec::new()
        }
    }
}

async fn collect_evidence(run: &mut AgentRun, ctx: &AgentContext) -> Vec<SearchResultBundle> {
    let queries = ctx
        .queries
        .extract(&ctx.article, ctx.settings.max_queries)
        .await;
    if queries.is_empty() {
        debug!("no usable fact-check queries; continuing without search");
        return Vec::new();
    }
    run.search_queries = queries.clone();

    if ctx
        .sink
        .emit(Event::SearchQueries {
            agent: run.spec.id.clone(),
            queries: queries.clone(),
        })
        .is_err()
    {
        return Vec::new();
    }

    pause(ctx.settings.query_pause_ms).await;
    let bundles: Vec<SearchResultBundle> = ctx
        .search
        .search(&queries)
        .await
        .into_iter()
        .filter(|bundle| !bundle.sources.is_empty())
        .collect();

    for bundle in &bundles {
        let Some(query_index) = queries.iter().position(|q| *q == bundle.query) else {
            continue;
        };
        let emitted = ctx.sink.emit(Event::SearchResult {
            agent: run.spec.id.clone(),
            query: bundle.query.clone(),
            query_index,
            sources: bundle
                .sources
                .iter()
                .take(ctx.settings.sources_per_event)
                .cloned()
                .collect(),
        });
        if emitted.is_err() {
            break;
        }
    }

    debug!(queries = queries.len(), bundles = bundles.len(), "search evidence gathered");
    bundles
}

async fn generate(
    run: &mut AgentRun,
    ctx: &AgentContext,
    evidence: &[SearchResultBundle],
) -> Result<(), String> {
    let system = build_agent_system(&run.spec.prompt_template, ctx.reading_level);
    let prompt = agent_prompt(ctx.run_date, &ctx.article, evidence);
    let limit = ctx.settings.agent_timeout_secs.max(1);

    match tokio::time::timeout(
        Duration::from_secs(limit),
        forward_stream(run, ctx, &system, &prompt),
    )
    .await
    {
        Ok(result) => result.map_err(|err| err.to_string()),
        Err(_) => Err(format!("generation timed out after {limit}s")),
    }
}

/// Relay fragments as `agentChunk` events while accumulating them.
async fn forward_stream(
    run: &mut AgentRun,
    ctx: &AgentContext,
    system: &str,
    prompt: &str,
) -> Result<(), ProviderError> {
    let mut stream = ctx.generator.stream(system, prompt).await?;

    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        if fragment.is_empty() {
            continue;
        }
        run.accumulated_text.push_str(&fragment);
        let chunk = Event::AgentChunk {
            id: run.spec.id.clone(),
            delta: fragment,
        };
        if ctx.sink.emit(chunk).is_err() {
            debug!("consumer gone; abandoning generation stream");
            break;
        }
    }
    Ok(())
}

fn agent_prompt(date: NaiveDate, article: &str, evidence: &[SearchResultBundle]) -> String {
    [
        format!("Date: {date}"),
        ENVELOPE_INSTRUCTIONS.to_string(),
        OUTPUT_RULES.to_string(),
        format!(
            "<article_markdown><![CDATA[\n{}\n]]></article_markdown>",
            article.replace("]]>", "]]]]><![CDATA[>")
        ),
        render_search_context(evidence),
    ]
    .join("\n")
}

async fn pause(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}
