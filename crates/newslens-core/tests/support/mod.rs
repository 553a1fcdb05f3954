#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use newslens_core::{
    AgentRegistry, AnalysisRequest, AnalysisSettings, ContentFetcher, Credentials, EventLog,
    Orchestrator, ProviderError, Providers, RunReport, SearchProvider, SearchSource,
    StructuredGenerator, TextGenerator, TextStream,
};
use serde_json::{Value, json};

pub const ARTICLE: &str = "# City council vote\n\
    Officials claim the budget is balanced.\n\
    Critics allege the numbers were massaged.\n\
    The weather was pleasant.\n\
    According to the mayor, taxes will not rise.\n\
    It is unclear when the audit will finish.";

pub const QUIET_ARTICLE: &str = "# Park reopens\nThe park reopened on Monday.\nChildren played.";

pub struct ScriptedFetcher {
    article: Option<String>,
    pub calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn ok(article: &str) -> Arc<Self> {
        Arc::new(Self {
            article: Some(article.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn blocked() -> Arc<Self> {
        Arc::new(Self {
            article: None,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ContentFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.article
            .clone()
            .ok_or_else(|| ProviderError::NotFoundOrBlocked(url.to_string()))
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}

/// Behaviour of one generation call.
#[derive(Clone)]
pub enum Script {
    Chunks(Vec<String>),
    FailAfter(Vec<String>, String),
    Refuse(String),
    Panic,
    Hang,
}

impl Script {
    /// A well-formed envelope delivered in three fragments.
    pub fn envelope(markdown: &str) -> Self {
        Script::Chunks(vec![
            "<agentOutput><markdown><![CDATA[".to_string(),
            markdown.to_string(),
            "]]></markdown></agentOutput>".to_string(),
        ])
    }
}

/// Generator whose behaviour is chosen by the agent role found in the system prompt.
pub struct ScriptedGenerator {
    agents: Vec<(String, Script)>,
    default: Script,
    query_reply: Option<String>,
    queries_stall: bool,
    pub query_calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(default: Script) -> Self {
        Self {
            agents: Vec::new(),
            default,
            query_reply: None,
            queries_stall: false,
            query_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_agent(mut self, registry: &AgentRegistry, id: &str, script: Script) -> Self {
        let spec = registry.get(id).expect("agent registered");
        self.agents.push((spec.prompt_template.clone(), script));
        self
    }

    pub fn with_query_reply(mut self, reply: &str) -> Self {
        self.query_reply = Some(reply.to_string());
        self
    }

    /// Query extraction calls never produce a fragment.
    pub fn with_stalled_queries(mut self) -> Self {
        self.queries_stall = true;
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn stream(&self, system: &str, _prompt: &str) -> Result<TextStream, ProviderError> {
        if system.contains("fact extraction") {
            self.query_calls.fetch_add(1, Ordering::SeqCst);
            if self.queries_stall {
                return Ok(stream::pending().boxed());
            }
            return match &self.query_reply {
                Some(reply) => Ok(stream::iter(vec![Ok(reply.clone())]).boxed()),
                None => Err(ProviderError::Stream("no query script".into())),
            };
        }

        let script = self
            .agents
            .iter()
            .find(|(template, _)| system.starts_with(template.as_str()))
            .map(|(_, script)| script.clone())
            .unwrap_or_else(|| self.default.clone());

        match script {
            Script::Chunks(chunks) => Ok(stream::iter(chunks.into_iter().map(Ok)).boxed()),
            Script::FailAfter(chunks, error) => {
                let items = chunks
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(ProviderError::Stream(error))));
                Ok(stream::iter(items).boxed())
            }
            Script::Refuse(error) => Err(ProviderError::Stream(error)),
            Script::Panic => panic!("scripted generator panic"),
            Script::Hang => Ok(stream::pending().boxed()),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

pub struct FakeSearch {
    per_query: usize,
    pub calls: AtomicUsize,
}

impl FakeSearch {
    pub fn returning(per_query: usize) -> Arc<Self> {
        Arc::new(Self {
            per_query,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SearchProvider for FakeSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchSource>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if query.contains("offline") {
            return Err(ProviderError::Stream("search offline".into()));
        }
        Ok((0..self.per_query.min(limit))
            .map(|i| SearchSource {
                url: format!("https://evidence.example/{}/{i}", query.len()),
                title: Some(format!("{query} #{i}")),
                snippet: Some("snippet".into()),
            })
            .collect())
    }
}

/// Search provider whose requests never answer.
pub struct StalledSearch;

#[async_trait]
impl SearchProvider for StalledSearch {
    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<SearchSource>, ProviderError> {
        futures::future::pending().await
    }
}

pub struct ScriptedStructured {
    responses: Vec<Value>,
    pub calls: AtomicUsize,
}

impl ScriptedStructured {
    pub fn always(value: Value) -> Arc<Self> {
        Arc::new(Self {
            responses: vec![value],
            calls: AtomicUsize::new(0),
        })
    }

    pub fn sequence(responses: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            responses,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StructuredGenerator for ScriptedStructured {
    async fn generate(&self, _system: &str, _prompt: &str, _schema: &Value) -> Result<Value, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let index = call.min(self.responses.len().saturating_sub(1));
        self.responses
            .get(index)
            .cloned()
            .ok_or_else(|| ProviderError::Decode("no scripted response".into()))
    }
}

pub fn valid_verdict() -> Value {
    json!({
        "trustLevel": "low",
        "plainVerdict": "Claims are thinly sourced.",
        "mainConcerns": ["unnamed officials", "no audit data"],
        "toVerify": ["budget figures"],
        "notes": "Opinion mixed with reporting."
    })
}

pub fn providers(
    fetcher: Arc<ScriptedFetcher>,
    generator: Arc<ScriptedGenerator>,
    structured: Arc<ScriptedStructured>,
    search: Option<Arc<FakeSearch>>,
) -> Providers {
    Providers {
        fetcher,
        generator,
        structured,
        credentials: Credentials {
            generation: true,
            search: search.is_some(),
            fetch: true,
            synthesis: true,
        },
        search: search.map(|s| s as Arc<dyn SearchProvider>),
    }
}

pub fn settings() -> AnalysisSettings {
    AnalysisSettings::default().without_delays()
}

pub fn request() -> AnalysisRequest {
    AnalysisRequest::from_wire(Some("https://news.example/story".into()), None, "unused")
}

/// Run to completion, collecting every event.
pub async fn run_to_end(orchestrator: Orchestrator, request: AnalysisRequest) -> (RunReport, EventLog) {
    let (handle, receiver) = Arc::new(orchestrator).spawn(request);
    let log = EventLog::drain(receiver).await;
    let report = handle.await.expect("run task completes");
    (report, log)
}
