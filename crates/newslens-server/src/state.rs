use crate::config::AppConfig;
use crate::error::AppError;
use crate::metrics;
use anyhow::{Context, Result};
use axum::response::sse::Event as SseEvent;
use dashmap::DashMap;
use newslens_core::{
    AgentRegistry, AnalysisRequest, ConfigLoader, Orchestrator, Providers, ReadingLevel,
};
use serde::Serialize;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{error, info};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    run_service: Arc<RunService>,
}

impl AppState {
    /// Production state: core config from disk/env, real HTTP providers.
    pub fn try_new(config: &AppConfig) -> Result<Self> {
        let core = ConfigLoader::load(config.config_path.clone())?;
        let providers = Providers::from_config(&core).context("failed to build provider clients")?;
        info!(
            generation = providers.credentials.generation,
            search = providers.credentials.search,
            fetch = providers.credentials.fetch,
            synthesis = providers.credentials.synthesis,
            "provider credentials resolved"
        );

        let orchestrator = Orchestrator::new(providers, AgentRegistry::builtin(), core.analysis);
        Ok(Self::new(orchestrator, config.max_concurrent_runs))
    }

    pub fn new(orchestrator: Orchestrator, max_concurrent_runs: usize) -> Self {
        Self {
            run_service: Arc::new(RunService::new(Arc::new(orchestrator), max_concurrent_runs)),
        }
    }

    pub fn run_service(&self) -> Arc<RunService> {
        self.run_service.clone()
    }

    pub fn metrics(&self) -> RunMetrics {
        self.run_service.metrics()
    }
}

pub type SseStream = Pin<Box<dyn Stream<Item = Result<SseEvent, Infallible>> + Send>>;

/// Admission control and bookkeeping for in-flight analyses.
pub struct RunService {
    orchestrator: Arc<Orchestrator>,
    semaphore: Arc<Semaphore>,
    max_concurrent_runs: usize,
    active: Arc<DashMap<Uuid, ActiveRun>>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRun {
    pub url: String,
    pub reading_level: ReadingLevel,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetrics {
    pub max_concurrent_runs: usize,
    pub available_permits: usize,
    pub active_runs: usize,
}

impl RunService {
    pub fn new(orchestrator: Arc<Orchestrator>, max_concurrent_runs: usize) -> Self {
        Self {
            orchestrator,
            semaphore: Arc::new(Semaphore::new(max_concurrent_runs)),
            max_concurrent_runs,
            active: Arc::new(DashMap::new()),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Build a request from wire values, applying the configured default url.
    pub fn request_from_wire(&self, url: Option<String>, reading_level: Option<&str>) -> AnalysisRequest {
        AnalysisRequest::from_wire(
            url,
            reading_level,
            &self.orchestrator.settings().default_url,
        )
    }

    /// Start a run and hand back its event stream, or reject when saturated.
    pub fn start(&self, request: AnalysisRequest) -> Result<SseStream, AppError> {
        let permit = match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                metrics::run_rejected(self.active.len());
                return Err(AppError::busy(self.max_concurrent_runs));
            }
        };

        let run_key = Uuid::new_v4();
        self.active.insert(
            run_key,
            ActiveRun {
                url: request.url.clone(),
                reading_level: request.reading_level,
            },
        );
        metrics::run_started(
            &run_key.to_string(),
            &request.url,
            self.active.len(),
            self.semaphore.available_permits(),
        );

        let (handle, receiver) = self.orchestrator.clone().spawn(request);

        let active = self.active.clone();
        tokio::spawn(async move {
            let result = handle.await;
            drop(permit);
            active.remove(&run_key);

            let key = run_key.to_string();
            match result {
                Ok(report) => metrics::run_completed(
                    &key,
                    report.outcome(),
                    report.duration_ms,
                    report.agents_failed,
                    active.len(),
                ),
                Err(err) => {
                    error!(run_key = %key, error = %err, "analysis task failed");
                    metrics::run_failed(&key, &err.to_string(), active.len());
                }
            }
        });

        let stream = UnboundedReceiverStream::new(receiver)
            .map(|event| Ok::<_, Infallible>(SseEvent::default().data(event.to_json())));
        Ok(Box::pin(stream))
    }

    pub fn metrics(&self) -> RunMetrics {
        RunMetrics {
            max_concurrent_runs: self.max_concurrent_runs,
            available_permits: self.semaphore.available_permits(),
            active_runs: self.active.len(),
        }
    }
}
