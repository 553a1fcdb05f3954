//! Event channel between the orchestrator and a remote consumer.
//!
//! Every observable step of a run is an [`Event`]; the order in which events
//! are emitted is the authoritative history of the run. Producers write
//! through an [`EventSink`], which never suspends: if the consumer is slow the
//! channel buffers, if it is gone further events are dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ChannelClosed;
use crate::registry::ReadingLevel;
use crate::search::SearchSource;
use crate::synthesizer::TrustVerdict;

/// Run lifecycle events, serialized with a `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Event {
    /// Run begun.
    Start {
        url: String,
        has_key: bool,
        reading_level: ReadingLevel,
    },
    /// Article fetched; size metadata only.
    Article { bytes: usize, source: String },
    /// Article fetch failed. Fatal to the run.
    ArticleError { message: String, source: String },
    AgentStart { id: String },
    SearchQueries { agent: String, queries: Vec<String> },
    SearchResult {
        agent: String,
        query: String,
        /// Index of `query` in the agent's preceding `searchQueries` list.
        query_index: usize,
        sources: Vec<SearchSource>,
    },
    /// Raw streamed fragment; append-only and non-final.
    AgentChunk { id: String, delta: String },
    AgentError { id: String, error: String },
    /// Terminal event of one agent, carrying its final extracted markdown.
    AgentDone {
        id: String,
        #[serde(default)]
        markdown: String,
    },
    AgentsComplete,
    SummaryObject { object: TrustVerdict },
    SummaryError { error: String },
    Done {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        aborted: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl Event {
    /// Wire tag of the event.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Start { .. } => "start",
            Event::Article { .. } => "article",
            Event::ArticleError { .. } => "articleError",
            Event::AgentStart { .. } => "agentStart",
            Event::SearchQueries { .. } => "searchQueries",
            Event::SearchResult { .. } => "searchResult",
            Event::AgentChunk { .. } => "agentChunk",
            Event::AgentError { .. } => "agentError",
            Event::AgentDone { .. } => "agentDone",
            Event::AgentsComplete => "agentsComplete",
            Event::SummaryObject { .. } => "summaryObject",
            Event::SummaryError { .. } => "summaryError",
            Event::Done { .. } => "done",
        }
    }

    /// Agent the event belongs to, if any.
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Event::AgentStart { id }
            | Event::AgentChunk { id, .. }
            | Event::AgentError { id, .. }
            | Event::AgentDone { id, .. } => Some(id),
            Event::SearchQueries { agent, .. } | Event::SearchResult { agent, .. } => Some(agent),
            _ => None,
        }
    }

    pub fn done() -> Self {
        Event::Done {
            aborted: None,
            reason: None,
        }
    }

    pub fn aborted(reason: impl Into<String>) -> Self {
        Event::Done {
            aborted: Some(true),
            reason: Some(reason.into()),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            serde_json::json!({
                "type": "summaryError",
                "error": format!("failed to serialize {} event: {err}", self.kind()),
            })
            .to_string()
        })
    }

    /// One Server-Sent Events record: `data: <json>\n\n`.
    pub fn to_sse_frame(&self) -> String {
        format!("data: {}\n\n", self.to_json())
    }
}

pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Producer handle shared by the orchestrator and every agent task.
#[derive(Clone)]
pub struct EventSink {
    sender: mpsc::UnboundedSender<Event>,
    closed: Arc<AtomicBool>,
}

impl EventSink {
    pub fn channel() -> (Self, EventReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender,
                closed: Arc::new(AtomicBool::new(false)),
            },
            receiver,
        )
    }

    /// Append an event. Once the consumer is gone every call returns
    /// [`ChannelClosed`] and the event is discarded.
    pub fn emit(&self, event: Event) -> Result<(), ChannelClosed> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ChannelClosed);
        }

        let kind = event.kind();
        match self.sender.send(event) {
            Ok(()) => {
                tracing::trace!(kind, "event emitted");
                Ok(())
            }
            Err(_) => {
                if !self.closed.swap(true, Ordering::AcqRel) {
                    tracing::debug!(kind, "consumer disconnected; suppressing further events");
                }
                Err(ChannelClosed)
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.sender.is_closed()
    }
}

/// Collected history of a run, mostly for tests and the CLI.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    /// Read until every producer handle has been dropped.
    pub async fn drain(mut receiver: EventReceiver) -> Self {
        let mut events = Vec::new();
        while let Some(event) = receiver.recv().await {
            events.push(event);
        }
        Self { events }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.iter().map(Event::kind).collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.events.iter().filter(|e| e.kind() == kind).count()
    }

    pub fn position(&self, kind: &str) -> Option<usize> {
        self.events.iter().position(|e| e.kind() == kind)
    }

    /// Events of a single agent, in emission order.
    pub fn for_agent(&self, id: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.agent_id() == Some(id))
            .collect()
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}
