use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use newslens_core::{
    AgentRegistry, AnalysisRequest, ConfigLoader, Event, Orchestrator, Providers, TelemetryOptions,
    TrustVerdict, init_telemetry,
};
use tokio::runtime::Runtime;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "newslens",
    version,
    about = "Multi-agent trust analysis of news articles"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze one article and stream every event to stdout.
    Analyze(AnalyzeArgs),
    /// List the built-in analysis agents.
    Agents,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Article URL (defaults to the configured sample article).
    #[arg(long)]
    url: Option<String>,

    /// Audience for the generated prose: `standard` or `simple`.
    #[arg(long, default_value = "standard", value_parser = ["standard", "simple"])]
    reading_level: String,

    /// Path to a newslens.toml configuration file.
    #[arg(long, env = "NEWSLENS_CONFIG")]
    config: Option<PathBuf>,

    /// Output format for events.
    #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    /// Human-readable progress and final markdown.
    Pretty,
    /// One JSON object per line.
    Json,
    /// Raw `data: <json>` Server-Sent Events records.
    Sse,
}

fn main() -> Result<()> {
    init_telemetry(TelemetryOptions::default())?;

    let cli = Cli::parse();

    let rt = Runtime::new()?;
    rt.block_on(async move {
        match cli.command {
            Command::Analyze(args) => analyze_command(args).await,
            Command::Agents => {
                agents_command();
                Ok(())
            }
        }
    })
}

async fn analyze_command(args: AnalyzeArgs) -> Result<()> {
    let config = ConfigLoader::load(args.config)?;
    let providers = Providers::from_config(&config).context("failed to build provider clients")?;
    let request = AnalysisRequest::from_wire(
        args.url,
        Some(args.reading_level.as_str()),
        &config.analysis.default_url,
    );
    info!(url = %request.url, reading_level = request.reading_level.as_str(), "starting analysis");

    let orchestrator = Arc::new(Orchestrator::new(
        providers,
        AgentRegistry::builtin(),
        config.analysis,
    ));
    let (handle, mut receiver) = orchestrator.spawn(request);

    let mut stdout = io::stdout().lock();
    while let Some(event) = receiver.recv().await {
        match args.format {
            OutputFormat::Pretty => print_pretty(&mut stdout, &event)?,
            OutputFormat::Json => writeln!(stdout, "{}", event.to_json())?,
            OutputFormat::Sse => write!(stdout, "{}", event.to_sse_frame())?,
        }
        stdout.flush()?;
    }

    let report = handle.await.context("analysis task failed")?;
    info!(
        run_id = %report.run_id,
        outcome = report.outcome(),
        agents_failed = report.agents_failed,
        duration_ms = report.duration_ms,
        "analysis finished"
    );
    if report.aborted {
        bail!("analysis aborted: the article could not be fetched");
    }
    Ok(())
}

fn agents_command() {
    for spec in AgentRegistry::builtin().specs() {
        let search = if spec.search_enabled { "  [search]" } else { "" };
        println!("{:<24} {}{search}", spec.id, spec.name);
    }
}

fn print_pretty(out: &mut impl Write, event: &Event) -> io::Result<()> {
    match event {
        Event::Start {
            url,
            has_key,
            reading_level,
        } => writeln!(
            out,
            "Analyzing {url} (reading level: {}, generation key: {})",
            reading_level.as_str(),
            if *has_key { "yes" } else { "no" }
        ),
        Event::Article { bytes, source } => writeln!(out, "Fetched {bytes} bytes via {source}"),
        Event::ArticleError { message, source } => {
            writeln!(out, "Article fetch failed via {source}: {message}")
        }
        Event::AgentStart { id } => writeln!(out, "[{id}] started"),
        Event::SearchQueries { agent, queries } => {
            writeln!(out, "[{agent}] searching: {}", queries.join(" | "))
        }
        Event::SearchResult {
            agent,
            query,
            sources,
            ..
        } => writeln!(out, "[{agent}] {} sources for \"{query}\"", sources.len()),
        // deltas are superseded by the final markdown on agentDone
        Event::AgentChunk { .. } => Ok(()),
        Event::AgentError { id, error } => writeln!(out, "[{id}] error: {error}"),
        Event::AgentDone { id, markdown } => {
            let body = if markdown.trim().is_empty() {
                "_No output._"
            } else {
                markdown.as_str()
            };
            writeln!(out, "\n[{id}] done\n{body}\n")
        }
        Event::AgentsComplete => writeln!(out, "All agents complete; synthesizing verdict"),
        Event::SummaryObject { object } => print_verdict(out, object),
        Event::SummaryError { error } => writeln!(out, "Verdict unavailable: {error}"),
        Event::Done { aborted, reason } => match (aborted, reason) {
            (Some(true), Some(reason)) => writeln!(out, "Aborted ({reason})"),
            (Some(true), None) => writeln!(out, "Aborted"),
            _ => writeln!(out, "Done"),
        },
    }
}

fn print_verdict(out: &mut impl Write, verdict: &TrustVerdict) -> io::Result<()> {
    let level = serde_json::to_value(verdict.trust_level)
        .ok()
        .and_then(|v| v.as_str().map(str::to_uppercase))
        .unwrap_or_default();
    writeln!(out, "\n== Trust Level: {level} ==\n{}", verdict.plain_verdict)?;
    if !verdict.main_concerns.is_empty() {
        writeln!(out, "\nMain concerns:")?;
        for concern in &verdict.main_concerns {
            writeln!(out, "- {concern}")?;
        }
    }
    if !verdict.to_verify.is_empty() {
        writeln!(out, "\nWhat to verify:")?;
        for item in &verdict.to_verify {
            writeln!(out, "- {item}")?;
        }
    }
    if let Some(notes) = verdict.notes.as_deref() {
        writeln!(out, "\nNotes: {notes}")?;
    }
    Ok(())
}
