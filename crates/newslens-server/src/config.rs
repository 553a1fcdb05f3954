use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub listen_addr: String,
    pub max_concurrent_runs: usize,
    pub config_path: Option<PathBuf>,
    pub otel_endpoint: Option<String>,
}

impl AppConfig {
    const DEFAULT_LISTEN_ADDR: &'static str = "0.0.0.0:8080";
    const DEFAULT_MAX_CONCURRENT_RUNS: usize = 4;

    pub fn from_env() -> Result<Self> {
        let listen_addr = env::var("NEWSLENS_LISTEN_ADDR")
            .unwrap_or_else(|_| Self::DEFAULT_LISTEN_ADDR.to_string());

        let max_concurrent_runs = env::var("NEWSLENS_MAX_CONCURRENT_RUNS")
            .ok()
            .map(|value| {
                value
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .filter(|value| *value > 0)
                    .with_context(|| {
                        format!("NEWSLENS_MAX_CONCURRENT_RUNS must be a positive integer, got {value:?}")
                    })
            })
            .transpose()?
            .unwrap_or(Self::DEFAULT_MAX_CONCURRENT_RUNS);

        let config_path = non_empty_var("NEWSLENS_CONFIG").map(PathBuf::from);
        let otel_endpoint = non_empty_var("NEWSLENS_OTEL_ENDPOINT");

        Ok(Self {
            listen_addr,
            max_concurrent_runs,
            config_path,
            otel_endpoint,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
