use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::registry::DEFAULT_ARTICLE_URL;
use crate::{NewsLensError, SecretValue, optional_env};

const DEFAULT_CONFIG_PATH: &str = "newslens.toml";
const CONFIG_PATH_ENV: &str = "NEWSLENS_CONFIG";

/// Top-level configuration structure. Every section falls back to defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub analysis: AnalysisSettings,
    pub fetch: FetchConfig,
    pub generation: GenerationConfig,
    pub synthesis: SynthesisConfig,
    pub search: SearchConfig,
    pub logging: LoggingConfig,
}

/// Helper to load configuration with guard rails.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a provided path or discoverable defaults.
    ///
    /// Resolution order:
    /// 1. Explicit `path` argument.
    /// 2. `NEWSLENS_CONFIG` environment variable.
    /// 3. `newslens.toml` in the current working directory, if present.
    /// 4. Built-in defaults.
    pub fn load(path: Option<PathBuf>) -> Result<Config, NewsLensError> {
        let config = match resolve_path(path) {
            Some(candidate) => {
                let raw = fs::read_to_string(&candidate)
                    .map_err(|err| NewsLensError::config_io(candidate.clone(), err))?;
                Self::parse(&raw)?
            }
            None => Config::default(),
        };

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Config, NewsLensError> {
        toml::from_str(raw).map_err(|err| NewsLensError::InvalidConfiguration(err.to_string()))
    }

    pub fn validate(config: &Config) -> Result<(), NewsLensError> {
        let analysis = &config.analysis;
        if !(1..=10).contains(&analysis.max_queries) {
            return Err(NewsLensError::InvalidConfiguration(
                "analysis.max_queries must be between 1 and 10".into(),
            ));
        }
        if analysis.max_results_per_query == 0 {
            return Err(NewsLensError::InvalidConfiguration(
                "analysis.max_results_per_query must be at least 1".into(),
            ));
        }

        for (section, model) in [
            ("generation", &config.generation.model),
            ("synthesis", &config.synthesis.model),
        ] {
            if model.trim().is_empty() {
                return Err(NewsLensError::InvalidConfiguration(format!(
                    "{section}.model must not be empty"
                )));
            }
        }

        for (section, key_env) in [
            ("fetch", &config.fetch.api_key_env),
            ("generation", &config.generation.api_key_env),
            ("synthesis", &config.synthesis.api_key_env),
            ("search", &config.search.api_key_env),
        ] {
            if key_env.trim().is_empty() {
                return Err(NewsLensError::InvalidConfiguration(format!(
                    "{section}.api_key_env must reference an environment variable"
                )));
            }
        }
        Ok(())
    }
}

fn resolve_path(path: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = path {
        return Some(path);
    }

    if let Ok(from_env) = env::var(CONFIG_PATH_ENV) {
        if !from_env.trim().is_empty() {
            return Some(PathBuf::from(from_env));
        }
    }

    let default = Path::new(DEFAULT_CONFIG_PATH);
    default.exists().then(|| default.to_path_buf())
}

/// Knobs for a single analysis run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub default_url: String,
    pub max_queries: usize,
    pub max_results_per_query: usize,
    pub sources_per_event: usize,
    pub query_article_chars: usize,
    pub search_stagger_ms: u64,
    pub query_pause_ms: u64,
    pub search_timeout_secs: u64,
    pub agent_timeout_secs: u64,
    pub synthesis_timeout_secs: u64,
    pub synthesis_attempts: u8,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            default_url: DEFAULT_ARTICLE_URL.to_string(),
            max_queries: 3,
            max_results_per_query: 6,
            sources_per_event: 5,
            query_article_chars: 8_000,
            search_stagger_ms: 500,
            query_pause_ms: 300,
            search_timeout_secs: 45,
            agent_timeout_secs: 180,
            synthesis_timeout_secs: 120,
            synthesis_attempts: 2,
        }
    }
}

impl AnalysisSettings {
    /// Settings with every artificial delay removed.
    pub fn without_delays(mut self) -> Self {
        self.search_stagger_ms = 0;
        self.query_pause_ms = 0;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchBackend {
    #[default]
    Firecrawl,
    Markdowner,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub backend: FetchBackend,
    pub firecrawl_url: String,
    pub markdowner_url: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            backend: FetchBackend::Firecrawl,
            firecrawl_url: "https://api.firecrawl.dev".to_string(),
            markdowner_url: "https://md.dhr.wtf".to_string(),
            api_key_env: "FIRECRAWL_API_KEY".to_string(),
            timeout_secs: 60,
        }
    }
}

impl FetchConfig {
    pub fn api_key(&self) -> Option<SecretValue> {
        optional_env(&self.api_key_env)
    }
}

/// OpenAI-compatible streaming chat endpoint used by the agents.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.cerebras.ai/v1".to_string(),
            model: "qwen-3-235b-a22b-instruct-2507".to_string(),
            api_key_env: "CEREBRAS_API_KEY".to_string(),
        }
    }
}

impl GenerationConfig {
    pub fn api_key(&self) -> Option<SecretValue> {
        optional_env(&self.api_key_env)
    }
}

/// Anthropic model used for the structured verdict.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub model: String,
    pub api_key_env: String,
    pub max_tokens: u32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            model: "claude-opus-4-1-20250805".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            max_tokens: 2_048,
        }
    }
}

impl SynthesisConfig {
    pub fn api_key(&self) -> Option<SecretValue> {
        optional_env(&self.api_key_env)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.exa.ai".to_string(),
            api_key_env: "EXA_API_KEY".to_string(),
            timeout_secs: 20,
        }
    }
}

impl SearchConfig {
    pub fn api_key(&self) -> Option<SecretValue> {
        optional_env(&self.api_key_env)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
