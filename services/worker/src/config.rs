//! services/worker/src/config.rs
//!
//! Defines the worker's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use doomlearn_core::chunking::ChunkingConfig;
use doomlearn_core::prompt_pack::PackLimits;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which generation backend the worker talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerationMode {
    Mock,
    OpenAi,
}

/// Knobs of a single pipeline run.
#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub chunking: ChunkingConfig,
    pub pack_limits: PackLimits,
    pub retrieval_top_k: usize,
    pub max_topics_per_run: usize,
    pub topic_concurrency: usize,
    pub generation_timeout: Duration,
    /// How long a run may hold an upload before another run may claim it.
    pub run_lease: Duration,
    pub voice_style: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            pack_limits: PackLimits::default(),
            retrieval_top_k: 6,
            max_topics_per_run: 8,
            topic_concurrency: 4,
            generation_timeout: Duration::from_secs(60),
            run_lease: Duration::from_secs(1800),
            voice_style: "default".to_string(),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub log_level: Level,
    pub storage_root: PathBuf,
    pub storage_public_base_url: String,
    pub storage_signing_secret: String,
    pub presign_ttl: Duration,
    pub generation_mode: GenerationMode,
    pub openai_api_key: Option<String>,
    pub concept_model: String,
    pub tts_voice: String,
    pub embeddings_mode: String,
    pub vector_dim: usize,
    pub worker_concurrency: usize,
    pub pipeline: PipelineSettings,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Database ---
        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;
        let database_max_connections = parse_var(&lookup, "DATABASE_MAX_CONNECTIONS", 5u32)?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Object Storage ---
        let storage_root = PathBuf::from(var_or("STORAGE_ROOT", "./storage"));
        let storage_public_base_url =
            var_or("STORAGE_PUBLIC_BASE_URL", "http://localhost:9000/doomlearn");
        let storage_signing_secret = var_or("STORAGE_SIGNING_SECRET", "dev-change-me");
        let presign_ttl = Duration::from_secs(parse_var(&lookup, "PRESIGN_TTL_SECS", 3600u64)?);

        // --- Generation Backend ---
        let generation_mode = match var_or("GENERATION_MODE", "mock").to_lowercase().as_str() {
            "mock" => GenerationMode::Mock,
            "openai" => GenerationMode::OpenAi,
            other => {
                return Err(ConfigError::InvalidValue(
                    "GENERATION_MODE".to_string(),
                    format!("'{}' is not one of mock, openai", other),
                ))
            }
        };
        let openai_api_key = lookup("OPENAI_API_KEY");
        if generation_mode == GenerationMode::OpenAi && openai_api_key.is_none() {
            return Err(ConfigError::MissingVar("OPENAI_API_KEY".to_string()));
        }
        let concept_model = var_or("CONCEPT_MODEL", "gpt-4o-mini");
        let tts_voice = var_or("TTS_VOICE", "alloy");

        // --- Embeddings ---
        let embeddings_mode = var_or("EMBEDDINGS_MODE", "mock");
        let vector_dim = parse_var(&lookup, "VECTOR_DIM", 384usize)?;

        // --- Pipeline ---
        let defaults = PipelineSettings::default();
        let pipeline = PipelineSettings {
            chunking: ChunkingConfig::new(
                parse_var(&lookup, "CHUNK_TARGET_CHARS", defaults.chunking.target_chars)?,
                parse_var(&lookup, "CHUNK_OVERLAP_CHARS", defaults.chunking.overlap_chars)?,
            ),
            pack_limits: PackLimits {
                max_facts: parse_var(&lookup, "MAX_FACTS", defaults.pack_limits.max_facts)?,
                max_fact_chars: parse_var(
                    &lookup,
                    "MAX_FACT_CHARS",
                    defaults.pack_limits.max_fact_chars,
                )?,
            },
            retrieval_top_k: parse_var(&lookup, "RETRIEVAL_TOP_K", defaults.retrieval_top_k)?,
            max_topics_per_run: parse_var(
                &lookup,
                "MAX_TOPICS_PER_RUN",
                defaults.max_topics_per_run,
            )?,
            topic_concurrency: parse_var(&lookup, "TOPIC_CONCURRENCY", defaults.topic_concurrency)?
                .max(1),
            generation_timeout: Duration::from_secs(parse_var(
                &lookup,
                "GENERATION_TIMEOUT_SECS",
                defaults.generation_timeout.as_secs(),
            )?),
            run_lease: Duration::from_secs(parse_var(
                &lookup,
                "RUN_LEASE_SECS",
                defaults.run_lease.as_secs(),
            )?),
            voice_style: defaults.voice_style,
        };
        let worker_concurrency = parse_var(&lookup, "WORKER_CONCURRENCY", 2usize)?.max(1);

        Ok(Self {
            database_url,
            database_max_connections,
            log_level,
            storage_root,
            storage_public_base_url,
            storage_signing_secret,
            presign_ttl,
            generation_mode,
            openai_api_key,
            concept_model,
            tts_voice,
            embeddings_mode,
            vector_dim,
            worker_concurrency,
            pipeline,
        })
    }
}

/// Parses an optional variable, falling back to `default` when it is unset.
fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_the_database_is_set() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/doomlearn")]).unwrap();
        assert_eq!(config.generation_mode, GenerationMode::Mock);
        assert_eq!(config.vector_dim, 384);
        assert_eq!(config.pipeline.chunking, ChunkingConfig::new(900, 120));
        assert_eq!(config.pipeline.retrieval_top_k, 6);
        assert_eq!(config.pipeline.max_topics_per_run, 8);
        assert_eq!(config.pipeline.generation_timeout, Duration::from_secs(60));
        assert_eq!(config.pipeline.run_lease, Duration::from_secs(1800));
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    fn database_url_is_required() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingVar(v)) if v == "DATABASE_URL"));
    }

    #[test]
    fn openai_mode_requires_a_key() {
        let err = load(&[("DATABASE_URL", "x"), ("GENERATION_MODE", "openai")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(v) if v == "OPENAI_API_KEY"));

        let config = load(&[
            ("DATABASE_URL", "x"),
            ("GENERATION_MODE", "OpenAI"),
            ("OPENAI_API_KEY", "sk-test"),
        ])
        .unwrap();
        assert_eq!(config.generation_mode, GenerationMode::OpenAi);
    }

    #[test]
    fn malformed_numbers_are_reported_with_their_variable() {
        let err = load(&[("DATABASE_URL", "x"), ("CHUNK_TARGET_CHARS", "lots")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(v, _) if v == "CHUNK_TARGET_CHARS"));
    }

    #[test]
    fn overrides_are_honoured() {
        let config = load(&[
            ("DATABASE_URL", "x"),
            ("CHUNK_TARGET_CHARS", "500"),
            ("CHUNK_OVERLAP_CHARS", "50"),
            ("TOPIC_CONCURRENCY", "0"),
            ("GENERATION_TIMEOUT_SECS", "5"),
        ])
        .unwrap();
        assert_eq!(config.pipeline.chunking, ChunkingConfig::new(500, 50));
        assert_eq!(config.pipeline.topic_concurrency, 1);
        assert_eq!(config.pipeline.generation_timeout, Duration::from_secs(5));
    }
}
