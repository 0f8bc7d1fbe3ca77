use clap::Args;
use config::{Config, Environment, File};
use serde::Deserialize;

/// Overrides accepted on the command line (or their dedicated env vars).
#[derive(Args, Debug, Default, Clone)]
pub struct ConfigArgs {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE", global = true)]
    pub config: Option<String>,

    /// Cosine similarity above which two recommendations count as the same advice
    #[arg(long, env = "SIMILARITY_THRESHOLD", global = true)]
    pub similarity_threshold: Option<f32>,

    /// Days during which similar advice is suppressed
    #[arg(long, env = "COOLDOWN_DAYS", global = true)]
    pub cooldown_days: Option<i64>,

    /// Enable recommendation memory
    #[arg(long, env = "MEMORY_ENABLED", global = true)]
    pub memory_enabled: Option<bool>,

    /// Run groups concurrently
    #[arg(long, env = "PARALLEL_ENABLED", global = true)]
    pub parallel_enabled: Option<bool>,

    /// Memory store provider (memory | postgres)
    #[arg(long, env = "STORE_PROVIDER", global = true)]
    pub store: Option<String>,

    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub memory: MemoryConfig,
    pub batch: BatchConfig,
    pub retry: RetryConfig,
    pub persistence: PersistenceConfig,
    pub embedding: EmbeddingConfig,
    pub generator: GeneratorConfig,
    pub source: SourceConfig,
}

/// Which history records a candidate is compared against.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryScope {
    /// The latest records for the candidate's target.
    PerTarget,
    /// The latest records for the subject across all targets.
    Subject,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    pub enabled: bool,
    pub similarity_threshold: f32,
    pub cooldown_days: i64,
    /// Defaults to `cooldown_days`.
    pub prefilter_days: Option<i64>,
    pub required_count: usize,
    pub history_limit: usize,
    pub history_scope: HistoryScope,
}

impl MemoryConfig {
    pub fn prefilter_days(&self) -> i64 {
        self.prefilter_days.unwrap_or(self.cooldown_days)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BatchConfig {
    pub group_size: usize,
    pub max_concurrent_groups: usize,
    pub parallel_enabled: bool,
    pub group_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PersistenceConfig {
    pub provider: String,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub dimensions: Option<usize>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneratorConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_targets_per_subject: usize,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub subjects_file: Option<String>,
}

impl AppConfig {
    /// Builds the configuration with precedence CLI > `RECMEM_*` env > file > defaults.
    pub fn load(args: &ConfigArgs) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder();

        // 1. Defaults
        builder = builder
            .set_default("memory.enabled", true)?
            .set_default("memory.similarity_threshold", 0.85)?
            .set_default("memory.cooldown_days", 14)?
            .set_default("memory.required_count", 3)?
            .set_default("memory.history_limit", 5)?
            .set_default("memory.history_scope", "per_target")?
            .set_default("batch.group_size", 5)?
            .set_default("batch.max_concurrent_groups", 20)?
            .set_default("batch.parallel_enabled", true)?
            .set_default("batch.group_timeout_secs", 300)?
            .set_default("retry.max_attempts", 3)?
            .set_default("retry.initial_delay_ms", 500)?
            .set_default("retry.max_delay_ms", 8_000)?
            .set_default("persistence.provider", "memory")?
            .set_default("persistence.max_connections", 5)?
            .set_default("embedding.provider", "http")?
            .set_default("embedding.model", "text-embedding-3-large")?
            .set_default("embedding.request_timeout_secs", 30)?
            .set_default("generator.model", "gpt-4o-mini")?
            .set_default("generator.temperature", 0.2)?
            .set_default("generator.max_targets_per_subject", 30)?
            .set_default("generator.request_timeout_secs", 120)?;

        // 2. Config file: explicit path must exist, ./config.{yaml,toml,json} is optional
        builder = match &args.config {
            Some(path) => builder.add_source(File::with_name(path).required(true)),
            None => builder.add_source(File::with_name("config").required(false)),
        };

        // 3. Environment variables, e.g. RECMEM_MEMORY__COOLDOWN_DAYS=7
        builder = builder.add_source(
            Environment::with_prefix("RECMEM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI overrides
        if let Some(threshold) = args.similarity_threshold {
            builder = builder.set_override("memory.similarity_threshold", f64::from(threshold))?;
        }
        if let Some(days) = args.cooldown_days {
            builder = builder.set_override("memory.cooldown_days", days)?;
        }
        if let Some(enabled) = args.memory_enabled {
            builder = builder.set_override("memory.enabled", enabled)?;
        }
        if let Some(parallel) = args.parallel_enabled {
            builder = builder.set_override("batch.parallel_enabled", parallel)?;
        }
        if let Some(store) = &args.store {
            builder = builder.set_override("persistence.provider", store.as_str())?;
        }
        if let Some(url) = &args.database_url {
            builder = builder.set_override("persistence.database_url", url.as_str())?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Range checks applied after every load.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let fail = |msg: &str| -> Result<(), config::ConfigError> {
            Err(config::ConfigError::Message(msg.to_string()))
        };

        let memory = &self.memory;
        if !(0.0..=1.0).contains(&memory.similarity_threshold) {
            return fail("memory.similarity_threshold must be between 0 and 1");
        }
        if memory.cooldown_days <= 0 {
            return fail("memory.cooldown_days must be positive");
        }
        if memory.prefilter_days() <= 0 {
            return fail("memory.prefilter_days must be positive");
        }
        if memory.required_count == 0 {
            return fail("memory.required_count must be at least 1");
        }
        if memory.history_limit == 0 {
            return fail("memory.history_limit must be at least 1");
        }
        if self.batch.group_size == 0 {
            return fail("batch.group_size must be at least 1");
        }
        if self.batch.max_concurrent_groups == 0 {
            return fail("batch.max_concurrent_groups must be at least 1");
        }
        if self.batch.group_timeout_secs == 0 {
            return fail("batch.group_timeout_secs must be positive");
        }
        if self.retry.max_attempts == 0 {
            return fail("retry.max_attempts must be at least 1");
        }
        match self.persistence.provider.as_str() {
            "memory" => {}
            "postgres" if self.persistence.database_url.is_none() => {
                return fail("persistence.database_url is required for the postgres provider");
            }
            "postgres" => {}
            _ => return fail("persistence.provider must be `memory` or `postgres`"),
        }
        if memory.enabled && self.embedding.provider == "http" && self.embedding.base_url.is_none()
        {
            return fail("embedding.base_url is required for the http embedding provider");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> AppConfig {
        AppConfig {
            memory: MemoryConfig {
                enabled: true,
                similarity_threshold: 0.85,
                cooldown_days: 14,
                prefilter_days: None,
                required_count: 3,
                history_limit: 5,
                history_scope: HistoryScope::PerTarget,
            },
            batch: BatchConfig {
                group_size: 5,
                max_concurrent_groups: 20,
                parallel_enabled: true,
                group_timeout_secs: 300,
            },
            retry: RetryConfig {
                max_attempts: 3,
                initial_delay_ms: 500,
                max_delay_ms: 8_000,
            },
            persistence: PersistenceConfig {
                provider: "memory".into(),
                database_url: None,
                max_connections: 5,
            },
            embedding: EmbeddingConfig {
                provider: "http".into(),
                base_url: Some("http://localhost:8080".into()),
                api_key: None,
                model: "text-embedding-3-large".into(),
                dimensions: None,
                request_timeout_secs: 30,
            },
            generator: GeneratorConfig {
                base_url: None,
                api_key: None,
                model: "gpt-4o-mini".into(),
                temperature: 0.2,
                max_targets_per_subject: 30,
                request_timeout_secs: 120,
            },
            source: SourceConfig {
                subjects_file: None,
            },
        }
    }

    #[test]
    fn test_prefilter_defaults_to_cooldown() {
        let mut cfg = valid();
        assert_eq!(cfg.memory.prefilter_days(), 14);
        cfg.memory.prefilter_days = Some(7);
        assert_eq!(cfg.memory.prefilter_days(), 7);
    }

    #[test]
    fn test_validate_ranges() {
        assert!(valid().validate().is_ok());

        let mut cfg = valid();
        cfg.memory.similarity_threshold = 1.2;
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.memory.cooldown_days = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.batch.group_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.persistence.provider = "postgres".into();
        assert!(cfg.validate().is_err());
        cfg.persistence.database_url = Some("postgres://localhost/recmem".into());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_embedding_endpoint_only_needed_with_memory() {
        let mut cfg = valid();
        cfg.embedding.base_url = None;
        assert!(cfg.validate().is_err());
        cfg.memory.enabled = false;
        assert!(cfg.validate().is_ok());
    }
}
