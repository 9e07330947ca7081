//! Configuration for Refinr.
//!
//! Lookup order:
//! 1. Explicit path if provided
//! 2. ~/.config/refinr/refinr.yml
//! 3. ./refinr.yml
//! 4. Default values
//!
//! Environment variables (`MODEL_TASK`, `MODEL_META`, `MAX_ITERS`) and CLI
//! flags are applied on top as `ConfigOverrides`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RefinrError, Result};
use crate::llm::gradient::{DEFAULT_API_KEY_ENV, DEFAULT_BASE_URL};
use crate::llm::{CallSettings, GradientConfig, RetryPolicy};
use crate::refine::{DEFAULT_MAX_ITERATIONS, RefineSettings};
use crate::rubric::{Rubric, RubricItem, default_items};

/// Default model for both task and meta calls
pub const DEFAULT_MODEL: &str = "llama3.3-70b-instruct";

pub const ENV_MODEL_TASK: &str = "MODEL_TASK";
pub const ENV_MODEL_META: &str = "MODEL_META";
pub const ENV_MAX_ITERS: &str = "MAX_ITERS";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub llm: LlmConfig,
    pub task: TaskModelConfig,
    pub meta: MetaModelConfig,
    pub refine: RefineConfig,
    pub retry: RetryConfig,
    pub rubric: Vec<RubricItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            timeout_ms: 120000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskModelConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub system: String,
}

impl Default for TaskModelConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.2,
            max_tokens: 700,
            system: "You are a helpful market-research assistant.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaModelConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub system: String,
}

impl Default for MetaModelConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            max_tokens: 300,
            system: "You rewrite prompts to improve LLM output quality.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineConfig {
    pub max_iterations: u32,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            llm: LlmConfig::default(),
            task: TaskModelConfig::default(),
            meta: MetaModelConfig::default(),
            refine: RefineConfig::default(),
            retry: RetryConfig::default(),
            rubric: default_items(),
        }
    }
}

/// Runtime overrides from the environment or CLI flags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub task_model: Option<String>,
    pub meta_model: Option<String>,
    pub max_iterations: Option<u32>,
}

impl ConfigOverrides {
    /// Read overrides through `lookup` (normally `std::env::var`)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_iterations = match lookup(ENV_MAX_ITERS) {
            Some(raw) => Some(raw.trim().parse::<u32>().map_err(|_| {
                RefinrError::InvalidConfig(format!("{} must be a positive integer, got '{}'", ENV_MAX_ITERS, raw))
            })?),
            None => None,
        };

        Ok(Self {
            task_model: lookup(ENV_MODEL_TASK).filter(|s| !s.trim().is_empty()),
            meta_model: lookup(ENV_MODEL_META).filter(|s| !s.trim().is_empty()),
            max_iterations,
        })
    }

    /// Read overrides from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Check if any overrides are set
    pub fn is_empty(&self) -> bool {
        self.task_model.is_none() && self.meta_model.is_none() && self.max_iterations.is_none()
    }

    /// Layer `other` on top; its set fields win
    pub fn merge(self, other: ConfigOverrides) -> Self {
        Self {
            task_model: other.task_model.or(self.task_model),
            meta_model: other.meta_model.or(self.meta_model),
            max_iterations: other.max_iterations.or(self.max_iterations),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let project_name = env!("CARGO_PKG_NAME");

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config: Self = serde_yaml::from_str(&content)?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Apply overrides in place
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(model) = &overrides.task_model {
            self.task.model = model.clone();
        }
        if let Some(model) = &overrides.meta_model {
            self.meta.model = model.clone();
        }
        if let Some(max) = overrides.max_iterations {
            self.refine.max_iterations = max;
        }
    }

    /// Resolve the inference credential through `lookup`
    pub fn api_key_from<F>(&self, lookup: F) -> Result<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup(&self.llm.api_key_env)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| RefinrError::MissingCredential {
                env_var: self.llm.api_key_env.clone(),
            })
    }

    /// Resolve the inference credential from the process environment
    pub fn api_key(&self) -> Result<String> {
        self.api_key_from(|key| std::env::var(key).ok())
    }

    pub fn gradient_config(&self) -> GradientConfig {
        GradientConfig {
            base_url: self.llm.base_url.clone(),
            timeout: Duration::from_millis(self.llm.timeout_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts.max(1),
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }

    /// Parsed `log_level`, `info` when unset
    pub fn log_filter(&self) -> Result<log::LevelFilter> {
        match &self.log_level {
            None => Ok(log::LevelFilter::Info),
            Some(level) => level
                .parse()
                .map_err(|_| RefinrError::InvalidConfig(format!("unknown log_level '{}'", level))),
        }
    }

    /// Validate and convert into loop settings
    pub fn refine_settings(&self) -> Result<RefineSettings> {
        if self.refine.max_iterations == 0 {
            return Err(RefinrError::InvalidConfig("max_iterations must be at least 1".to_string()));
        }

        Ok(RefineSettings {
            task: CallSettings {
                model: self.task.model.clone(),
                system: self.task.system.clone(),
                temperature: self.task.temperature,
                max_tokens: self.task.max_tokens,
            },
            meta: CallSettings {
                model: self.meta.model.clone(),
                system: self.meta.system.clone(),
                temperature: self.meta.temperature,
                max_tokens: self.meta.max_tokens,
            },
            max_iterations: self.refine.max_iterations,
            retry: self.retry_policy(),
            rubric: Rubric::new(self.rubric.clone())?,
        })
    }
}
