//! Runtime configuration.
//!
//! Loaded from a TOML file via [`Config::load`] with environment-variable
//! overrides applied on top, following the teacher's `tooling::config`
//! loader conventions: a field `cache_ttl_days` is overridden by
//! `RESEARCH_AGENTS_CACHE_TTL_DAYS`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tooling::config::{get_env_bool, get_env_parse_or};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub parallel_research: bool,
    pub use_reranker: bool,
    pub cache_ttl_days: u32,
    pub max_retries: u32,
    pub validation_threshold_cache: u8,
    pub validation_threshold_subquery: u8,
    pub quality_min_answer_len: usize,
    pub quality_min_confidence: f32,
    pub llm_timeout_s: u64,
    pub retrieval_timeout_s: u64,
    pub web_timeout_s: u64,
    pub subquery_budget_s: u64,
    pub turn_budget_s: u64,
    pub cache_build_wait_timeout_s: u64,
    pub memory_summary_token_budget: usize,
    pub reranker_pool_size: usize,
    pub reranker_top_n: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            parallel_research: true,
            use_reranker: false,
            cache_ttl_days: 30,
            max_retries: 3,
            validation_threshold_cache: 7,
            validation_threshold_subquery: 6,
            quality_min_answer_len: 100,
            quality_min_confidence: 0.7,
            llm_timeout_s: 30,
            retrieval_timeout_s: 15,
            web_timeout_s: 20,
            subquery_budget_s: 45,
            turn_budget_s: 120,
            cache_build_wait_timeout_s: 50,
            memory_summary_token_budget: 512,
            reranker_pool_size: 20,
            reranker_top_n: 5,
        }
    }
}

impl Config {
    /// Load `path` (if it exists) then apply `RESEARCH_AGENTS_*`
    /// environment overrides on top of either the file or the built-in
    /// default.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut config = if path.as_ref().exists() {
            let text = std::fs::read_to_string(path)?;
            toml::from_str(&text)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Falls back to the existing value on a missing or unparsable
    /// variable rather than propagating an error, matching `load`'s
    /// forgiving stance on a missing config file.
    fn apply_env_overrides(&mut self) {
        self.parallel_research = get_env_bool("RESEARCH_AGENTS_PARALLEL_RESEARCH")
            .ok()
            .flatten()
            .unwrap_or(self.parallel_research);
        self.use_reranker = get_env_bool("RESEARCH_AGENTS_USE_RERANKER")
            .ok()
            .flatten()
            .unwrap_or(self.use_reranker);
        self.cache_ttl_days =
            get_env_parse_or("RESEARCH_AGENTS_CACHE_TTL_DAYS", self.cache_ttl_days)
                .unwrap_or(self.cache_ttl_days);
        self.max_retries = get_env_parse_or("RESEARCH_AGENTS_MAX_RETRIES", self.max_retries)
            .unwrap_or(self.max_retries);
        self.turn_budget_s =
            get_env_parse_or("RESEARCH_AGENTS_TURN_BUDGET_S", self.turn_budget_s)
                .unwrap_or(self.turn_budget_s);
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_s)
    }

    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval_timeout_s)
    }

    pub fn web_timeout(&self) -> Duration {
        Duration::from_secs(self.web_timeout_s)
    }

    pub fn subquery_budget(&self) -> Duration {
        Duration::from_secs(self.subquery_budget_s)
    }

    pub fn turn_budget(&self) -> Duration {
        Duration::from_secs(self.turn_budget_s)
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.cache_ttl_days as i64)
    }

    pub fn cache_build_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.cache_build_wait_timeout_s)
    }
}
