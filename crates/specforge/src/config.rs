//! Configuration parsing
//!
//! Reads settings from `~/.specforge/config.toml` (honoring
//! `SPECFORGE_HOME`). Every field has a default, so a missing file is
//! a valid configuration. API keys never live here: `GITHUB_TOKEN`
//! and `OPENROUTER_API_KEY` come from the environment.
//!
//! ```toml
//! [run]
//! max_concurrent_fetches = 4
//! max_gap_iterations = 3
//! out_dir = "specs"
//!
//! [llm]
//! model = "anthropic/claude-sonnet-4.5"
//! ```

use serde::Deserialize;
use specforge_bridge::GapLoopConfig;
use specforge_protocol::defaults::{
    DEFAULT_MAX_GAP_ITERS, DEFAULT_MAX_REPAIR_ATTEMPTS, DEFAULT_MIN_CITATION_COVERAGE,
    DEFAULT_STABILITY_EVIDENCE_FLOOR,
};
use specforge_protocol::report::QualityConfig;
use std::path::Path;

/// Error type for config operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub run: RunSection,

    #[serde(default)]
    pub github: GithubSection,

    #[serde(default)]
    pub llm: LlmSection,

    #[serde(default)]
    pub cache: CacheSection,
}

/// Run-wide knobs: concurrency, iteration ceilings, budget, output.
#[derive(Debug, Clone, Deserialize)]
pub struct RunSection {
    /// Parallel GitHub fetches while building evidence packs.
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    #[serde(default = "default_max_gap_iterations")]
    pub max_gap_iterations: u32,

    #[serde(default = "default_max_repair_attempts")]
    pub max_repair_attempts: u32,

    #[serde(default = "default_min_citation_coverage")]
    pub min_citation_coverage: f64,

    #[serde(default = "default_stability_evidence_floor")]
    pub stability_evidence_floor: usize,

    /// Hard ceiling on LLM calls for the whole run. Unset = unlimited.
    #[serde(default)]
    pub max_llm_calls: Option<u64>,

    /// Wall-clock budget for the whole run. Unset = unlimited.
    #[serde(default)]
    pub deadline_minutes: Option<u64>,

    /// Artifact directory, relative to the working directory unless
    /// absolute. Overridable with `run --out`.
    #[serde(default = "default_out_dir")]
    pub out_dir: String,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent_fetches(),
            max_gap_iterations: default_max_gap_iterations(),
            max_repair_attempts: default_max_repair_attempts(),
            min_citation_coverage: default_min_citation_coverage(),
            stability_evidence_floor: default_stability_evidence_floor(),
            max_llm_calls: None,
            deadline_minutes: None,
            out_dir: default_out_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubSection {
    #[serde(default = "default_github_api_base")]
    pub api_base: String,

    /// Issues fetched per repo for the initial evidence pack.
    #[serde(default = "default_issues_per_repo")]
    pub issues_per_repo: usize,

    #[serde(default = "default_releases_per_repo")]
    pub releases_per_repo: usize,

    /// Root listing entries kept on the file-listing evidence item.
    #[serde(default = "default_listing_max_entries")]
    pub listing_max_entries: usize,

    #[serde(default = "default_github_timeout")]
    pub timeout_seconds: u64,
}

impl Default for GithubSection {
    fn default() -> Self {
        Self {
            api_base: default_github_api_base(),
            issues_per_repo: default_issues_per_repo(),
            releases_per_repo: default_releases_per_repo(),
            listing_max_entries: default_listing_max_entries(),
            timeout_seconds: default_github_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// OpenRouter-compatible chat completions base URL.
    #[serde(default = "default_llm_api_base")]
    pub api_base: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            api_base: default_llm_api_base(),
            model: default_llm_model(),
            max_tokens: default_llm_max_tokens(),
            timeout_seconds: default_llm_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    #[serde(default = "default_cache_ttl_hours")]
    pub ttl_hours: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_hours: default_cache_ttl_hours(),
        }
    }
}

impl Config {
    /// Load from a path; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load from `$SPECFORGE_HOME/config.toml`.
    pub fn load_default() -> Result<Self> {
        Self::load(&specforge_logging::specforge_home().join("config.toml"))
    }

    pub fn quality(&self) -> QualityConfig {
        QualityConfig {
            require_non_empty: true,
            min_coverage_ratio: self.run.min_citation_coverage,
        }
    }

    pub fn gap_loop(&self) -> GapLoopConfig {
        GapLoopConfig {
            max_iters: self.run.max_gap_iterations,
            max_repair_attempts: self.run.max_repair_attempts,
            quality: self.quality(),
            stability_evidence_floor: self.run.stability_evidence_floor,
        }
    }
}

fn default_max_concurrent_fetches() -> usize { 4 }
fn default_max_gap_iterations() -> u32 { DEFAULT_MAX_GAP_ITERS }
fn default_max_repair_attempts() -> u32 { DEFAULT_MAX_REPAIR_ATTEMPTS }
fn default_min_citation_coverage() -> f64 { DEFAULT_MIN_CITATION_COVERAGE }
fn default_stability_evidence_floor() -> usize { DEFAULT_STABILITY_EVIDENCE_FLOOR }
fn default_out_dir() -> String { "specs".to_string() }
fn default_github_api_base() -> String { "https://api.github.com".to_string() }
fn default_issues_per_repo() -> usize { 5 }
fn default_releases_per_repo() -> usize { 3 }
fn default_listing_max_entries() -> usize { 40 }
fn default_github_timeout() -> u64 { 20 }
fn default_llm_api_base() -> String { "https://openrouter.ai/api/v1".to_string() }
fn default_llm_model() -> String { "anthropic/claude-sonnet-4.5".to_string() }
fn default_llm_max_tokens() -> u32 { 8192 }
fn default_llm_timeout() -> u64 { 120 }
fn default_cache_enabled() -> bool { true }
fn default_cache_ttl_hours() -> u64 { 24 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.run.max_concurrent_fetches, 4);
        assert_eq!(config.run.max_gap_iterations, DEFAULT_MAX_GAP_ITERS);
        assert_eq!(config.llm.model, "anthropic/claude-sonnet-4.5");
        assert!(config.cache.enabled);
        assert!(config.run.max_llm_calls.is_none());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [run]
            max_gap_iterations = 5
            max_llm_calls = 80

            [llm]
            model = "openai/gpt-4o-mini"
            "#,
        )
        .unwrap();
        assert_eq!(config.run.max_gap_iterations, 5);
        assert_eq!(config.run.max_llm_calls, Some(80));
        assert_eq!(config.run.max_repair_attempts, DEFAULT_MAX_REPAIR_ATTEMPTS);
        assert_eq!(config.llm.model, "openai/gpt-4o-mini");
        assert_eq!(config.llm.max_tokens, 8192);
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.run.out_dir, "specs");
    }

    #[test]
    fn test_gap_loop_config_mapping() {
        let config: Config = toml::from_str(
            r#"
            [run]
            max_gap_iterations = 2
            min_citation_coverage = 0.8
            "#,
        )
        .unwrap();
        let gap = config.gap_loop();
        assert_eq!(gap.max_iters, 2);
        assert!((gap.quality.min_coverage_ratio - 0.8).abs() < f64::EPSILON);
        assert!(gap.quality.require_non_empty);
    }
}
