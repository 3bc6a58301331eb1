//! Runtime configuration (spec §6 "Configuration keys"). Grounded on the
//! teacher's `src/config/mod.rs` defaulting idiom (`ClaudeConfig::default()`
//! / `for_master()` / `for_agent()`), adapted from hand-built structs to
//! `.env`-sourced settings via `dotenvy`, since the spec's configuration
//! surface is entirely environment-variable driven rather than file-based.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::dashboard::cost::ModelCostTable;
use crate::domain::AiCli;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelProfileName {
    Standard,
    Performance,
}

use serde::{Deserialize, Serialize};

impl ModelProfileName {
    fn as_env_segment(self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::Performance => "PERFORMANCE",
        }
    }

    fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "performance" => Self::Performance,
            _ => Self::Standard,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerCliMode {
    Uniform,
    PerWorker,
}

impl WorkerCliMode {
    fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "per_worker" => Self::PerWorker,
            _ => Self::Uniform,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelProfileConfig {
    pub cli: AiCli,
    pub admin_model: String,
    pub worker_model: String,
    pub max_workers: u32,
    pub thinking_multiplier: f64,
    pub admin_thinking_tokens: Option<u64>,
    pub worker_thinking_tokens: Option<u64>,
    pub admin_reasoning_effort: Option<String>,
    pub worker_reasoning_effort: Option<String>,
}

impl ModelProfileConfig {
    fn for_profile(name: ModelProfileName, default_cli: AiCli, default_admin_model: &str, default_worker_model: &str) -> Self {
        let seg = name.as_env_segment();
        Self {
            cli: env_string(&format!("MCP_MODEL_PROFILE_{seg}_CLI"), "")
                .and_then(|v| AiCli::parse(&v).ok())
                .unwrap_or(default_cli),
            admin_model: env_var(&format!("MCP_MODEL_PROFILE_{seg}_ADMIN_MODEL")).unwrap_or_else(|| default_admin_model.to_string()),
            worker_model: env_var(&format!("MCP_MODEL_PROFILE_{seg}_WORKER_MODEL")).unwrap_or_else(|| default_worker_model.to_string()),
            max_workers: env_u32(&format!("MCP_MODEL_PROFILE_{seg}_MAX_WORKERS"), 6),
            thinking_multiplier: env_f64(&format!("MCP_MODEL_PROFILE_{seg}_THINKING_MULTIPLIER"), 1.0),
            admin_thinking_tokens: env_var(&format!("MCP_MODEL_PROFILE_{seg}_ADMIN_THINKING_TOKENS")).and_then(|v| v.parse().ok()),
            worker_thinking_tokens: env_var(&format!("MCP_MODEL_PROFILE_{seg}_WORKER_THINKING_TOKENS")).and_then(|v| v.parse().ok()),
            admin_reasoning_effort: env_var(&format!("MCP_MODEL_PROFILE_{seg}_ADMIN_REASONING_EFFORT")),
            worker_reasoning_effort: env_var(&format!("MCP_MODEL_PROFILE_{seg}_WORKER_REASONING_EFFORT")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthcheckSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    pub failure_threshold: u32,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub max_workers: u32,
    pub enable_git: bool,
    pub enable_worktree: bool,

    pub model_profile_active: ModelProfileName,
    pub model_profile_standard: ModelProfileConfig,
    pub model_profile_performance: ModelProfileConfig,

    pub worker_cli_mode: WorkerCliMode,
    pub worker_cli_overrides: HashMap<u32, AiCli>,
    pub worker_model_overrides: HashMap<u32, String>,

    pub cost_warning_threshold_usd: Option<f64>,
    pub model_cost_default_per_1k: f64,
    pub model_cost_table_json: Option<String>,

    pub healthcheck: HealthcheckSettings,
    pub quality_gate_strict: bool,
    pub quality_check_max_iterations: u32,
    pub quality_check_same_issue_limit: u32,

    pub project_root: PathBuf,
    pub mcp_dir: String,
}

const MAX_WORKERS_HARD_CAP: u32 = 16;

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_string(key: &str, default: &str) -> Option<String> {
    env_var(key).or_else(|| if default.is_empty() { None } else { Some(default.to_string()) })
}

fn env_bool(key: &str, default: bool) -> bool {
    env_var(key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env_var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env_var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Settings {
    /// Load from the process environment, consulting `.env` via `dotenvy`
    /// first (missing file is not an error — matches the teacher's
    /// tolerant-default posture for optional config).
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();

        let max_workers = env_u32("MCP_MAX_WORKERS", 6).min(MAX_WORKERS_HARD_CAP);

        let mut worker_cli_overrides = HashMap::new();
        let mut worker_model_overrides = HashMap::new();
        for n in 1..=MAX_WORKERS_HARD_CAP {
            if let Some(cli) = env_var(&format!("MCP_WORKER_CLI_{n}")).and_then(|v| AiCli::parse(&v).ok()) {
                worker_cli_overrides.insert(n, cli);
            }
            if let Some(model) = env_var(&format!("MCP_WORKER_MODEL_{n}")) {
                worker_model_overrides.insert(n, model);
            }
        }

        Self {
            max_workers,
            enable_git: env_bool("MCP_ENABLE_GIT", true),
            enable_worktree: env_bool("MCP_ENABLE_WORKTREE", true),

            model_profile_active: env_var("MCP_MODEL_PROFILE_ACTIVE")
                .map(|v| ModelProfileName::parse(&v))
                .unwrap_or(ModelProfileName::Standard),
            model_profile_standard: ModelProfileConfig::for_profile(
                ModelProfileName::Standard,
                AiCli::Claude,
                "claude-3-5-sonnet",
                "claude-3-5-haiku",
            ),
            model_profile_performance: ModelProfileConfig::for_profile(
                ModelProfileName::Performance,
                AiCli::Claude,
                "claude-3-5-opus",
                "claude-3-5-sonnet",
            ),

            worker_cli_mode: env_var("MCP_WORKER_CLI_MODE")
                .map(|v| WorkerCliMode::parse(&v))
                .unwrap_or(WorkerCliMode::Uniform),
            worker_cli_overrides,
            worker_model_overrides,

            cost_warning_threshold_usd: env_var("MCP_COST_WARNING_THRESHOLD_USD").and_then(|v| v.parse().ok()),
            model_cost_default_per_1k: env_f64("MCP_MODEL_COST_DEFAULT_PER_1K", 1.0),
            model_cost_table_json: env_var("MCP_MODEL_COST_TABLE_JSON"),

            healthcheck: HealthcheckSettings {
                enabled: env_bool("MCP_HEALTHCHECK_ENABLED", true),
                interval_secs: env_var("MCP_HEALTHCHECK_INTERVAL_SECS").and_then(|v| v.parse().ok()).unwrap_or(60),
                failure_threshold: env_u32("MCP_HEALTHCHECK_FAILURE_THRESHOLD", 3),
            },
            quality_gate_strict: env_bool("MCP_QUALITY_GATE_STRICT", true),
            quality_check_max_iterations: env_u32("MCP_QUALITY_CHECK_MAX_ITERATIONS", 3),
            quality_check_same_issue_limit: env_u32("MCP_QUALITY_CHECK_SAME_ISSUE_LIMIT", 2),

            project_root: env_var("MCP_PROJECT_ROOT").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
            mcp_dir: env_string("MCP_MCP_DIR", ".multi-agent-mcp").unwrap_or_else(|| ".multi-agent-mcp".to_string()),
        }
    }

    pub fn active_model_profile(&self) -> &ModelProfileConfig {
        match self.model_profile_active {
            ModelProfileName::Standard => &self.model_profile_standard,
            ModelProfileName::Performance => &self.model_profile_performance,
        }
    }

    /// Build the cost table consulted by `record_api_call`, parsing
    /// `MCP_MODEL_COST_TABLE_JSON` (a flat `"cli:model" -> usd/1k` map) and
    /// falling back to the global default rate on parse failure rather than
    /// failing the whole settings load.
    pub fn model_cost_table(&self) -> ModelCostTable {
        let rates: HashMap<String, f64> = self
            .model_cost_table_json
            .as_deref()
            .and_then(|json| serde_json::from_str(json).ok())
            .unwrap_or_default();

        let mut default_worker_model = HashMap::new();
        default_worker_model.insert(AiCli::Claude, self.active_model_profile().worker_model.clone());

        ModelCostTable {
            rates,
            default_per_1k: self.model_cost_default_per_1k,
            default_worker_model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_mcp_env() {
        for (key, _) in std::env::vars() {
            if key.starts_with("MCP_") {
                std::env::remove_var(key);
            }
        }
    }

    #[test]
    #[serial]
    fn max_workers_is_capped_at_hard_limit() {
        clear_mcp_env();
        std::env::set_var("MCP_MAX_WORKERS", "99");
        let settings = Settings::load();
        assert_eq!(settings.max_workers, MAX_WORKERS_HARD_CAP);
        clear_mcp_env();
    }

    #[test]
    #[serial]
    fn defaults_are_sane_when_unset() {
        clear_mcp_env();
        let settings = Settings::load();
        assert_eq!(settings.max_workers, 6);
        assert!(settings.enable_git);
        assert!(settings.quality_gate_strict);
        assert_eq!(settings.model_profile_active, ModelProfileName::Standard);
    }

    #[test]
    #[serial]
    fn worker_overrides_are_parsed_by_index() {
        clear_mcp_env();
        std::env::set_var("MCP_WORKER_CLI_MODE", "per_worker");
        std::env::set_var("MCP_WORKER_CLI_3", "codex");
        std::env::set_var("MCP_WORKER_MODEL_3", "gpt-5-codex");
        let settings = Settings::load();
        assert_eq!(settings.worker_cli_mode, WorkerCliMode::PerWorker);
        assert_eq!(settings.worker_cli_overrides.get(&3), Some(&AiCli::Codex));
        assert_eq!(settings.worker_model_overrides.get(&3).map(String::as_str), Some("gpt-5-codex"));
        clear_mcp_env();
    }

    #[test]
    #[serial]
    fn model_cost_table_json_parses_into_rate_map() {
        clear_mcp_env();
        std::env::set_var("MCP_MODEL_COST_TABLE_JSON", r#"{"claude:claude-3-5-sonnet": 3.0}"#);
        let settings = Settings::load();
        let table = settings.model_cost_table();
        assert_eq!(table.rates.get("claude:claude-3-5-sonnet"), Some(&3.0));
        clear_mcp_env();
    }
}
