use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::role::AiCli;

/// Origin of a cost figure: `actual` snapshots come only from Claude's
/// statusLine; everything else is model-table estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostSource {
    Estimated,
    Actual,
}

/// Append-only API call record (spec §3 Cost record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCallRecord {
    pub ai_cli: AiCli,
    pub model: Option<String>,
    pub tokens: u64,
    pub estimated_cost_usd: f64,
    pub actual_cost_usd: Option<f64>,
    pub cost_source: CostSource,
    pub status_line: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub agent_id: Option<String>,
    pub task_id: Option<String>,
}

/// Cost rollup persisted as part of the dashboard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostInfo {
    pub calls: Vec<ApiCallRecord>,
    pub total_api_calls: u64,
    pub estimated_tokens: u64,
    pub estimated_cost_usd: f64,
    /// Sum of the *latest* actual snapshot per Claude agent — never a sum
    /// over all actual rows (spec §3, §8 invariant 4, §9).
    pub actual_cost_usd: f64,
    pub total_cost_usd: f64,
    pub warning_threshold_usd: Option<f64>,
    #[serde(default)]
    pub actual_cost_by_agent: std::collections::HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEstimate {
    pub total_api_calls: u64,
    pub estimated_tokens: u64,
    pub estimated_cost_usd: f64,
    pub actual_cost_usd: f64,
    pub total_cost_usd: f64,
    pub claude_calls: u64,
    pub codex_calls: u64,
    pub gemini_calls: u64,
    pub cursor_calls: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostSummary {
    pub estimate: CostEstimate,
    pub warning_threshold_usd: Option<f64>,
    pub warning_message: Option<String>,
}
