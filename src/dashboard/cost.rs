//! Cost accounting (spec §3 Cost record, §4.B cost operations, §9 "latest
//! snapshot not a sum"). Grounded on
//! `original_source/src/managers/dashboard_cost.py`.

use chrono::Utc;
use std::collections::HashMap;

use crate::domain::{AiCli, ApiCallRecord, CostEstimate, CostInfo, CostSource, CostSummary};

/// Model cost table: `"claude:claude-3.5-sonnet" -> usd per 1k tokens`.
#[derive(Debug, Clone, Default)]
pub struct ModelCostTable {
    pub rates: HashMap<String, f64>,
    pub default_per_1k: f64,
    /// Per-CLI default *worker* model, used when a call omits `model`.
    pub default_worker_model: HashMap<AiCli, String>,
}

impl ModelCostTable {
    fn rate_per_1k(&self, ai_cli: AiCli, model: Option<&str>) -> f64 {
        let lookup_model = model
            .map(|m| m.to_string())
            .or_else(|| self.default_worker_model.get(&ai_cli).cloned());
        if let Some(m) = lookup_model {
            let key = format!("{}:{}", ai_cli.as_str(), m);
            if let Some(rate) = self.rates.get(&key) {
                return *rate;
            }
        }
        self.default_per_1k
    }
}

pub struct RecordApiCallInput<'a> {
    pub ai_cli: AiCli,
    pub model: Option<String>,
    pub tokens: Option<u64>,
    pub agent_id: Option<String>,
    pub task_id: Option<String>,
    pub actual_cost_usd: Option<f64>,
    pub status_line: Option<String>,
    pub cost_source: Option<CostSource>,
    pub default_tokens_per_call: u64,
    pub table: &'a ModelCostTable,
}

/// Build the record to append and apply §3's rule that actual-cost fields
/// are only retained for `ai_cli=claude ∧ cost_source=actual`.
pub fn build_record(input: RecordApiCallInput) -> ApiCallRecord {
    let tokens = input.tokens.unwrap_or(input.default_tokens_per_call);
    let estimated_cost_usd = (tokens as f64 / 1000.0) * input.table.rate_per_1k(input.ai_cli, input.model.as_deref());

    let requested_source = input
        .cost_source
        .unwrap_or(if input.actual_cost_usd.is_some() {
            CostSource::Actual
        } else {
            CostSource::Estimated
        });

    let (actual_cost_usd, status_line, cost_source) =
        if input.ai_cli == AiCli::Claude && requested_source == CostSource::Actual {
            (input.actual_cost_usd, input.status_line, CostSource::Actual)
        } else {
            (None, None, CostSource::Estimated)
        };

    ApiCallRecord {
        ai_cli: input.ai_cli,
        model: input.model,
        tokens,
        estimated_cost_usd,
        actual_cost_usd,
        cost_source,
        status_line,
        timestamp: Utc::now(),
        agent_id: input.agent_id,
        task_id: input.task_id,
    }
}

/// Recompute the cost rollup from scratch, by replaying every call. This is
/// O(n) in call count but keeps the invariant trivially obvious to audit:
/// the actual total is always the sum of the *latest* per-agent snapshot,
/// never a running sum (spec §8 invariant 4).
pub fn recalculate(cost: &mut CostInfo) {
    let mut latest_actual_by_agent: HashMap<String, f64> = HashMap::new();
    for call in &cost.calls {
        if call.ai_cli == AiCli::Claude && call.cost_source == CostSource::Actual {
            if let (Some(agent_id), Some(actual)) = (&call.agent_id, call.actual_cost_usd) {
                latest_actual_by_agent.insert(agent_id.clone(), actual);
            }
        }
    }

    cost.total_api_calls = cost.calls.len() as u64;
    cost.estimated_tokens = cost.calls.iter().map(|c| c.tokens).sum();
    cost.estimated_cost_usd = cost.calls.iter().map(|c| c.estimated_cost_usd).sum();
    cost.actual_cost_usd = latest_actual_by_agent.values().sum();

    let estimated_non_actual: f64 = cost
        .calls
        .iter()
        .filter(|c| c.cost_source != CostSource::Actual)
        .map(|c| c.estimated_cost_usd)
        .sum();
    cost.total_cost_usd = cost.actual_cost_usd + estimated_non_actual;
    cost.actual_cost_by_agent = latest_actual_by_agent;
}

fn count_by_cli(calls: &[ApiCallRecord]) -> (u64, u64, u64, u64) {
    let mut counts = (0u64, 0u64, 0u64, 0u64);
    for c in calls {
        match c.ai_cli {
            AiCli::Claude => counts.0 += 1,
            AiCli::Codex => counts.1 += 1,
            AiCli::Gemini => counts.2 += 1,
            AiCli::Cursor => counts.3 += 1,
        }
    }
    counts
}

pub fn estimate(cost: &CostInfo) -> CostEstimate {
    let (claude, codex, gemini, cursor) = count_by_cli(&cost.calls);
    CostEstimate {
        total_api_calls: cost.total_api_calls,
        estimated_tokens: cost.estimated_tokens,
        estimated_cost_usd: round4(cost.estimated_cost_usd),
        actual_cost_usd: round4(cost.actual_cost_usd),
        total_cost_usd: round4(cost.total_cost_usd),
        claude_calls: claude,
        codex_calls: codex,
        gemini_calls: gemini,
        cursor_calls: cursor,
    }
}

pub fn summary(cost: &CostInfo) -> CostSummary {
    CostSummary {
        estimate: estimate(cost),
        warning_threshold_usd: cost.warning_threshold_usd,
        warning_message: check_warning(cost),
    }
}

pub fn check_warning(cost: &CostInfo) -> Option<String> {
    let threshold = cost.warning_threshold_usd?;
    if cost.total_cost_usd >= threshold {
        Some(format!(
            "cost warning: total ${:.4} has reached the ${:.2} threshold",
            cost.total_cost_usd, threshold
        ))
    } else {
        None
    }
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ModelCostTable {
        let mut rates = HashMap::new();
        rates.insert("claude:claude-3.5-sonnet".to_string(), 3.0);
        let mut default_worker_model = HashMap::new();
        default_worker_model.insert(AiCli::Claude, "claude-3.5-sonnet".to_string());
        ModelCostTable {
            rates,
            default_per_1k: 1.0,
            default_worker_model,
        }
    }

    #[test]
    fn non_claude_actual_is_coerced_to_estimated() {
        let record = build_record(RecordApiCallInput {
            ai_cli: AiCli::Codex,
            model: None,
            tokens: Some(1000),
            agent_id: Some("w1".into()),
            task_id: None,
            actual_cost_usd: Some(5.0),
            status_line: Some("whatever".into()),
            cost_source: Some(CostSource::Actual),
            default_tokens_per_call: 1000,
            table: &table(),
        });
        assert!(record.actual_cost_usd.is_none());
        assert!(record.status_line.is_none());
        assert_eq!(record.cost_source, CostSource::Estimated);
    }

    #[test]
    fn actual_total_uses_latest_snapshot_not_sum() {
        let mut cost = CostInfo::default();
        for actual in [1.0, 2.0, 3.0] {
            cost.calls.push(ApiCallRecord {
                ai_cli: AiCli::Claude,
                model: None,
                tokens: 100,
                estimated_cost_usd: 0.1,
                actual_cost_usd: Some(actual),
                cost_source: CostSource::Actual,
                status_line: None,
                timestamp: Utc::now(),
                agent_id: Some("a1".into()),
                task_id: None,
            });
        }
        recalculate(&mut cost);
        // latest snapshot (3.0), not 1+2+3=6.0
        assert_eq!(cost.actual_cost_usd, 3.0);
        assert_eq!(cost.total_cost_usd, 3.0);
    }

    #[test]
    fn total_cost_is_actual_plus_non_actual_estimated() {
        let mut cost = CostInfo::default();
        cost.calls.push(ApiCallRecord {
            ai_cli: AiCli::Claude,
            model: None,
            tokens: 100,
            estimated_cost_usd: 0.5,
            actual_cost_usd: Some(2.0),
            cost_source: CostSource::Actual,
            status_line: None,
            timestamp: Utc::now(),
            agent_id: Some("a1".into()),
            task_id: None,
        });
        cost.calls.push(ApiCallRecord {
            ai_cli: AiCli::Codex,
            model: None,
            tokens: 100,
            estimated_cost_usd: 0.3,
            actual_cost_usd: None,
            cost_source: CostSource::Estimated,
            status_line: None,
            timestamp: Utc::now(),
            agent_id: Some("a2".into()),
            task_id: None,
        });
        recalculate(&mut cost);
        assert_eq!(cost.total_cost_usd, 2.3);
    }

    #[test]
    fn rate_falls_back_to_default_worker_model_then_global_default() {
        let t = table();
        assert_eq!(t.rate_per_1k(AiCli::Claude, None), 3.0);
        assert_eq!(t.rate_per_1k(AiCli::Gemini, None), 1.0);
    }
}
