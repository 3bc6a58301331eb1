//! Completion Quality Gate (spec §4.I): the checks that run when an Admin
//! reports `task_complete` to the Owner. Grounded on
//! `original_source/src/tools/ipc.py`'s `_validate_admin_completion_gate`
//! and the branch-integration predicates in [`crate::git`].

use crate::dashboard::Dashboard;
use crate::domain::{Task, TaskStatus};
use crate::git::{self, BranchIntegrationState};

#[derive(Debug, Clone, Default)]
pub struct GateReport {
    pub status_needs_replan: bool,
    pub reasons: Vec<String>,
    pub suggestions: Vec<String>,
    pub branch_integration: Vec<BranchIntegrationState>,
}

impl GateReport {
    fn push(&mut self, reason: impl Into<String>, suggestion: impl Into<String>) {
        self.status_needs_replan = true;
        self.reasons.push(reason.into());
        self.suggestions.push(suggestion.into());
    }
}

/// `strict=false` (the `MCP_QUALITY_GATE_STRICT=false` setting) always
/// passes without consulting git, since evaluating it requires a live
/// repository.
pub async fn evaluate(dashboard: &Dashboard, repo_path: &str, current_head_branch: &str, strict: bool) -> GateReport {
    let mut report = GateReport::default();
    if !strict {
        return report;
    }

    let outstanding: Vec<&Task> = dashboard
        .tasks
        .iter()
        .filter(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::InProgress | TaskStatus::Failed))
        .collect();
    if !outstanding.is_empty() {
        report.push(
            format!("未完了のタスクが {} 件あります", outstanding.len()),
            "保留中/進行中/失敗タスクを解消してから再報告してください",
        );
    }

    let completed: Vec<&Task> = dashboard.tasks.iter().filter(|t| t.status == TaskStatus::Completed).collect();
    let quality_proofs: Vec<&&Task> = completed.iter().filter(|t| t.is_quality_proof()).collect();
    if quality_proofs.is_empty() {
        report.push(
            "品質検証タスク（qa/test/e2e 等）が見つかりません",
            "QA・テスト・検証タスクを少なくとも1つ完了させてください",
        );
    }

    let has_ui_related = dashboard.tasks.iter().any(|t| t.is_ui_related());
    if has_ui_related && !quality_proofs.iter().any(|t| t.is_playwright_proof()) {
        report.push(
            "UI関連タスクがありますが Playwright 検証が見つかりません",
            "Playwright による UI 検証タスクを完了させてください",
        );
    }

    let branches: Vec<String> = completed
        .iter()
        .filter_map(|t| t.branch.clone())
        .filter(|b| b != current_head_branch)
        .collect();
    if !branches.is_empty() {
        let states = git::check_branch_integration_state(repo_path, &branches).await;
        let not_integrated: Vec<&BranchIntegrationState> = states.iter().filter(|s| !s.is_integrated()).collect();
        if !not_integrated.is_empty() {
            let names: Vec<String> = not_integrated.iter().take(5).map(|s| s.branch.clone()).collect();
            report.push(
                format!("未統合の完了タスクブランチがあります: {}", names.join(", ")),
                "ブランチを base へマージしてから再報告してください",
            );
        }
        report.branch_integration = states;
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::Dashboard as DashboardState;

    fn dashboard_with(tasks: Vec<Task>) -> DashboardState {
        let mut d = DashboardState::new("ws1", "/tmp/ws");
        d.tasks = tasks;
        d
    }

    #[tokio::test]
    async fn strict_false_always_passes() {
        let d = dashboard_with(vec![Task::new("t1", "Anything")]);
        let report = evaluate(&d, "/tmp/does-not-matter", "main", false).await;
        assert!(!report.status_needs_replan);
    }

    #[tokio::test]
    async fn outstanding_tasks_block_completion() {
        let mut t = Task::new("t1", "Run e2e suite");
        t.status = TaskStatus::Pending;
        let d = dashboard_with(vec![t]);
        let report = evaluate(&d, "/tmp", "main", true).await;
        assert!(report.status_needs_replan);
        assert!(report.reasons.iter().any(|r| r.contains("未完了")));
    }

    #[tokio::test]
    async fn missing_quality_proof_blocks_completion() {
        let mut t = Task::new("t1", "Build widget");
        t.status = TaskStatus::Completed;
        let d = dashboard_with(vec![t]);
        let report = evaluate(&d, "/tmp", "main", true).await;
        assert!(report.reasons.iter().any(|r| r.contains("品質検証")));
    }

    #[tokio::test]
    async fn ui_task_without_playwright_proof_blocks_completion() {
        let mut ui_task = Task::new("t1", "Fix frontend screen");
        ui_task.status = TaskStatus::Completed;
        let mut qa_task = Task::new("t2", "Run qa checks");
        qa_task.status = TaskStatus::Completed;
        let d = dashboard_with(vec![ui_task, qa_task]);
        let report = evaluate(&d, "/tmp", "main", true).await;
        assert!(report.reasons.iter().any(|r| r.contains("Playwright")));
    }

    #[tokio::test]
    async fn all_conditions_satisfied_passes() {
        let mut t = Task::new("t1", "Run playwright e2e for UI frontend");
        t.status = TaskStatus::Completed;
        let d = dashboard_with(vec![t]);
        let report = evaluate(&d, "/tmp", "main", true).await;
        assert!(!report.status_needs_replan);
    }
}
