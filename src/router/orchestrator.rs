//! 路由 / 编排器
//!
//! `run(objective)`：分解 -> 逐阶段分类选后端 -> 调用（超时 + 步数上限）-> 失败时至多一次回退 -> 产物前馈 -> 汇总报告。
//! 阶段严格串行；运行期间独占所需的自动化界面（租约在所有退出路径上随 Drop 释放）；取消在阶段边界检查。
//! 阶段内错误都转为 `ExecutionResult.error_kind`；`Err` 只用于运行开始前的装配错误。

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use uuid::Uuid;

use crate::backend::{BackendError, BackendOutput, BackendRegistry, PhaseRequest};
use crate::classify::TaskClassifier;
use crate::core::{
    Artifacts, BackendKind, Classification, ErrorKind, Objective, PilotError, RunSupervisor,
    Surface, SurfaceLease, SurfaceRegistry, TaskType,
};
use crate::decompose::Decomposer;
use crate::router::phase::{Phase, PhaseStatus};
use crate::router::report::{AttemptRecord, ExecutionResult, RunOutcome, RunReport};

/// 单个后端的资源上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendLimits {
    pub timeout: Duration,
    pub max_steps: u32,
}

/// 按任务类型开关回退
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackPolicy {
    pub desktop: bool,
    pub browser: bool,
    pub sequential: bool,
    pub ambiguous: bool,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            desktop: true,
            browser: true,
            sequential: true,
            ambiguous: true,
        }
    }
}

impl FallbackPolicy {
    pub fn disabled() -> Self {
        Self {
            desktop: false,
            browser: false,
            sequential: false,
            ambiguous: false,
        }
    }

    pub fn enabled_for(&self, task_type: TaskType) -> bool {
        match task_type {
            TaskType::Desktop => self.desktop,
            TaskType::Browser => self.browser,
            TaskType::Sequential => self.sequential,
            TaskType::Ambiguous => self.ambiguous,
        }
    }
}

/// 路由配置（由 config 模块构造，按值传入）
#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// Ambiguous 阶段使用的后端
    pub default_backend: BackendKind,
    /// 强制所有阶段走同一后端
    pub force_task_type: Option<BackendKind>,
    pub fallback: FallbackPolicy,
    /// 失败后不终止运行的阶段
    pub best_effort_phases: Vec<usize>,
    pub browser_profile: String,
    pub desktop: BackendLimits,
    pub browser: BackendLimits,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            default_backend: BackendKind::Desktop,
            force_task_type: None,
            fallback: FallbackPolicy::default(),
            best_effort_phases: Vec::new(),
            browser_profile: "default".to_string(),
            desktop: BackendLimits {
                timeout: Duration::from_secs(300),
                max_steps: 10,
            },
            browser: BackendLimits {
                timeout: Duration::from_secs(300),
                max_steps: 25,
            },
        }
    }
}

impl RouterSettings {
    pub fn limits(&self, kind: BackendKind) -> BackendLimits {
        match kind {
            BackendKind::Desktop => self.desktop,
            BackendKind::Browser => self.browser,
        }
    }
}

/// 文件找不到时向用户请求澄清
#[async_trait]
pub trait Clarifier: Send + Sync {
    /// 返回 None 表示没有答复
    async fn clarify(&self, phase_index: usize, question: &str) -> Option<String>;
}

struct Attempt {
    result: Result<BackendOutput, BackendError>,
    record: AttemptRecord,
}

/// 编排器
pub struct Orchestrator {
    classifier: TaskClassifier,
    decomposer: Decomposer,
    backends: BackendRegistry,
    surfaces: Arc<SurfaceRegistry>,
    settings: RouterSettings,
    supervisor: RunSupervisor,
    clarifier: Option<Arc<dyn Clarifier>>,
}

impl Orchestrator {
    pub fn new(backends: BackendRegistry, settings: RouterSettings) -> Self {
        Self {
            classifier: TaskClassifier::new(),
            decomposer: Decomposer::new(),
            backends,
            surfaces: SurfaceRegistry::new(),
            settings,
            supervisor: RunSupervisor::new(),
            clarifier: None,
        }
    }

    pub fn with_classifier(mut self, classifier: TaskClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_decomposer(mut self, decomposer: Decomposer) -> Self {
        self.decomposer = decomposer;
        self
    }

    /// 共享界面注册表（多个编排器之间互斥）
    pub fn with_surfaces(mut self, surfaces: Arc<SurfaceRegistry>) -> Self {
        self.surfaces = surfaces;
        self
    }

    pub fn with_clarifier(mut self, clarifier: Arc<dyn Clarifier>) -> Self {
        self.clarifier = Some(clarifier);
        self
    }

    pub fn supervisor(&self) -> &RunSupervisor {
        &self.supervisor
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    /// 分解并分类，得到阶段计划（不执行）
    pub fn plan(&self, text: &str) -> Vec<Phase> {
        let decomposition = self.decomposer.decompose_detailed(text);
        decomposition
            .segments
            .into_iter()
            .enumerate()
            .map(|(index, segment)| {
                let classification = if segment.degenerate {
                    Classification::ambiguous()
                } else {
                    self.classifier.classify(&segment.text)
                };
                let mut phase = Phase::new(index, segment.text, classification);
                if let Some(forced) = self.settings.force_task_type {
                    phase.task_type = forced.as_task_type();
                }
                phase.file_hints = segment.file_hints;
                phase.best_effort = self.settings.best_effort_phases.contains(&index);
                if segment.degenerate {
                    phase.status = PhaseStatus::Skipped;
                }
                phase
            })
            .collect()
    }

    fn primary_backend(&self, phase: &Phase) -> BackendKind {
        phase
            .task_type
            .backend()
            .unwrap_or_else(|| phase.classification.backend_or(self.settings.default_backend))
    }

    fn fallback_backend(&self, phase: &Phase, primary: BackendKind) -> Option<BackendKind> {
        let other = primary.other();
        (self.settings.fallback.enabled_for(phase.task_type) && self.backends.contains(other))
            .then_some(other)
    }

    /// 使用编排器自身的监管者运行
    pub async fn run(&self, objective: impl Into<Objective>) -> Result<RunReport, PilotError> {
        self.run_supervised(objective, &self.supervisor).await
    }

    /// 使用给定的监管者运行（每次运行可独立取消）
    pub async fn run_supervised(
        &self,
        objective: impl Into<Objective>,
        supervisor: &RunSupervisor,
    ) -> Result<RunReport, PilotError> {
        let objective = objective.into();
        if objective.text().trim().is_empty() {
            return Err(PilotError::EmptyObjective);
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut phases = self.plan(objective.text());

        let mut surfaces: Vec<Surface> = Vec::new();
        for phase in phases.iter().filter(|p| p.status == PhaseStatus::Pending) {
            let primary = self.primary_backend(phase);
            if !self.backends.contains(primary) {
                return Err(PilotError::NoBackend(primary));
            }
            let mut kinds = vec![primary];
            kinds.extend(self.fallback_backend(phase, primary));
            for kind in kinds {
                let surface = Surface::for_backend(kind, &self.settings.browser_profile);
                if !surfaces.contains(&surface) {
                    surfaces.push(surface);
                }
            }
        }
        let lease = self.surfaces.try_acquire(&surfaces, run_id)?;

        tracing::info!(
            run_id = %run_id,
            phases = phases.len(),
            objective = %objective.text(),
            "run started"
        );

        let mut artifacts = objective.artifacts().clone();
        let mut carried_hints: Vec<String> = Vec::new();
        let mut results: Vec<ExecutionResult> = Vec::new();
        let mut outcome = RunOutcome::Completed;

        for index in 0..phases.len() {
            if phases[index].status == PhaseStatus::Skipped {
                tracing::warn!(phase = index, text = %phases[index].text, "degenerate phase skipped");
                results.push(ExecutionResult::skipped(
                    index,
                    ErrorKind::DecompositionDegenerate,
                    "segment too short to execute",
                ));
                continue;
            }

            if supervisor.is_cancelled() {
                tracing::info!(run_id = %run_id, next_phase = index, "run cancelled at phase boundary");
                for phase in phases[index..].iter_mut() {
                    if phase.status == PhaseStatus::Pending {
                        phase.advance(PhaseStatus::Skipped)?;
                        results.push(ExecutionResult::skipped(
                            phase.index,
                            ErrorKind::Cancelled,
                            "run cancelled",
                        ));
                    }
                }
                outcome = RunOutcome::Cancelled { next_phase: index };
                break;
            }

            let result = self
                .execute_phase(
                    run_id,
                    &mut phases[index],
                    &lease,
                    &artifacts,
                    &carried_hints,
                    supervisor,
                )
                .await?;

            if result.success {
                phases[index].produced_artifacts = result.artifacts.clone();
                artifacts.extend(result.artifacts.clone());
            }
            carried_hints.extend(phases[index].file_hints.iter().cloned());

            let halt = if result.success {
                None
            } else {
                match result.error_kind {
                    Some(ErrorKind::Cancelled) => Some(RunOutcome::Cancelled { next_phase: index }),
                    _ if phases[index].best_effort => {
                        tracing::warn!(phase = index, "best-effort phase failed, continuing");
                        None
                    }
                    Some(ErrorKind::FileNotFound) => Some(RunOutcome::NeedsClarification {
                        phase_index: index,
                        message: result
                            .error_message
                            .clone()
                            .unwrap_or_else(|| "file not found".to_string()),
                    }),
                    kind => Some(RunOutcome::Failed {
                        phase_index: index,
                        backend: result.attempts.last().map(|a| a.backend),
                        kind: kind.unwrap_or(ErrorKind::BackendFailure),
                    }),
                }
            };
            results.push(result);

            if let Some(halt) = halt {
                outcome = halt;
                break;
            }
        }

        drop(lease);

        let success = outcome == RunOutcome::Completed
            && results
                .iter()
                .all(|r| r.success || r.status == PhaseStatus::Skipped);
        let report = RunReport {
            run_id,
            objective: objective.text().to_string(),
            started_at,
            finished_at: Utc::now(),
            success,
            outcome,
            phases,
            results,
            artifacts,
        };
        tracing::info!(
            run_id = %run_id,
            success = report.success,
            outcome = ?report.outcome,
            "run finished"
        );
        Ok(report)
    }

    async fn execute_phase(
        &self,
        run_id: Uuid,
        phase: &mut Phase,
        lease: &SurfaceLease,
        artifacts: &Artifacts,
        carried_hints: &[String],
        supervisor: &RunSupervisor,
    ) -> Result<ExecutionResult, PilotError> {
        let primary = self.primary_backend(phase);
        let fallback = self.fallback_backend(phase, primary);
        if phase.task_type == TaskType::Ambiguous {
            tracing::info!(
                phase = phase.index,
                kind = ?ErrorKind::ClassificationAmbiguous,
                backend = %primary,
                "ambiguous phase routed to default backend"
            );
        }

        phase.advance(PhaseStatus::Running)?;
        let mut hints = carried_hints.to_vec();
        let mut attempts = Vec::new();

        let mut attempt = self
            .attempt(run_id, primary, phase, artifacts, &hints, lease, supervisor)
            .await;

        let missing = match &attempt.result {
            Err(BackendError::FileNotFound(description)) => Some(description.clone()),
            _ => None,
        };
        if let (Some(description), Some(clarifier)) = (missing, &self.clarifier) {
            let question = format!("Which file should be used for \"{description}\"?");
            if let Some(answer) = clarifier.clarify(phase.index, &question).await {
                tracing::info!(phase = phase.index, "clarification received, retrying phase");
                hints.push(answer);
                attempts.push(attempt.record);
                attempt = self
                    .attempt(run_id, primary, phase, artifacts, &hints, lease, supervisor)
                    .await;
            }
        }
        attempts.push(attempt.record);

        let mut result = ExecutionResult {
            phase_index: phase.index,
            primary_backend: Some(primary),
            backend_used: Some(primary),
            fell_back: false,
            success: false,
            error_kind: None,
            error_message: None,
            artifacts: Artifacts::new(),
            attempts,
            status: PhaseStatus::Running,
        };

        match (attempt.result, fallback) {
            (Ok(output), _) => {
                phase.advance(PhaseStatus::Succeeded)?;
                result.success = true;
                result.artifacts = output.artifacts;
            }
            (Err(error), Some(fallback)) if error.kind() == ErrorKind::BackendFailure => {
                tracing::warn!(
                    phase = phase.index,
                    primary = %primary,
                    fallback = %fallback,
                    error = %error,
                    "primary backend failed, falling back"
                );
                phase.advance(PhaseStatus::FellBack)?;
                result.fell_back = true;
                result.backend_used = Some(fallback);

                let second = self
                    .attempt(run_id, fallback, phase, artifacts, &hints, lease, supervisor)
                    .await;
                result.attempts.push(second.record);
                match second.result {
                    Ok(output) => {
                        phase.advance(PhaseStatus::Succeeded)?;
                        result.success = true;
                        result.artifacts = output.artifacts;
                    }
                    Err(second_error) => {
                        phase.advance(PhaseStatus::FellBackFailed)?;
                        result.error_kind = Some(match second_error.kind() {
                            ErrorKind::Cancelled => ErrorKind::Cancelled,
                            _ => ErrorKind::FallbackExhausted,
                        });
                        result.error_message =
                            Some(format!("{primary}: {error}; {fallback}: {second_error}"));
                    }
                }
            }
            (Err(error), _) => {
                phase.advance(PhaseStatus::Failed)?;
                result.error_kind = Some(error.kind());
                result.error_message = Some(error.to_string());
            }
        }

        result.status = phase.status;
        tracing::info!(
            phase = phase.index,
            status = %phase.status,
            backend = ?result.backend_used,
            fell_back = result.fell_back,
            "phase finished"
        );
        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    async fn attempt(
        &self,
        run_id: Uuid,
        kind: BackendKind,
        phase: &Phase,
        artifacts: &Artifacts,
        hints: &[String],
        lease: &SurfaceLease,
        supervisor: &RunSupervisor,
    ) -> Attempt {
        let limits = self.settings.limits(kind);
        let started = Instant::now();
        let (backend_name, result, steps_used) = match self.backends.get(kind) {
            None => (
                "unregistered".to_string(),
                Err(BackendError::SessionUnavailable(format!("no {kind} backend"))),
                0,
            ),
            Some(backend) => {
                let request = PhaseRequest {
                    phase_index: phase.index,
                    text: phase.text.clone(),
                    artifacts: artifacts.clone(),
                    file_hints: hints.to_vec(),
                    max_steps: limits.max_steps,
                    session: lease.session(kind, &self.settings.browser_profile),
                    cancel: supervisor.child_token(),
                };
                let (result, steps) = match timeout(limits.timeout, backend.execute(&request)).await {
                    Ok(Ok(output)) if !output.success => {
                        let steps = output.steps_used;
                        let message = output
                            .message
                            .unwrap_or_else(|| "backend reported failure".to_string());
                        (Err(BackendError::Failed(message)), steps)
                    }
                    Ok(Ok(output)) if output.steps_used > limits.max_steps => {
                        let used = output.steps_used;
                        (
                            Err(BackendError::StepBudgetExceeded {
                                used,
                                max: limits.max_steps,
                            }),
                            used,
                        )
                    }
                    Ok(Ok(output)) => {
                        let steps = output.steps_used;
                        (Ok(output), steps)
                    }
                    Ok(Err(e)) => (Err(e), 0),
                    Err(_) => {
                        request.cancel.cancel();
                        (Err(BackendError::Timeout(limits.timeout)), 0)
                    }
                };
                (backend.name().to_string(), result, steps)
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let error_kind = result.as_ref().err().map(BackendError::kind);
        let audit = serde_json::json!({
            "event": "backend_attempt",
            "run_id": run_id.to_string(),
            "phase": phase.index,
            "backend": kind,
            "backend_name": backend_name,
            "ok": result.is_ok(),
            "error_kind": error_kind,
            "duration_ms": duration_ms,
            "steps_used": steps_used,
        });
        tracing::info!(audit = %audit.to_string(), "backend");

        Attempt {
            record: AttemptRecord {
                backend: kind,
                backend_name,
                success: result.is_ok(),
                error_kind,
                duration_ms,
                steps_used,
            },
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, MockBackend};
    use crate::core::LAST_SAVED_FILE;
    use std::path::PathBuf;

    fn registry(desktop: &Arc<MockBackend>, browser: &Arc<MockBackend>) -> BackendRegistry {
        let mut registry = BackendRegistry::new();
        registry.register(desktop.clone());
        registry.register(browser.clone());
        registry
    }

    fn orchestrator(
        desktop: &Arc<MockBackend>,
        browser: &Arc<MockBackend>,
        settings: RouterSettings,
    ) -> Orchestrator {
        Orchestrator::new(registry(desktop, browser), settings)
    }

    #[tokio::test]
    async fn test_notepad_then_browser_runs_in_order() {
        let desktop = Arc::new(MockBackend::succeeding(BackendKind::Desktop));
        let browser = Arc::new(MockBackend::succeeding(BackendKind::Browser));
        let orch = orchestrator(&desktop, &browser, RouterSettings::default());

        let report = orch
            .run("open Notepad and write hello, then open browser and go to example.com")
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].backend_used, Some(BackendKind::Desktop));
        assert_eq!(report.results[1].backend_used, Some(BackendKind::Browser));
        assert!(report.phases.iter().all(|p| p.status == PhaseStatus::Succeeded));

        let first = &desktop.calls()[0];
        let second = &browser.calls()[0];
        assert!(first.finished_at <= second.started_at);
    }

    #[tokio::test]
    async fn test_fallback_success_is_single_hop() {
        let desktop = Arc::new(MockBackend::failing(BackendKind::Desktop));
        let browser = Arc::new(MockBackend::succeeding(BackendKind::Browser));
        let orch = orchestrator(&desktop, &browser, RouterSettings::default());

        let report = orch.run("open Notepad and write hello").await.unwrap();
        let result = &report.results[0];
        assert!(report.success);
        assert!(result.success);
        assert!(result.fell_back);
        assert_eq!(result.primary_backend, Some(BackendKind::Desktop));
        assert_eq!(result.backend_used, Some(BackendKind::Browser));
        assert_eq!(result.attempts.len(), 2);
        assert_eq!(result.status, PhaseStatus::Succeeded);
        assert_eq!(desktop.call_count(), 1);
        assert_eq!(browser.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fallback_exhausted_halts_run() {
        let desktop = Arc::new(MockBackend::failing(BackendKind::Desktop));
        let browser = Arc::new(MockBackend::failing(BackendKind::Browser));
        let orch = orchestrator(&desktop, &browser, RouterSettings::default());

        let report = orch.run("open notepad, then open calculator").await.unwrap();
        assert!(!report.success);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].error_kind, Some(ErrorKind::FallbackExhausted));
        assert_eq!(report.results[0].status, PhaseStatus::FellBackFailed);
        assert_eq!(
            report.outcome,
            RunOutcome::Failed {
                phase_index: 0,
                backend: Some(BackendKind::Browser),
                kind: ErrorKind::FallbackExhausted,
            }
        );
        assert_eq!(report.phases[1].status, PhaseStatus::Pending);
        assert_eq!(desktop.call_count(), 1);
        assert_eq!(browser.call_count(), 1);
    }

    #[tokio::test]
    async fn test_path_not_allowed_is_reported_without_fallback() {
        let desktop = Arc::new(MockBackend::succeeding(BackendKind::Desktop));
        let browser = Arc::new(MockBackend::erroring(
            BackendKind::Browser,
            BackendError::PathNotAllowed,
        ));
        let orch = orchestrator(&desktop, &browser, RouterSettings::default());

        let report = orch
            .run("attach the budget file to the email in Gmail")
            .await
            .unwrap();
        assert!(!report.success);
        assert_eq!(report.results[0].status, PhaseStatus::Failed);
        assert_eq!(report.results[0].error_kind, Some(ErrorKind::PathNotAllowed));
        assert!(!report.results[0].fell_back);
        assert_eq!(desktop.call_count(), 0);
    }

    #[tokio::test]
    async fn test_reported_failure_triggers_fallback() {
        let desktop = Arc::new(MockBackend::reporting_failure(BackendKind::Desktop));
        let browser = Arc::new(MockBackend::succeeding(BackendKind::Browser));
        let orch = orchestrator(&desktop, &browser, RouterSettings::default());

        let report = orch.run("open notepad").await.unwrap();
        assert!(report.results[0].fell_back);
        assert!(report.success);
    }

    #[tokio::test]
    async fn test_timeout_is_phase_failure_eligible_for_fallback() {
        let desktop = Arc::new(
            MockBackend::succeeding(BackendKind::Desktop).with_delay(Duration::from_millis(500)),
        );
        let browser = Arc::new(MockBackend::succeeding(BackendKind::Browser));
        let mut settings = RouterSettings::default();
        settings.desktop.timeout = Duration::from_millis(20);
        let orch = orchestrator(&desktop, &browser, settings);

        let report = orch.run("open notepad").await.unwrap();
        let result = &report.results[0];
        assert!(result.success);
        assert!(result.fell_back);
        assert_eq!(result.attempts[0].error_kind, Some(ErrorKind::BackendFailure));
    }

    #[tokio::test]
    async fn test_step_budget_exceeded_without_fallback_fails() {
        let desktop = Arc::new(MockBackend::succeeding(BackendKind::Desktop).with_steps(50));
        let mut registry = BackendRegistry::new();
        registry.register(desktop.clone());
        let orch = Orchestrator::new(registry, RouterSettings::default());

        let report = orch.run("open notepad").await.unwrap();
        assert!(!report.success);
        assert_eq!(report.results[0].status, PhaseStatus::Failed);
        assert_eq!(report.results[0].error_kind, Some(ErrorKind::BackendFailure));
        assert_eq!(report.results[0].attempts[0].steps_used, 50);
    }

    #[tokio::test]
    async fn test_fallback_disabled_for_task_type() {
        let desktop = Arc::new(MockBackend::failing(BackendKind::Desktop));
        let browser = Arc::new(MockBackend::succeeding(BackendKind::Browser));
        let settings = RouterSettings {
            fallback: FallbackPolicy::disabled(),
            ..RouterSettings::default()
        };
        let orch = orchestrator(&desktop, &browser, settings);

        let report = orch.run("open notepad").await.unwrap();
        assert!(!report.success);
        assert_eq!(browser.call_count(), 0);
    }

    #[tokio::test]
    async fn test_artifacts_and_file_hints_feed_forward() {
        let desktop = Arc::new(
            MockBackend::succeeding(BackendKind::Desktop)
                .with_artifact(LAST_SAVED_FILE, "/tmp/notes.docx"),
        );
        let browser = Arc::new(MockBackend::succeeding(BackendKind::Browser));
        let orch = orchestrator(&desktop, &browser, RouterSettings::default());

        let report = orch
            .run("open Word and save as notes.docx, then email the file via Gmail")
            .await
            .unwrap();
        assert!(report.success);
        assert!(desktop.calls()[0].artifacts.is_empty());

        let call = &browser.calls()[0];
        assert_eq!(
            call.artifacts.get(LAST_SAVED_FILE),
            Some(&PathBuf::from("/tmp/notes.docx"))
        );
        assert_eq!(call.file_hints, vec!["notes.docx"]);
        assert_eq!(
            report.phases[0].produced_artifacts.get(LAST_SAVED_FILE),
            Some(&PathBuf::from("/tmp/notes.docx"))
        );
    }

    struct CancellingBackend {
        supervisor: RunSupervisor,
    }

    #[async_trait]
    impl Backend for CancellingBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Desktop
        }

        fn name(&self) -> &str {
            "cancelling"
        }

        async fn execute(&self, _request: &PhaseRequest) -> Result<BackendOutput, BackendError> {
            self.supervisor.cancel();
            Ok(BackendOutput::succeeded())
        }
    }

    #[tokio::test]
    async fn test_cancellation_checked_at_phase_boundary() {
        let supervisor = RunSupervisor::new();
        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(CancellingBackend {
            supervisor: supervisor.clone(),
        }));
        let orch = Orchestrator::new(registry, RouterSettings::default());

        let report = orch
            .run_supervised("open notepad, then open calculator", &supervisor)
            .await
            .unwrap();
        assert!(!report.success);
        assert_eq!(report.outcome, RunOutcome::Cancelled { next_phase: 1 });
        assert!(report.results[0].success);
        assert_eq!(report.results[1].status, PhaseStatus::Skipped);
        assert_eq!(report.results[1].error_kind, Some(ErrorKind::Cancelled));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let desktop = Arc::new(MockBackend::succeeding(BackendKind::Desktop));
        let browser = Arc::new(MockBackend::succeeding(BackendKind::Browser));
        let orch = orchestrator(&desktop, &browser, RouterSettings::default());
        orch.supervisor().cancel();

        let report = orch.run("open notepad").await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Cancelled { next_phase: 0 });
        assert_eq!(desktop.call_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_runs_cannot_share_surface() {
        let surfaces = SurfaceRegistry::new();
        let slow = Arc::new(
            MockBackend::succeeding(BackendKind::Desktop).with_delay(Duration::from_millis(200)),
        );
        let mut first_registry = BackendRegistry::new();
        first_registry.register(slow.clone());
        let first = Orchestrator::new(first_registry, RouterSettings::default())
            .with_surfaces(surfaces.clone());

        let mut second_registry = BackendRegistry::new();
        second_registry.register(Arc::new(MockBackend::succeeding(BackendKind::Desktop)));
        let second = Orchestrator::new(second_registry, RouterSettings::default())
            .with_surfaces(surfaces.clone());

        let (a, b) = tokio::join!(first.run("open notepad"), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            second.run("open calculator").await
        });
        assert!(a.unwrap().success);
        assert!(matches!(b, Err(PilotError::SurfaceBusy { .. })));

        // 租约已释放
        assert!(!surfaces.is_held(&Surface::Desktop));
        assert!(second.run("open calculator").await.unwrap().success);
    }

    #[tokio::test]
    async fn test_best_effort_phase_does_not_halt() {
        let desktop = Arc::new(MockBackend::succeeding(BackendKind::Desktop));
        let browser = Arc::new(MockBackend::failing(BackendKind::Browser));
        let settings = RouterSettings {
            best_effort_phases: vec![0],
            fallback: FallbackPolicy::disabled(),
            ..RouterSettings::default()
        };
        let orch = orchestrator(&desktop, &browser, settings);

        let report = orch.run("go to example.com, then open notepad").await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert!(!report.success);
        assert_eq!(report.results.len(), 2);
        assert!(report.results[1].success);
    }

    struct FixedAnswer(Option<String>);

    #[async_trait]
    impl Clarifier for FixedAnswer {
        async fn clarify(&self, _phase_index: usize, _question: &str) -> Option<String> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn test_file_not_found_asks_for_clarification() {
        let desktop = Arc::new(MockBackend::succeeding(BackendKind::Desktop));
        let browser = Arc::new(MockBackend::requiring_file_hint(BackendKind::Browser));
        let orch = orchestrator(&desktop, &browser, RouterSettings::default())
            .with_clarifier(Arc::new(FixedAnswer(Some("n8n.docx".into()))));

        let report = orch.run("attach the n8n file to the Gmail draft").await.unwrap();
        assert!(report.success);
        assert!(!report.results[0].fell_back);
        assert_eq!(report.results[0].attempts.len(), 2);
        assert_eq!(browser.calls()[1].file_hints, vec!["n8n.docx"]);
        assert_eq!(desktop.call_count(), 0);
    }

    #[tokio::test]
    async fn test_file_not_found_without_answer_needs_clarification() {
        let desktop = Arc::new(MockBackend::succeeding(BackendKind::Desktop));
        let browser = Arc::new(MockBackend::requiring_file_hint(BackendKind::Browser));
        let orch = orchestrator(&desktop, &browser, RouterSettings::default())
            .with_clarifier(Arc::new(FixedAnswer(None)));

        let report = orch.run("attach the n8n file to the Gmail draft").await.unwrap();
        assert!(!report.success);
        assert!(matches!(
            report.outcome,
            RunOutcome::NeedsClarification { phase_index: 0, .. }
        ));
        assert_eq!(report.results[0].error_kind, Some(ErrorKind::FileNotFound));
        // FileNotFound 不触发回退
        assert_eq!(desktop.call_count(), 0);
    }

    #[tokio::test]
    async fn test_degenerate_segment_becomes_skipped_phase() {
        let desktop = Arc::new(MockBackend::succeeding(BackendKind::Desktop));
        let browser = Arc::new(MockBackend::succeeding(BackendKind::Browser));
        let orch = orchestrator(&desktop, &browser, RouterSettings::default());

        let report = orch.run("open notepad then x then open calculator").await.unwrap();
        assert!(report.success);
        assert_eq!(report.phases.len(), 3);
        assert_eq!(report.results[1].status, PhaseStatus::Skipped);
        assert_eq!(report.results[1].error_kind, Some(ErrorKind::DecompositionDegenerate));
        assert_eq!(desktop.call_count(), 2);
    }

    #[tokio::test]
    async fn test_forced_and_default_routing() {
        let desktop = Arc::new(MockBackend::succeeding(BackendKind::Desktop));
        let browser = Arc::new(MockBackend::succeeding(BackendKind::Browser));
        let forced = orchestrator(
            &desktop,
            &browser,
            RouterSettings {
                force_task_type: Some(BackendKind::Browser),
                ..RouterSettings::default()
            },
        );
        let report = forced.run("open notepad").await.unwrap();
        assert_eq!(report.results[0].backend_used, Some(BackendKind::Browser));

        let defaulted = orchestrator(
            &desktop,
            &browser,
            RouterSettings {
                default_backend: BackendKind::Browser,
                ..RouterSettings::default()
            },
        );
        let report = defaulted.run("do the thing").await.unwrap();
        assert_eq!(report.phases[0].task_type, TaskType::Ambiguous);
        assert_eq!(report.results[0].backend_used, Some(BackendKind::Browser));
        assert_eq!(desktop.call_count(), 0);
    }

    #[tokio::test]
    async fn test_assembly_errors() {
        let desktop = Arc::new(MockBackend::succeeding(BackendKind::Desktop));
        let mut registry = BackendRegistry::new();
        registry.register(desktop);
        let orch = Orchestrator::new(registry, RouterSettings::default());

        assert!(matches!(orch.run("   ").await, Err(PilotError::EmptyObjective)));
        assert!(matches!(
            orch.run("go to example.com").await,
            Err(PilotError::NoBackend(BackendKind::Browser))
        ));
    }
}
