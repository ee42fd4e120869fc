//! 执行结果与运行报告
//!
//! 报告列出每个阶段、所用后端与结果，从不包含堆栈；可序列化为 JSON。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::core::{Artifacts, BackendKind, ErrorKind};
use crate::router::phase::{Phase, PhaseStatus};

/// 单次后端调用记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    pub backend: BackendKind,
    pub backend_name: String,
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
    pub duration_ms: u64,
    pub steps_used: u32,
}

/// 单个阶段的执行结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub phase_index: usize,
    pub primary_backend: Option<BackendKind>,
    /// 最终执行该阶段的后端（回退成功时为回退后端）
    pub backend_used: Option<BackendKind>,
    pub fell_back: bool,
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub artifacts: Artifacts,
    pub attempts: Vec<AttemptRecord>,
    pub status: PhaseStatus,
}

impl ExecutionResult {
    pub(crate) fn skipped(phase_index: usize, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            phase_index,
            primary_backend: None,
            backend_used: None,
            fell_back: false,
            success: false,
            error_kind: Some(kind),
            error_message: Some(message.into()),
            artifacts: Artifacts::new(),
            attempts: Vec::new(),
            status: PhaseStatus::Skipped,
        }
    }
}

/// 运行结局
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    /// 某阶段的主后端（及回退后端）失败，运行终止
    Failed {
        phase_index: usize,
        backend: Option<BackendKind>,
        kind: ErrorKind,
    },
    /// 文件定位无结果且没有得到澄清
    NeedsClarification { phase_index: usize, message: String },
    /// 在阶段边界被取消
    Cancelled { next_phase: usize },
}

/// 整次运行的报告
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub objective: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// 所有阶段都成功（回退成功计为成功）时为 true
    pub success: bool,
    pub outcome: RunOutcome,
    pub phases: Vec<Phase>,
    pub results: Vec<ExecutionResult>,
    /// 运行结束时累积的产物
    pub artifacts: Artifacts,
}

impl RunReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn result(&self, phase_index: usize) -> Option<&ExecutionResult> {
        self.results.iter().find(|r| r.phase_index == phase_index)
    }
}

fn backend_label(kind: Option<BackendKind>) -> String {
    kind.map(|k| k.to_string()).unwrap_or_else(|| "-".to_string())
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {} ({})", self.run_id, if self.success { "success" } else { "failed" })?;
        for phase in &self.phases {
            let result = self.result(phase.index);
            let backend = backend_label(result.and_then(|r| r.backend_used));
            write!(
                f,
                "  [{}] {:<16} {:<8} {}",
                phase.index, phase.status, backend, phase.text
            )?;
            if let Some(r) = result {
                if r.fell_back {
                    write!(f, " (fallback from {})", backend_label(r.primary_backend))?;
                }
                if let Some(kind) = r.error_kind {
                    write!(f, " <{}>", serde_json::to_string(&kind).unwrap_or_default().trim_matches('"'))?;
                }
            }
            writeln!(f)?;
        }
        match &self.outcome {
            RunOutcome::Completed => writeln!(f, "Outcome: completed"),
            RunOutcome::Failed {
                phase_index,
                backend,
                ..
            } => writeln!(
                f,
                "Outcome: failed at phase {} on {}",
                phase_index,
                backend_label(*backend)
            ),
            RunOutcome::NeedsClarification {
                phase_index,
                message,
            } => writeln!(f, "Outcome: phase {phase_index} needs clarification: {message}"),
            RunOutcome::Cancelled { next_phase } => {
                writeln!(f, "Outcome: cancelled before phase {next_phase}")
            }
        }
    }
}
