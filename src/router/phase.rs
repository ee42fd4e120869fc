//! 阶段与阶段状态机
//!
//! Pending -> Running -> { Succeeded | Failed | FellBack }
//! FellBack -> { Succeeded | FellBackFailed }
//! Pending -> Skipped（退化片段或取消）
//!
//! 重试深度由状态结构决定：FellBack 之后不可能再次 FellBack，因此至多一次回退。

use std::fmt;

use serde::Serialize;

use crate::core::{Artifacts, Classification, PilotError, TaskType};

/// 阶段状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Running,
    /// 主后端失败，回退后端执行中
    FellBack,
    Succeeded,
    Failed,
    FellBackFailed,
    Skipped,
}

impl PhaseStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PhaseStatus::Succeeded
                | PhaseStatus::Failed
                | PhaseStatus::FellBackFailed
                | PhaseStatus::Skipped
        )
    }

    fn can_advance_to(self, next: PhaseStatus) -> bool {
        use PhaseStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Skipped)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, FellBack)
                | (FellBack, Succeeded)
                | (FellBack, FellBackFailed)
        )
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PhaseStatus::Pending => "pending",
            PhaseStatus::Running => "running",
            PhaseStatus::FellBack => "fell_back",
            PhaseStatus::Succeeded => "succeeded",
            PhaseStatus::Failed => "failed",
            PhaseStatus::FellBackFailed => "fell_back_failed",
            PhaseStatus::Skipped => "skipped",
        };
        f.pad(s)
    }
}

/// 运行中的一个阶段（索引顺序即执行顺序，分解后不再重排）
#[derive(Debug, Clone, Serialize)]
pub struct Phase {
    pub index: usize,
    pub text: String,
    pub task_type: TaskType,
    pub classification: Classification,
    pub status: PhaseStatus,
    pub produced_artifacts: Artifacts,
    pub file_hints: Vec<String>,
    pub best_effort: bool,
}

impl Phase {
    pub fn new(index: usize, text: impl Into<String>, classification: Classification) -> Self {
        Self {
            index,
            text: text.into(),
            task_type: classification.task_type,
            classification,
            status: PhaseStatus::Pending,
            produced_artifacts: Artifacts::new(),
            file_hints: Vec::new(),
            best_effort: false,
        }
    }

    /// 状态迁移；非法迁移返回 InvalidTransition
    pub fn advance(&mut self, next: PhaseStatus) -> Result<(), PilotError> {
        if !self.status.can_advance_to(next) {
            return Err(PilotError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!(phase = self.index, from = %self.status, to = %next, "phase transition");
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase() -> Phase {
        Phase::new(0, "open notepad", Classification::ambiguous())
    }

    #[test]
    fn test_happy_path() {
        let mut p = phase();
        p.advance(PhaseStatus::Running).unwrap();
        p.advance(PhaseStatus::Succeeded).unwrap();
        assert!(p.status.is_terminal());
    }

    #[test]
    fn test_single_fallback_hop() {
        let mut p = phase();
        p.advance(PhaseStatus::Running).unwrap();
        p.advance(PhaseStatus::FellBack).unwrap();
        assert!(p.advance(PhaseStatus::FellBack).is_err());
        assert!(p.advance(PhaseStatus::Running).is_err());
        p.advance(PhaseStatus::FellBackFailed).unwrap();
        assert!(p.status.is_terminal());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut p = phase();
        p.advance(PhaseStatus::Skipped).unwrap();
        assert!(p.advance(PhaseStatus::Running).is_err());

        let mut p = phase();
        assert!(p.advance(PhaseStatus::Succeeded).is_err());
    }
}
