//! 后端路由与编排：阶段状态机、回退链、运行报告

pub mod orchestrator;
pub mod phase;
pub mod report;

pub use orchestrator::{BackendLimits, Clarifier, FallbackPolicy, Orchestrator, RouterSettings};
pub use phase::{Phase, PhaseStatus};
pub use report::{AttemptRecord, ExecutionResult, RunOutcome, RunReport};
