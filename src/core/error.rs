//! 错误类型与错误分类
//!
//! 阶段内错误统一转为 `ErrorKind` 写入 ExecutionResult；只有 FallbackExhausted 会上升为整次运行失败。
//! `PilotError` 只用于运行开始前的装配错误（配置、自动化界面被占用等）。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::BackendKind;

/// 阶段级错误分类（写入报告，不含堆栈）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 分类不明确，使用配置的默认后端（非致命）
    ClassificationAmbiguous,
    /// 分解出空/过短片段，作为跳过的阶段
    DecompositionDegenerate,
    /// 主后端失败（返回失败、出错、超时或超出步数），可回退一次
    BackendFailure,
    /// 主后端与回退后端均失败，终止运行
    FallbackExhausted,
    /// 文件定位无结果，可恢复（请求澄清）
    FileNotFound,
    /// 候选路径逃逸出允许的根目录，静默丢弃
    PathNotAllowed,
    /// 运行在阶段边界被取消
    Cancelled,
}

/// 运行装配阶段的错误
#[derive(Error, Debug)]
pub enum PilotError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Objective is empty")]
    EmptyObjective,

    #[error("Automation surface busy: {surface} (held by run {holder})")]
    SurfaceBusy { surface: String, holder: String },

    #[error("No backend registered for {0}")]
    NoBackend(BackendKind),

    #[error("Invalid phase transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

impl From<config::ConfigError> for PilotError {
    fn from(e: config::ConfigError) -> Self {
        PilotError::Config(e.to_string())
    }
}
