//! 执行后端抽象
//!
//! 桌面（屏幕识别）与浏览器自动化后端都是外部协作者，统一实现 `Backend`：
//! 接收只读的 `PhaseRequest`（阶段文本、已累积产物、会话句柄、取消令牌），按值返回 `BackendOutput`，
//! 从不直接修改编排器状态。`BackendRegistry` 按种类注册与查找。

pub mod mock;
pub mod upload;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::core::{Artifacts, BackendKind, ErrorKind, SessionHandle};

pub use mock::{MockBackend, MockCall, MockUploadTarget};
pub use upload::{needs_upload, upload_description, UploadCoordinator, UploadPlan, UploadSource, UploadTarget};

/// 一次后端调用的输入
#[derive(Debug, Clone)]
pub struct PhaseRequest {
    pub phase_index: usize,
    pub text: String,
    /// 之前阶段累积的产物（只读视图）
    pub artifacts: Artifacts,
    /// 之前阶段将产出 / 用户澄清给出的文件名
    pub file_hints: Vec<String>,
    /// 本次调用允许的最大动作步数
    pub max_steps: u32,
    pub session: SessionHandle,
    /// 阶段内取消为尽力而为，由后端自行响应
    pub cancel: CancellationToken,
}

/// 后端返回的结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackendOutput {
    pub success: bool,
    pub steps_used: u32,
    pub artifacts: Artifacts,
    pub message: Option<String>,
}

impl BackendOutput {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_artifact(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.artifacts.insert(name.into(), path.into());
        self
    }

    pub fn with_steps(mut self, steps_used: u32) -> Self {
        self.steps_used = steps_used;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// 后端调用错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Backend failed: {0}")]
    Failed(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Phase cancelled")]
    Cancelled,

    #[error("Phase timed out after {0:?}")]
    Timeout(Duration),

    #[error("Step budget exceeded: used {used} of {max}")]
    StepBudgetExceeded { used: u32, max: u32 },

    #[error("Session unavailable: {0}")]
    SessionUnavailable(String),

    /// 不携带路径，避免泄露文件系统结构
    #[error("Selected file is outside the allowed roots")]
    PathNotAllowed,
}

impl BackendError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackendError::FileNotFound(_) => ErrorKind::FileNotFound,
            BackendError::Cancelled => ErrorKind::Cancelled,
            BackendError::PathNotAllowed => ErrorKind::PathNotAllowed,
            BackendError::Failed(_)
            | BackendError::Timeout(_)
            | BackendError::StepBudgetExceeded { .. }
            | BackendError::SessionUnavailable(_) => ErrorKind::BackendFailure,
        }
    }
}

/// 执行后端
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// 用于日志与报告
    fn name(&self) -> &str;

    async fn execute(&self, request: &PhaseRequest) -> Result<BackendOutput, BackendError>;
}

/// 后端注册表：每个种类至多一个后端
#[derive(Default, Clone)]
pub struct BackendRegistry {
    backends: HashMap<BackendKind, Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册后端；同种类的旧后端被替换
    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        self.backends.insert(backend.kind(), backend);
    }

    pub fn with(mut self, backend: Arc<dyn Backend>) -> Self {
        self.register(backend);
        self
    }

    pub fn get(&self, kind: BackendKind) -> Option<Arc<dyn Backend>> {
        self.backends.get(&kind).cloned()
    }

    pub fn contains(&self, kind: BackendKind) -> bool {
        self.backends.contains_key(&kind)
    }
}
