//! Mock 后端（用于测试与 dry-run，不驱动真实界面）
//!
//! 记录每次调用（阶段、文本、收到的产物、开始/结束时间），可配置成功、失败、前 N 次失败、延迟、步数与产出产物。
//! 配置了上传协调器时，遇到上传意图的阶段会走 `UploadCoordinator::upload`。

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::backend::upload::{needs_upload, UploadCoordinator, UploadTarget};
use crate::backend::{Backend, BackendError, BackendOutput, PhaseRequest};
use crate::core::{Artifacts, BackendKind};

/// 一次被记录的调用
#[derive(Debug, Clone)]
pub struct MockCall {
    pub phase_index: usize,
    pub text: String,
    pub artifacts: Artifacts,
    pub file_hints: Vec<String>,
    pub started_at: Instant,
    pub finished_at: Instant,
}

#[derive(Debug, Clone)]
enum Behavior {
    Succeed,
    /// 返回 `success = false` 的结果
    ReportFailure,
    /// 返回错误
    Error(BackendError),
    /// 前 N 次返回错误，之后成功
    FailTimes(usize),
    /// 没有文件提示时报 FileNotFound
    RequireFileHint,
}

/// Mock 后端
pub struct MockBackend {
    kind: BackendKind,
    name: String,
    behavior: Behavior,
    delay: Option<Duration>,
    steps: u32,
    artifacts: Artifacts,
    uploads: Option<(Arc<UploadCoordinator>, Arc<dyn UploadTarget>)>,
    attempts: AtomicUsize,
    calls: Mutex<Vec<MockCall>>,
}

impl MockBackend {
    fn with_behavior(kind: BackendKind, behavior: Behavior) -> Self {
        Self {
            kind,
            name: format!("mock-{kind}"),
            behavior,
            delay: None,
            steps: 1,
            artifacts: Artifacts::new(),
            uploads: None,
            attempts: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding(kind: BackendKind) -> Self {
        Self::with_behavior(kind, Behavior::Succeed)
    }

    /// 每次调用都返回错误
    pub fn failing(kind: BackendKind) -> Self {
        Self::with_behavior(kind, Behavior::Error(BackendError::Failed("mock failure".into())))
    }

    /// 每次调用都返回 `success = false`
    pub fn reporting_failure(kind: BackendKind) -> Self {
        Self::with_behavior(kind, Behavior::ReportFailure)
    }

    pub fn erroring(kind: BackendKind, error: BackendError) -> Self {
        Self::with_behavior(kind, Behavior::Error(error))
    }

    pub fn fail_times(kind: BackendKind, times: usize) -> Self {
        Self::with_behavior(kind, Behavior::FailTimes(times))
    }

    pub fn requiring_file_hint(kind: BackendKind) -> Self {
        Self::with_behavior(kind, Behavior::RequireFileHint)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_artifact(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.artifacts.insert(name.into(), path.into());
        self
    }

    pub fn with_uploads(
        mut self,
        coordinator: Arc<UploadCoordinator>,
        target: Arc<dyn UploadTarget>,
    ) -> Self {
        self.uploads = Some((coordinator, target));
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    async fn run(&self, request: &PhaseRequest) -> Result<BackendOutput, BackendError> {
        if let Some(delay) = self.delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = request.cancel.cancelled() => return Err(BackendError::Cancelled),
            }
        }

        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Succeed => {}
            Behavior::ReportFailure => return Ok(BackendOutput::failed("mock reported failure")),
            Behavior::Error(e) => return Err(e.clone()),
            Behavior::FailTimes(n) if attempt < *n => {
                return Err(BackendError::Failed(format!("mock failure {}", attempt + 1)))
            }
            Behavior::FailTimes(_) => {}
            Behavior::RequireFileHint if request.file_hints.is_empty() => {
                return Err(BackendError::FileNotFound(request.text.clone()))
            }
            Behavior::RequireFileHint => {}
        }

        let mut output = BackendOutput::succeeded().with_steps(self.steps);
        output.artifacts = self.artifacts.clone();

        if let Some((coordinator, target)) = &self.uploads {
            if needs_upload(&request.text) {
                let plan = coordinator
                    .upload(request, target.as_ref(), "input[type=file]")
                    .await?;
                output = output.with_message(format!("uploaded {}", plan.file.display()));
            }
        }
        Ok(output)
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, request: &PhaseRequest) -> Result<BackendOutput, BackendError> {
        let started_at = Instant::now();
        tracing::info!(
            backend = %self.name,
            phase = request.phase_index,
            text = %request.text,
            "mock backend executing"
        );
        let result = self.run(request).await;
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(MockCall {
                phase_index: request.phase_index,
                text: request.text.clone(),
                artifacts: request.artifacts.clone(),
                file_hints: request.file_hints.clone(),
                started_at,
                finished_at: Instant::now(),
            });
        }
        result
    }
}

/// 记录上传调用的 mock 上传目标
#[derive(Debug, Default)]
pub struct MockUploadTarget {
    uploads: Mutex<Vec<(PathBuf, String)>>,
}

impl MockUploadTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uploads(&self) -> Vec<(PathBuf, String)> {
        self.uploads.lock().map(|u| u.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl UploadTarget for MockUploadTarget {
    async fn upload(&self, file_path: &std::path::Path, target_selector: &str) -> Result<(), BackendError> {
        tracing::info!(selector = target_selector, "mock upload");
        if let Ok(mut uploads) = self.uploads.lock() {
            uploads.push((file_path.to_path_buf(), target_selector.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{SessionHandle, Surface};
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    fn request(text: &str) -> PhaseRequest {
        PhaseRequest {
            phase_index: 0,
            text: text.to_string(),
            artifacts: Artifacts::new(),
            file_hints: Vec::new(),
            max_steps: 10,
            session: SessionHandle {
                run_id: Uuid::new_v4(),
                surface: Surface::Desktop,
            },
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_fail_times_then_succeed() {
        let backend = MockBackend::fail_times(BackendKind::Desktop, 1);
        assert!(backend.execute(&request("open notepad")).await.is_err());
        assert!(backend.execute(&request("open notepad")).await.unwrap().success);
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_delay_honors_cancellation() {
        let backend = MockBackend::succeeding(BackendKind::Browser).with_delay(Duration::from_secs(30));
        let req = request("go to example.com");
        req.cancel.cancel();
        assert_eq!(backend.execute(&req).await, Err(BackendError::Cancelled));
    }

    #[tokio::test]
    async fn test_artifacts_and_steps_reported() {
        let backend = MockBackend::succeeding(BackendKind::Desktop)
            .with_steps(4)
            .with_artifact("last_saved_file", "/tmp/notes.docx");
        let out = backend.execute(&request("save as notes.docx")).await.unwrap();
        assert_eq!(out.steps_used, 4);
        assert_eq!(out.artifacts.get("last_saved_file"), Some(&PathBuf::from("/tmp/notes.docx")));
    }
}
