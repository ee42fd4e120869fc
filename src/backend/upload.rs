//! 浏览器后端的文件上传协调
//!
//! 选择上传文件的顺序：携带的 `last_saved_file` 产物 -> 与文件提示同名的产物 -> 文件提示 -> 用户描述交给 FileResolver。
//! 任何来源的路径在真正调用 `UploadTarget::upload` 之前都重新检查一次是否位于允许根之下。
//! 找不到文件时返回 `BackendError::FileNotFound`，由编排器作为可恢复情况处理（请求澄清）。

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;

use crate::backend::{BackendError, PhaseRequest};
use crate::core::{ErrorKind, LAST_SAVED_FILE};
use crate::resolver::{FileResolver, SearchScope};

/// 上传原语（由浏览器自动化驱动实现）
#[async_trait]
pub trait UploadTarget: Send + Sync {
    async fn upload(&self, file_path: &Path, target_selector: &str) -> Result<(), BackendError>;
}

/// 上传文件的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadSource {
    Artifact,
    FileHint,
    Resolver,
}

/// 选定的上传文件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadPlan {
    pub file: PathBuf,
    pub alternates: Vec<PathBuf>,
    pub source: UploadSource,
}

fn upload_intent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:attach|attaching|attached|upload|uploading|uploaded)\b")
            .expect("upload intent pattern is valid")
    })
}

fn upload_object_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:attach|upload)\s+(?:the\s+|my\s+|a\s+|an\s+)?(.+?)(?:\s+(?:to|into|onto|in|on|with)\s+(?:the\s+|an?\s+|my\s+)?(?:[\w-]+\s+)?(?:email|e-mail|mail|message|form|page|site|chat|post|draft)\b.*)?$",
        )
        .expect("upload object pattern is valid")
    })
}

/// 文本是否包含上传 / 附件意图
pub fn needs_upload(text: &str) -> bool {
    upload_intent_re().is_match(text)
}

/// 提取要上传的文件描述："attach the n8n file to the email" -> "n8n file"
pub fn upload_description(text: &str) -> Option<String> {
    let caps = upload_object_re().captures(text.trim())?;
    let object = caps
        .get(1)?
        .as_str()
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '.' | '!' | '?'));
    (!object.is_empty()).then(|| object.to_string())
}

fn same_file_name(path: &Path, hint: &str) -> bool {
    let hint_name = Path::new(hint)
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase());
    let name = path.file_name().map(|n| n.to_string_lossy().to_lowercase());
    matches!((name, hint_name), (Some(a), Some(b)) if a == b)
}

/// 上传协调器：选择文件并在上传前校验允许根
pub struct UploadCoordinator {
    resolver: Arc<FileResolver>,
    scope: SearchScope,
    candidate_roots: Vec<PathBuf>,
}

impl UploadCoordinator {
    pub fn new(resolver: Arc<FileResolver>, scope: SearchScope, candidate_roots: Vec<PathBuf>) -> Self {
        Self {
            resolver,
            scope,
            candidate_roots,
        }
    }

    /// 为阶段选择上传文件
    pub fn plan(&self, request: &PhaseRequest) -> Result<UploadPlan, BackendError> {
        if let Some(path) = request.artifacts.get(LAST_SAVED_FILE) {
            match self.resolver.admit(path) {
                Some(file) => {
                    tracing::info!(phase = request.phase_index, "using carried artifact for upload");
                    return Ok(UploadPlan {
                        file,
                        alternates: Vec::new(),
                        source: UploadSource::Artifact,
                    });
                }
                None => tracing::warn!(
                    phase = request.phase_index,
                    kind = ?ErrorKind::PathNotAllowed,
                    "carried artifact is not under an allowed root, ignored"
                ),
            }
        }

        for hint in &request.file_hints {
            let carried = request
                .artifacts
                .values()
                .find(|p| same_file_name(p, hint))
                .and_then(|p| self.resolver.admit(p));
            if let Some(file) = carried {
                return Ok(UploadPlan {
                    file,
                    alternates: Vec::new(),
                    source: UploadSource::Artifact,
                });
            }

            let resolution = self.resolver.resolution(hint, self.scope, &self.candidate_roots);
            if let Some(best) = resolution.best {
                return Ok(UploadPlan {
                    file: best.absolute_path,
                    alternates: resolution.alternates.into_iter().map(|c| c.absolute_path).collect(),
                    source: UploadSource::FileHint,
                });
            }
        }

        let description = upload_description(&request.text).unwrap_or_else(|| request.text.clone());
        let resolution = self
            .resolver
            .resolution(&description, self.scope, &self.candidate_roots);
        match resolution.best {
            Some(best) => Ok(UploadPlan {
                file: best.absolute_path,
                alternates: resolution.alternates.into_iter().map(|c| c.absolute_path).collect(),
                source: UploadSource::Resolver,
            }),
            None => Err(BackendError::FileNotFound(description)),
        }
    }

    /// 选择文件、复核允许根并上传
    pub async fn upload(
        &self,
        request: &PhaseRequest,
        target: &dyn UploadTarget,
        target_selector: &str,
    ) -> Result<UploadPlan, BackendError> {
        let plan = self.plan(request)?;
        let file = self.upload_file(&plan.file, target, target_selector).await?;
        tracing::info!(
            phase = request.phase_index,
            source = ?plan.source,
            alternates = plan.alternates.len(),
            "file uploaded"
        );
        Ok(UploadPlan { file, ..plan })
    }

    /// 复核允许根后上传单个文件，返回实际上传的 canonical 路径
    ///
    /// 文件已不存在时为 `FileNotFound`；存在但不在允许根之下时为 `PathNotAllowed`。
    pub async fn upload_file(
        &self,
        file: &Path,
        target: &dyn UploadTarget,
        target_selector: &str,
    ) -> Result<PathBuf, BackendError> {
        let Some(admitted) = self.resolver.admit(file) else {
            if file.exists() {
                tracing::warn!(kind = ?ErrorKind::PathNotAllowed, "upload refused");
                return Err(BackendError::PathNotAllowed);
            }
            return Err(BackendError::FileNotFound(
                "selected file is no longer available".to_string(),
            ));
        };
        target.upload(&admitted, target_selector).await?;
        Ok(admitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockUploadTarget;
    use crate::core::{Artifacts, BackendKind, Surface, SessionHandle};
    use crate::resolver::ResolverSettings;
    use std::fs;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    fn request(text: &str, artifacts: Artifacts, file_hints: Vec<String>) -> PhaseRequest {
        PhaseRequest {
            phase_index: 1,
            text: text.to_string(),
            artifacts,
            file_hints,
            max_steps: 10,
            session: SessionHandle {
                run_id: Uuid::new_v4(),
                surface: Surface::for_backend(BackendKind::Browser, "default"),
            },
            cancel: CancellationToken::new(),
        }
    }

    fn coordinator(root: &Path) -> UploadCoordinator {
        let resolver = FileResolver::new(ResolverSettings::with_allowed_roots(vec![root.to_path_buf()]));
        UploadCoordinator::new(Arc::new(resolver), SearchScope::Restricted, vec![root.to_path_buf()])
    }

    #[test]
    fn test_upload_intent() {
        assert!(needs_upload("attach the n8n file to the email"));
        assert!(!needs_upload("open notepad and write hello"));
        assert_eq!(
            upload_description("attach the n8n file to the email").as_deref(),
            Some("n8n file")
        );
        assert_eq!(
            upload_description("attach the n8n file to the Gmail draft").as_deref(),
            Some("n8n file")
        );
        assert_eq!(upload_description("upload report.pdf").as_deref(), Some("report.pdf"));
        assert_eq!(upload_description("email it via gmail"), None);
    }

    #[test]
    fn test_plan_prefers_carried_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let saved = dir.path().join("notes.docx");
        fs::write(&saved, "x").unwrap();
        fs::write(dir.path().join("n8n.docx"), "x").unwrap();

        let mut artifacts = Artifacts::new();
        artifacts.insert(LAST_SAVED_FILE.to_string(), saved.clone());
        let plan = coordinator(dir.path())
            .plan(&request("attach the n8n file to the email", artifacts, vec![]))
            .unwrap();
        assert_eq!(plan.source, UploadSource::Artifact);
        assert_eq!(plan.file, saved.canonicalize().unwrap());
    }

    #[test]
    fn test_artifact_outside_allowed_roots_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let foreign = outside.path().join("secret.txt");
        fs::write(&foreign, "x").unwrap();
        fs::write(dir.path().join("n8n.docx"), vec![b'x'; 2048]).unwrap();

        let mut artifacts = Artifacts::new();
        artifacts.insert(LAST_SAVED_FILE.to_string(), foreign);
        let plan = coordinator(dir.path())
            .plan(&request("attach the n8n file to the email", artifacts, vec![]))
            .unwrap();
        assert_eq!(plan.source, UploadSource::Resolver);
        assert!(plan.file.ends_with("n8n.docx"));
    }

    #[test]
    fn test_plan_uses_file_hint() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("report.docx"), vec![b'x'; 2048]).unwrap();
        let plan = coordinator(dir.path())
            .plan(&request("attach it to the email", Artifacts::new(), vec!["report.docx".into()]))
            .unwrap();
        assert_eq!(plan.source, UploadSource::FileHint);
    }

    #[test]
    fn test_nothing_found_is_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = coordinator(dir.path())
            .plan(&request("attach the n8n file to the email", Artifacts::new(), vec![]))
            .unwrap_err();
        assert_eq!(err, BackendError::FileNotFound("n8n file".into()));
    }

    #[tokio::test]
    async fn test_upload_file_rechecks_allowed_roots() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let foreign = outside.path().join("n8n.docx");
        fs::write(&foreign, "x").unwrap();
        let target = MockUploadTarget::new();
        let coordinator = coordinator(dir.path());

        let err = coordinator
            .upload_file(&foreign, &target, "input[type=file]")
            .await
            .unwrap_err();
        assert_eq!(err, BackendError::PathNotAllowed);
        assert_eq!(err.kind(), ErrorKind::PathNotAllowed);
        assert!(!err.to_string().contains("n8n"));

        let missing = dir.path().join("gone.docx");
        let err = coordinator
            .upload_file(&missing, &target, "input[type=file]")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
        assert!(target.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_upload_calls_target_with_canonical_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("n8n.docx"), vec![b'x'; 2048]).unwrap();
        let target = MockUploadTarget::new();
        let plan = coordinator(dir.path())
            .upload(
                &request("attach the n8n file to the email", Artifacts::new(), vec![]),
                &target,
                "input[type=file]",
            )
            .await
            .unwrap();
        let uploads = target.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, plan.file);
        assert_eq!(uploads[0].1, "input[type=file]");
    }
}
