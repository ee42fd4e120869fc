//! 文件解析器
//!
//! 描述 -> 关键字 -> 有界遍历 -> 允许根过滤 -> 排序。
//! 失败从不抛错：根目录为空或不可访问、无命中、超时都返回（可能为空的）结果。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::ErrorKind;
use crate::resolver::keywords::FileQuery;
use crate::resolver::rank::{rank_candidates, FileCandidate, RankWeights};
use crate::resolver::roots::{
    admit_under, default_excluded_dirs, default_excluded_paths, AllowedRoots, ExclusionSet,
    SearchScope,
};
use crate::resolver::walk::{walk_roots, WalkLimits};

/// 遍历时按关键字强度保留 max_results × 3 个命中，再做完整排序
const MATCH_HEADROOM: usize = 3;

/// 解析器配置
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub allowed_roots: Vec<PathBuf>,
    pub excluded_dirs: Vec<String>,
    pub excluded_paths: Vec<PathBuf>,
    /// Broad 范围的最大深度
    pub max_depth: usize,
    /// Restricted 范围的最大深度
    pub restricted_max_depth: usize,
    pub max_results: usize,
    pub timeout: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            allowed_roots: Vec::new(),
            excluded_dirs: default_excluded_dirs(),
            excluded_paths: default_excluded_paths(),
            max_depth: 10,
            restricted_max_depth: 4,
            max_results: 20,
            timeout: Duration::from_millis(5000),
        }
    }
}

impl ResolverSettings {
    pub fn with_allowed_roots(roots: Vec<PathBuf>) -> Self {
        Self {
            allowed_roots: roots,
            ..Self::default()
        }
    }
}

/// 解析结果（最佳匹配 + 备选），用于日志与上传计划
#[derive(Debug, Clone, Default, Serialize)]
pub struct Resolution {
    pub best: Option<FileCandidate>,
    pub alternates: Vec<FileCandidate>,
    pub truncated: bool,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.best.is_none()
    }
}

/// 文件解析器
pub struct FileResolver {
    settings: ResolverSettings,
    allowed: AllowedRoots,
    exclusions: ExclusionSet,
    weights: RankWeights,
}

impl FileResolver {
    pub fn new(settings: ResolverSettings) -> Self {
        let exclusions = ExclusionSet::new(&settings.excluded_dirs, &settings.excluded_paths);
        let allowed = AllowedRoots::new(&settings.allowed_roots);
        Self {
            settings,
            allowed,
            exclusions,
            weights: RankWeights::default(),
        }
    }

    pub fn with_weights(mut self, weights: RankWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// 路径位于允许根之下时返回其 canonical 形式
    pub fn admit(&self, path: &Path) -> Option<PathBuf> {
        self.allowed.admit(path)
    }

    /// 按描述查找文件，结果按 relevance_score 降序，至多 max_results 个
    pub fn resolve(
        &self,
        description: &str,
        scope: SearchScope,
        candidate_roots: &[PathBuf],
    ) -> Vec<FileCandidate> {
        let (ranked, _truncated) = self.resolve_detailed(description, scope, candidate_roots);
        ranked
    }

    /// 与 `resolve` 相同，并给出最佳匹配与备选
    pub fn resolution(
        &self,
        description: &str,
        scope: SearchScope,
        candidate_roots: &[PathBuf],
    ) -> Resolution {
        let (mut ranked, truncated) =
            self.resolve_detailed(description, scope, candidate_roots);
        if ranked.is_empty() {
            return Resolution {
                truncated,
                ..Resolution::default()
            };
        }
        let best = ranked.remove(0);
        tracing::info!(
            best = %best.filename,
            score = best.relevance_score,
            alternates = ?ranked.iter().take(3).map(|c| c.filename.as_str()).collect::<Vec<_>>(),
            "file resolved"
        );
        Resolution {
            best: Some(best),
            alternates: ranked,
            truncated,
        }
    }

    fn resolve_detailed(
        &self,
        description: &str,
        scope: SearchScope,
        candidate_roots: &[PathBuf],
    ) -> (Vec<FileCandidate>, bool) {
        let query = FileQuery::parse(description);
        if query.is_empty() {
            tracing::debug!(description, "no usable keywords in file description");
            return (Vec::new(), false);
        }

        let allowed = self.allowed.canonical();
        if allowed.is_empty() {
            tracing::warn!("no accessible allowed roots configured, file search skipped");
            return (Vec::new(), false);
        }

        let mut roots: Vec<PathBuf> = Vec::new();
        for root in candidate_roots {
            let Ok(canonical) = root.canonicalize() else {
                tracing::debug!(root = %root.display(), "search root inaccessible, skipped");
                continue;
            };
            if scope == SearchScope::Restricted
                && !allowed.iter().any(|a| canonical.starts_with(a))
            {
                tracing::debug!(root = %canonical.display(), "search root outside allowed roots");
                continue;
            }
            if !roots.contains(&canonical) {
                roots.push(canonical);
            }
        }
        if roots.is_empty() {
            return (Vec::new(), false);
        }

        let max_depth = match scope {
            SearchScope::Restricted => self.settings.restricted_max_depth,
            SearchScope::Broad => self.settings.max_depth,
        };
        let limits = WalkLimits {
            max_depth,
            max_matches: self.settings.max_results.saturating_mul(MATCH_HEADROOM).max(1),
            deadline: Instant::now() + self.settings.timeout,
        };

        let started = Instant::now();
        let outcome = walk_roots(&roots, &query, &self.exclusions, &limits);
        let hits = if outcome.keyword_hits.is_empty() && !outcome.extension_hits.is_empty() {
            tracing::info!(
                description,
                count = outcome.extension_hits.len(),
                "no keyword matches, falling back to extension search"
            );
            outcome.extension_hits
        } else {
            outcome.keyword_hits
        };

        let mut seen = HashSet::new();
        let mut rejected = 0usize;
        let mut candidates = Vec::new();
        for hit in hits {
            let Some(canonical) = admit_under(&hit, &allowed) else {
                rejected += 1;
                continue;
            };
            if !seen.insert(canonical.clone()) {
                continue;
            }
            let Ok(meta) = std::fs::metadata(&canonical) else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let last_modified: DateTime<Utc> = match meta.modified() {
                Ok(t) => t.into(),
                Err(_) => DateTime::<Utc>::from(std::time::UNIX_EPOCH),
            };
            let filename = canonical
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            candidates.push(FileCandidate {
                absolute_path: canonical,
                filename,
                last_modified,
                size_bytes: meta.len(),
                relevance_score: 0.0,
            });
        }
        if rejected > 0 {
            tracing::debug!(
                rejected,
                kind = ?ErrorKind::PathNotAllowed,
                "candidates outside allowed roots dropped"
            );
        }

        let mut ranked = rank_candidates(candidates, &query, self.weights);
        ranked.truncate(self.settings.max_results);

        tracing::info!(
            description,
            scope = ?scope,
            dirs_visited = outcome.dirs_visited,
            results = ranked.len(),
            truncated = outcome.truncated,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "file search finished"
        );
        (ranked, outcome.truncated)
    }
}
