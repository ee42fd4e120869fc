//! 搜索范围、允许根目录与排除集合
//!
//! 允许根目录在每次调用时重新 canonicalize（可能在两次运行之间被重新配置），从不缓存。
//! 候选路径 canonicalize 后（已消解 `..` 与符号链接）必须位于某个允许根之下，否则丢弃。

use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};

/// 搜索范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    /// 只在白名单目录（如 Downloads / Documents / Desktop）内做浅层搜索
    Restricted,
    /// 从配置的根目录递归搜索（跳过排除集合）
    Broad,
}

/// 允许的根目录集合
#[derive(Debug, Clone, Default)]
pub struct AllowedRoots {
    roots: Vec<PathBuf>,
}

impl AllowedRoots {
    pub fn new(roots: &[PathBuf]) -> Self {
        Self {
            roots: roots.to_vec(),
        }
    }

    /// 当前可访问的根目录（canonical）；不存在或无权限的根被忽略
    pub fn canonical(&self) -> Vec<PathBuf> {
        self.roots
            .iter()
            .filter_map(|r| r.canonicalize().ok())
            .collect()
    }

    /// 路径 canonicalize 后位于某个允许根之下时返回 canonical 路径
    pub fn admit(&self, path: &Path) -> Option<PathBuf> {
        admit_under(path, &self.canonical())
    }
}

/// 以已 canonicalize 的根集合判断路径
pub fn admit_under(path: &Path, canonical_roots: &[PathBuf]) -> Option<PathBuf> {
    let canonical = path.canonicalize().ok()?;
    if canonical_roots.iter().any(|root| canonical.starts_with(root)) {
        Some(canonical)
    } else {
        None
    }
}

/// 默认排除的目录名模式（大小写不敏感）
pub fn default_excluded_dirs() -> Vec<String> {
    [
        "node_modules",
        ".git",
        ".svn",
        ".hg",
        "__pycache__",
        ".cache",
        ".npm",
        ".cargo",
        ".rustup",
        "target",
        ".venv",
        "venv",
        ".vscode",
        ".idea",
        "Windows",
        "Program Files*",
        "ProgramData",
        "System32",
        "AppData",
        "Caches",
        "Temp",
        "Temporary Internet Files",
        "$Recycle.Bin",
        ".Trash",
        "Library",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// 默认排除的绝对路径（系统目录）
pub fn default_excluded_paths() -> Vec<PathBuf> {
    ["/proc", "/sys", "/dev", "/usr", "/var", "/bin", "/sbin", "/lib", "/etc", "/boot", "/run"]
        .iter()
        .map(PathBuf::from)
        .collect()
}

/// 目录排除集合：目录名命中模式或路径命中绝对路径即剪枝
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    patterns: Vec<Pattern>,
    paths: Vec<PathBuf>,
}

impl ExclusionSet {
    pub fn new(dir_patterns: &[String], paths: &[PathBuf]) -> Self {
        let patterns = dir_patterns
            .iter()
            .filter_map(|p| match Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    tracing::warn!(pattern = %p, error = %e, "invalid exclusion pattern ignored");
                    None
                }
            })
            .collect();
        Self {
            patterns,
            paths: paths.to_vec(),
        }
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        if self.paths.iter().any(|p| p == path) {
            return true;
        }
        let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
            return false;
        };
        let options = MatchOptions {
            case_sensitive: false,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };
        self.patterns.iter().any(|p| p.matches_with(&name, options))
    }
}
