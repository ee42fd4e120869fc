//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再读显式指定的配置文件，最后用环境变量 `PILOT__*` 覆盖
//! （双下划线表示嵌套，如 `PILOT__RESOLVER__SCOPE=broad`）。
//! `resolver.scope` 没有代码默认值：不限范围的递归搜索必须由集成方显式选择，缺失即配置错误。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::classify::TaskClassifier;
use crate::core::{BackendKind, PilotError};
use crate::decompose::Decomposer;
use crate::resolver::roots::{default_excluded_dirs, default_excluded_paths};
use crate::resolver::{ResolverSettings, SearchScope};
use crate::router::{BackendLimits, FallbackPolicy, RouterSettings};

/// 配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PilotConfig {
    pub router: RouterSection,
    pub resolver: ResolverSection,
    pub backends: BackendsSection,
}

/// [router] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterSection {
    /// Ambiguous 阶段使用的后端（桌面更可控，默认 desktop）
    pub default_backend: BackendKind,
    /// desktop / browser：强制所有阶段走该后端
    pub force_task_type: Option<BackendKind>,
    pub min_confidence: f32,
    pub min_segment_chars: usize,
    pub best_effort_phases: Vec<usize>,
    pub browser_profile: String,
    /// [router.fallback]：按任务类型开关回退
    pub fallback: FallbackPolicy,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            default_backend: BackendKind::Desktop,
            force_task_type: None,
            min_confidence: 0.4,
            min_segment_chars: 3,
            best_effort_phases: Vec::new(),
            browser_profile: "default".to_string(),
            fallback: FallbackPolicy::default(),
        }
    }
}

/// [resolver] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverSection {
    /// restricted / broad，必填
    pub scope: Option<SearchScope>,
    pub allowed_roots: Vec<PathBuf>,
    /// 为空时使用 allowed_roots
    pub candidate_roots: Vec<PathBuf>,
    /// 未设置时使用内置排除列表
    pub excluded_dirs: Option<Vec<String>>,
    pub excluded_paths: Option<Vec<PathBuf>>,
    pub max_depth: usize,
    pub restricted_max_depth: usize,
    pub max_results: usize,
    pub timeout_ms: u64,
}

impl Default for ResolverSection {
    fn default() -> Self {
        Self {
            scope: None,
            allowed_roots: Vec::new(),
            candidate_roots: Vec::new(),
            excluded_dirs: None,
            excluded_paths: None,
            max_depth: 10,
            restricted_max_depth: 4,
            max_results: 20,
            timeout_ms: 5000,
        }
    }
}

/// [backends] 段
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BackendsSection {
    pub desktop: BackendSection,
    pub browser: BackendSection,
}

/// [backends.desktop] / [backends.browser]：未设置的项使用各后端的内置上限
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BackendSection {
    pub timeout_secs: Option<u64>,
    pub max_steps: Option<u32>,
}

impl BackendSection {
    fn limits(&self, defaults: BackendLimits) -> BackendLimits {
        BackendLimits {
            timeout: self
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_steps: self.max_steps.unwrap_or(defaults.max_steps),
        }
    }
}

/// 展开 `~` / `~/...`（HOME，Windows 上为 USERPROFILE）
pub fn expand_home(path: &Path) -> PathBuf {
    let Some(s) = path.to_str() else {
        return path.to_path_buf();
    };
    let rest = if s == "~" {
        ""
    } else if let Some(rest) = s.strip_prefix("~/").or_else(|| s.strip_prefix("~\\")) {
        rest
    } else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

impl PilotConfig {
    /// 检查必填项与取值范围
    pub fn validate(&self) -> Result<(), PilotError> {
        if self.resolver.scope.is_none() {
            return Err(PilotError::Config(
                "resolver.scope must be set to \"restricted\" or \"broad\"".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.router.min_confidence) {
            return Err(PilotError::Config(format!(
                "router.min_confidence must be within [0, 1], got {}",
                self.router.min_confidence
            )));
        }
        if self.resolver.max_results == 0 {
            return Err(PilotError::Config(
                "resolver.max_results must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn search_scope(&self) -> Result<SearchScope, PilotError> {
        self.resolver
            .scope
            .ok_or_else(|| PilotError::Config("resolver.scope is not set".to_string()))
    }

    pub fn allowed_roots(&self) -> Vec<PathBuf> {
        self.resolver
            .allowed_roots
            .iter()
            .map(|p| expand_home(p))
            .collect()
    }

    pub fn candidate_roots(&self) -> Vec<PathBuf> {
        if self.resolver.candidate_roots.is_empty() {
            self.allowed_roots()
        } else {
            self.resolver
                .candidate_roots
                .iter()
                .map(|p| expand_home(p))
                .collect()
        }
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        let r = &self.resolver;
        ResolverSettings {
            allowed_roots: self.allowed_roots(),
            excluded_dirs: r.excluded_dirs.clone().unwrap_or_else(default_excluded_dirs),
            excluded_paths: r.excluded_paths.clone().unwrap_or_else(default_excluded_paths),
            max_depth: r.max_depth,
            restricted_max_depth: r.restricted_max_depth,
            max_results: r.max_results,
            timeout: Duration::from_millis(r.timeout_ms),
        }
    }

    pub fn router_settings(&self) -> RouterSettings {
        let defaults = RouterSettings::default();
        RouterSettings {
            default_backend: self.router.default_backend,
            force_task_type: self.router.force_task_type,
            fallback: self.router.fallback,
            best_effort_phases: self.router.best_effort_phases.clone(),
            browser_profile: self.router.browser_profile.clone(),
            desktop: self.backends.desktop.limits(defaults.desktop),
            browser: self.backends.browser.limits(defaults.browser),
        }
    }

    pub fn decomposer(&self) -> Decomposer {
        Decomposer::new().with_min_segment_chars(self.router.min_segment_chars)
    }

    pub fn classifier(&self) -> TaskClassifier {
        TaskClassifier::with_decomposer(self.decomposer())
            .with_min_confidence(self.router.min_confidence)
    }
}

fn finish(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<PilotConfig, PilotError> {
    let cfg: PilotConfig = builder
        .add_source(
            config::Environment::with_prefix("PILOT")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
}

/// 从 config 目录加载配置，环境变量 PILOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path，则追加该文件（必须存在，可覆盖前面的键）
/// 3. 最后叠加环境变量 PILOT__*
pub fn load_config(config_path: Option<PathBuf>) -> Result<PilotConfig, PilotError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default", "default"] {
        if Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    finish(builder)
}

/// 从 TOML 文本加载（环境变量同样生效）
pub fn load_config_str(toml: &str) -> Result<PilotConfig, PilotError> {
    finish(
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml)),
    )
}
