//! 核心数据模型：任务类型、分类结果、目标（Objective）与阶段间传递的产物映射

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// 阶段间传递的产物：名称 -> 文件路径（有序，保证报告与日志输出确定）
pub type Artifacts = BTreeMap<String, PathBuf>;

/// 上一阶段保存的文件（约定名称）
pub const LAST_SAVED_FILE: &str = "last_saved_file";

/// 分类器给出的任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// 桌面应用（屏幕识别后端）
    Desktop,
    /// 浏览器自动化
    Browser,
    /// 包含顺序标记的复合目标，需要先分解
    Sequential,
    /// 没有任何信号族达到阈值
    Ambiguous,
}

impl TaskType {
    /// 直接对应某个后端的类型；Sequential / Ambiguous 返回 None
    pub fn backend(self) -> Option<BackendKind> {
        match self {
            TaskType::Desktop => Some(BackendKind::Desktop),
            TaskType::Browser => Some(BackendKind::Browser),
            TaskType::Sequential | TaskType::Ambiguous => None,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskType::Desktop => "desktop",
            TaskType::Browser => "browser",
            TaskType::Sequential => "sequential",
            TaskType::Ambiguous => "ambiguous",
        };
        f.pad(s)
    }
}

/// 执行后端种类
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Desktop,
    Browser,
}

impl BackendKind {
    /// 回退时使用的另一个后端
    pub fn other(self) -> Self {
        match self {
            BackendKind::Desktop => BackendKind::Browser,
            BackendKind::Browser => BackendKind::Desktop,
        }
    }

    pub fn as_task_type(self) -> TaskType {
        match self {
            BackendKind::Desktop => TaskType::Desktop,
            BackendKind::Browser => TaskType::Browser,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Desktop => f.pad("desktop"),
            BackendKind::Browser => f.pad("browser"),
        }
    }
}

/// 分类结果
///
/// `confidence` 随命中信号的数量与强度单调变化；`matched_signals` 按评估器顺序记录命中的信号，供诊断。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub task_type: TaskType,
    pub confidence: f32,
    pub matched_signals: Vec<String>,
    /// Sequential / Ambiguous 时领先的 Desktop/Browser 桶（若达到阈值）
    pub recommendation: Option<TaskType>,
}

impl Classification {
    /// 未命中任何信号
    pub fn ambiguous() -> Self {
        Self {
            task_type: TaskType::Ambiguous,
            confidence: 0.0,
            matched_signals: Vec::new(),
            recommendation: None,
        }
    }

    /// 选择后端：明确类型直接映射，Sequential 用推荐桶，否则使用配置的默认后端
    pub fn backend_or(&self, default: BackendKind) -> BackendKind {
        match self.task_type {
            TaskType::Desktop | TaskType::Browser => {
                self.task_type.backend().unwrap_or(default)
            }
            TaskType::Sequential => self
                .recommendation
                .and_then(TaskType::backend)
                .unwrap_or(default),
            TaskType::Ambiguous => default,
        }
    }
}

/// 用户目标：不可变文本 + 可选的携带产物
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objective {
    text: String,
    artifacts: Artifacts,
}

impl Objective {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            artifacts: Artifacts::new(),
        }
    }

    pub fn with_artifact(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.artifacts.insert(name.into(), path.into());
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn artifacts(&self) -> &Artifacts {
        &self.artifacts
    }
}

impl From<&str> for Objective {
    fn from(text: &str) -> Self {
        Objective::new(text)
    }
}

impl From<String> for Objective {
    fn from(text: String) -> Self {
        Objective::new(text)
    }
}
