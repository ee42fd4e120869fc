//! Pilot - 多后端任务编排核心
//!
//! 模块划分：
//! - **classify**: 多层信号分类器（URL、关键字族、动作动词、顺序标记）
//! - **decompose**: 顺序标记分词器与目标分解
//! - **resolver**: 自然语言文件描述 -> 允许根目录内按相关度排序的候选文件
//! - **backend**: 执行后端抽象、上传协调、Mock 后端
//! - **router**: 阶段状态机、回退链、运行报告、编排器
//! - **core**: 数据模型、错误分类、自动化界面独占与取消
//! - **config**: 配置加载（TOML + 环境变量）
//! - **observability**: 日志初始化

pub mod backend;
pub mod classify;
pub mod config;
pub mod core;
pub mod decompose;
pub mod observability;
pub mod resolver;
pub mod router;

pub use crate::core::{BackendKind, Classification, ErrorKind, Objective, PilotError, TaskType};
pub use crate::router::{Orchestrator, RunReport};
