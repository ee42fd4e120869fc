//! 核心层：数据模型、错误分类、自动化界面独占与运行监管

pub mod error;
pub mod surface;
pub mod types;

pub use error::{ErrorKind, PilotError};
pub use surface::{RunSupervisor, SessionHandle, Surface, SurfaceLease, SurfaceRegistry};
pub use types::{Artifacts, BackendKind, Classification, Objective, TaskType, LAST_SAVED_FILE};
