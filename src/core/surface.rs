//! 自动化界面独占与运行监管
//!
//! 同一时刻只有一次运行可以持有某个自动化界面（桌面屏幕，或某个浏览器 profile）。
//! `SurfaceRegistry::try_acquire` 返回 RAII 租约，Drop 时释放，失败/取消/panic 路径同样释放。
//! `RunSupervisor` 持有 CancellationToken，在阶段边界检查取消。

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::error::PilotError;
use crate::core::types::BackendKind;

/// 可被独占的自动化界面
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    Desktop,
    BrowserProfile(String),
}

impl Surface {
    /// 某个后端需要的界面
    pub fn for_backend(kind: BackendKind, browser_profile: &str) -> Self {
        match kind {
            BackendKind::Desktop => Surface::Desktop,
            BackendKind::Browser => Surface::BrowserProfile(browser_profile.to_string()),
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Surface::Desktop => f.write_str("desktop"),
            Surface::BrowserProfile(p) => write!(f, "browser:{p}"),
        }
    }
}

/// 界面占用表（进程内共享，按运行 id 记录持有者）
#[derive(Debug, Default)]
pub struct SurfaceRegistry {
    held: Mutex<HashMap<Surface, Uuid>>,
}

impl SurfaceRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 一次性获取全部界面；任何一个被占用则不获取任何一个
    pub fn try_acquire(
        self: &Arc<Self>,
        surfaces: &[Surface],
        run_id: Uuid,
    ) -> Result<SurfaceLease, PilotError> {
        let mut held = match self.held.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for surface in surfaces {
            if let Some(holder) = held.get(surface) {
                return Err(PilotError::SurfaceBusy {
                    surface: surface.to_string(),
                    holder: holder.to_string(),
                });
            }
        }
        let mut acquired: Vec<Surface> = Vec::with_capacity(surfaces.len());
        for surface in surfaces {
            if !acquired.contains(surface) {
                held.insert(surface.clone(), run_id);
                acquired.push(surface.clone());
            }
        }
        tracing::debug!(run_id = %run_id, surfaces = ?acquired, "surfaces acquired");
        Ok(SurfaceLease {
            registry: Arc::clone(self),
            surfaces: acquired,
            run_id,
        })
    }

    pub fn is_held(&self, surface: &Surface) -> bool {
        match self.held.lock() {
            Ok(held) => held.contains_key(surface),
            Err(poisoned) => poisoned.into_inner().contains_key(surface),
        }
    }

    fn release(&self, surfaces: &[Surface], run_id: Uuid) {
        let mut held = match self.held.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for surface in surfaces {
            if held.get(surface) == Some(&run_id) {
                held.remove(surface);
            }
        }
        tracing::debug!(run_id = %run_id, "surfaces released");
    }
}

/// 界面租约：持有期间其他运行无法获取同一界面
#[derive(Debug)]
pub struct SurfaceLease {
    registry: Arc<SurfaceRegistry>,
    surfaces: Vec<Surface>,
    run_id: Uuid,
}

impl SurfaceLease {
    /// 传给后端的会话句柄
    pub fn session(&self, kind: BackendKind, browser_profile: &str) -> SessionHandle {
        SessionHandle {
            run_id: self.run_id,
            surface: Surface::for_backend(kind, browser_profile),
        }
    }
}

impl Drop for SurfaceLease {
    fn drop(&mut self) {
        self.registry.release(&self.surfaces, self.run_id);
    }
}

/// 显式会话句柄：替代进程级的「当前 profile」全局状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionHandle {
    pub run_id: Uuid,
    pub surface: Surface,
}

/// 运行级监管：取消令牌
#[derive(Debug, Clone, Default)]
pub struct RunSupervisor {
    cancel_token: CancellationToken,
}

impl RunSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 请求取消：下一个阶段边界生效；进行中的阶段由后端自行尽力响应
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// 交给单个阶段的子 token
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_is_exclusive_and_released_on_drop() {
        let registry = SurfaceRegistry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let lease = registry.try_acquire(&[Surface::Desktop], a).unwrap();
        assert!(registry.is_held(&Surface::Desktop));

        let err = registry.try_acquire(&[Surface::Desktop], b).unwrap_err();
        assert!(matches!(err, PilotError::SurfaceBusy { .. }));

        drop(lease);
        assert!(!registry.is_held(&Surface::Desktop));
        assert!(registry.try_acquire(&[Surface::Desktop], b).is_ok());
    }

    #[test]
    fn test_all_or_nothing_acquisition() {
        let registry = SurfaceRegistry::new();
        let profile = Surface::BrowserProfile("work".into());
        let _held = registry.try_acquire(&[profile.clone()], Uuid::new_v4()).unwrap();

        let result = registry.try_acquire(&[Surface::Desktop, profile], Uuid::new_v4());
        assert!(result.is_err());
        assert!(!registry.is_held(&Surface::Desktop));
    }

    #[test]
    fn test_distinct_browser_profiles_do_not_conflict() {
        let registry = SurfaceRegistry::new();
        let _a = registry
            .try_acquire(&[Surface::BrowserProfile("a".into())], Uuid::new_v4())
            .unwrap();
        assert!(registry
            .try_acquire(&[Surface::BrowserProfile("b".into())], Uuid::new_v4())
            .is_ok());
    }

    #[test]
    fn test_supervisor_child_token_follows_parent() {
        let supervisor = RunSupervisor::new();
        let child = supervisor.child_token();
        assert!(!child.is_cancelled());
        supervisor.cancel();
        assert!(child.is_cancelled());
        assert!(supervisor.is_cancelled());
    }
}
