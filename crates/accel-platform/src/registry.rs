//! 平台注册表模块
//!
//! 按平台标识或名称（不区分大小写）查找平台实例。注册表由应用显式创建并注入，
//! 平台随注册表一起销毁。

use accel_core::{PlatformError, PlatformId, Result};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

use crate::platform::Platform;

#[derive(Default)]
pub struct PlatformRegistry {
    platforms: RwLock<HashMap<PlatformId, Arc<dyn Platform>>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, platform: Arc<dyn Platform>) -> Result<()> {
        let mut platforms = self.platforms.write().unwrap_or_else(PoisonError::into_inner);

        let id = platform.id();
        if platforms.contains_key(&id) {
            return Err(PlatformError::DuplicateRegistration(format!("platform id {id}")));
        }

        let name = platform.name().to_string();
        if platforms.values().any(|p| p.name().eq_ignore_ascii_case(&name)) {
            return Err(PlatformError::DuplicateRegistration(format!("platform name {name}")));
        }

        platforms.insert(id, platform);
        info!("注册平台: {} ({})", name, id);

        Ok(())
    }

    pub fn platform_with_id(&self, id: PlatformId) -> Result<Arc<dyn Platform>> {
        let platforms = self.platforms.read().unwrap_or_else(PoisonError::into_inner);

        platforms
            .get(&id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("platform id {id}")))
    }

    pub fn platform_with_name(&self, name: &str) -> Result<Arc<dyn Platform>> {
        let platforms = self.platforms.read().unwrap_or_else(PoisonError::into_inner);

        platforms
            .values()
            .find(|p| p.name().eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("platform name {name}")))
    }

    pub fn platforms(&self) -> Vec<Arc<dyn Platform>> {
        let platforms = self.platforms.read().unwrap_or_else(PoisonError::into_inner);
        platforms.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.platforms.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
