//! 平台配置
//!
//! 配置文件为 JSON，缺失的字段使用默认值

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PlatformError, Result};
use crate::types::{DeviceOptions, PluginConfig};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// 构造平台时立即建立拓扑索引
    pub eager_topology: bool,
    /// `executor_for_device` 使用的插件配置
    pub default_plugin_config: PluginConfig,
    /// 未指定时使用的设备选项
    pub default_device_options: DeviceOptions,
    pub log_level: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            eager_topology: false,
            default_plugin_config: PluginConfig::default(),
            default_device_options: DeviceOptions::default(),
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl PlatformConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| PlatformError::Config(format!("failed to read {}: {}", path.display(), e)))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| PlatformError::Config(format!("failed to parse {}: {}", path.display(), e)))?;

        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| PlatformError::Config(format!("failed to create directory: {}", e)))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| PlatformError::Config(format!("failed to serialize config: {}", e)))?;

        fs::write(path, content)
            .map_err(|e| PlatformError::Config(format!("failed to write {}: {}", path.display(), e)))?;

        Ok(())
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".accel")
            .join("platform.json")
    }
}
