//! 设备与执行器相关的基础类型

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 设备序号，由设备枚举器分配，进程生命周期内稳定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceOrdinal(pub usize);

impl DeviceOrdinal {
    pub fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for DeviceOrdinal {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

impl fmt::Display for DeviceOrdinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device:{}", self.0)
    }
}

/// 总线序号，NUMA 节点压缩后的连续编号 `[0, bus_count)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusOrdinal(pub usize);

impl BusOrdinal {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for BusOrdinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bus:{}", self.0)
    }
}

/// 平台标识
///
/// 无需实例化平台即可区分不同的平台实现。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlatformId(&'static str);

impl PlatformId {
    pub const fn new(id: &'static str) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// 支持库插件选择
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginId {
    #[default]
    Default,
    Registered(u64),
}

/// 插件配置，与设备序号一起构成执行器缓存键
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    pub blas: PluginId,
    pub dnn: PluginId,
    pub fft: PluginId,
    pub rng: PluginId,
}

impl PluginConfig {
    pub fn with_blas(mut self, plugin: PluginId) -> Self {
        self.blas = plugin;
        self
    }

    pub fn with_dnn(mut self, plugin: PluginId) -> Self {
        self.dnn = plugin;
        self
    }

    pub fn with_fft(mut self, plugin: PluginId) -> Self {
        self.fft = plugin;
        self
    }

    pub fn with_rng(mut self, plugin: PluginId) -> Self {
        self.rng = plugin;
        self
    }
}

/// 设备上下文的调度方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    #[default]
    Auto,
    Spin,
    Yield,
    BlockingSync,
}

/// 设备上下文选项
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceOptions {
    pub schedule: ScheduleMode,
    pub map_host_memory: bool,
    /// 平台相关的附加标签
    pub non_portable_tags: BTreeMap<String, String>,
}

/// 执行器请求描述
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub ordinal: DeviceOrdinal,
    #[serde(default)]
    pub plugin_config: PluginConfig,
    #[serde(default)]
    pub device_options: DeviceOptions,
}

impl ExecutorConfig {
    pub fn new(ordinal: impl Into<DeviceOrdinal>) -> Self {
        Self {
            ordinal: ordinal.into(),
            plugin_config: PluginConfig::default(),
            device_options: DeviceOptions::default(),
        }
    }

    pub fn plugin_config(mut self, plugin_config: PluginConfig) -> Self {
        self.plugin_config = plugin_config;
        self
    }

    pub fn device_options(mut self, device_options: DeviceOptions) -> Self {
        self.device_options = device_options;
        self
    }
}
