//! 设备枚举能力
//!
//! 平台本身不访问硬件，驱动调用通过此 trait 注入。

use accel_core::{DeviceOrdinal, ExecutorConfig};

/// 已分配的设备上下文，drop 时释放
pub trait DeviceContext: Send + Sync {
    fn device_name(&self) -> &str;
}

/// 设备枚举器
pub trait DeviceEnumerator: Send + Sync {
    /// 可见设备数量
    fn visible_device_count(&self) -> anyhow::Result<usize>;

    /// 设备所在的 NUMA 节点，负值表示未知
    fn numa_node(&self, ordinal: DeviceOrdinal) -> anyhow::Result<i32>;

    /// 为指定配置创建设备上下文
    fn create_context(&self, config: &ExecutorConfig) -> anyhow::Result<Box<dyn DeviceContext>>;
}
