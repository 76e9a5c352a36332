//! Accel Platform - 加速器平台模块
//!
//! 提供执行器缓存、NUMA 拓扑索引、跟踪监听器注册、平台门面与平台注册表

pub mod enumerator;
pub mod executor;
pub mod executor_cache;
pub mod platform;
pub mod registry;
pub mod topology;
pub mod trace;

pub use enumerator::*;
pub use executor::*;
pub use executor_cache::*;
pub use platform::*;
pub use registry::*;
pub use topology::*;
pub use trace::*;
