//! Accel Core - 核心类型和抽象
//!
//! 提供设备序号、执行器配置、统一错误处理、配置与日志初始化。

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use types::*;
