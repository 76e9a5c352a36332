//! Accel Testing - 测试替身
//!
//! 提供 mockall 生成的枚举器与跟踪投递 mock、可编排的假枚举器，以及端到端场景测试。

pub mod enumerator;
pub mod trace;

#[cfg(test)]
mod scenarios;

pub use enumerator::*;
pub use trace::*;
