//! 执行器：持有设备上下文的句柄

use accel_core::{DeviceOrdinal, ExecutorConfig};
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

use crate::enumerator::DeviceContext;

pub struct Executor {
    id: Uuid,
    config: ExecutorConfig,
    created_at: DateTime<Utc>,
    context: Box<dyn DeviceContext>,
}

impl Executor {
    pub fn new(config: ExecutorConfig, context: Box<dyn DeviceContext>) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            created_at: Utc::now(),
            context,
        }
    }

    /// 实例标识，每次构造都不同
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn ordinal(&self) -> DeviceOrdinal {
        self.config.ordinal
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn device_name(&self) -> &str {
        self.context.device_name()
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("id", &self.id)
            .field("ordinal", &self.config.ordinal)
            .field("device", &self.context.device_name())
            .field("created_at", &self.created_at)
            .finish()
    }
}
