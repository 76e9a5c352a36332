//! 跟踪监听器注册
//!
//! 监听器以 `Arc` 指针身份区分。重复注册或注销未注册的监听器属于调用方错误，
//! 需返回给调用方。

use accel_core::{DeviceOrdinal, PlatformError, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEvent {
    ExecutorCreated {
        ordinal: DeviceOrdinal,
        executor_id: Uuid,
        cached: bool,
    },
    ExecutorCreationFailed {
        ordinal: DeviceOrdinal,
        reason: String,
    },
}

pub trait TraceListener: Send + Sync {
    fn on_event(&self, event: &TraceEvent);
}

/// 跟踪事件投递能力
pub trait TraceSink: Send + Sync {
    fn register(&self, listener: Arc<dyn TraceListener>) -> Result<()>;
    fn unregister(&self, listener: &Arc<dyn TraceListener>) -> Result<()>;
    fn deliver(&self, event: &TraceEvent);
}

/// 进程内的同步分发器
#[derive(Default)]
pub struct TraceDispatcher {
    listeners: RwLock<Vec<Arc<dyn TraceListener>>>,
}

impl TraceDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn listener_addr(listener: &Arc<dyn TraceListener>) -> *const () {
    Arc::as_ptr(listener).cast::<()>()
}

impl TraceSink for TraceDispatcher {
    fn register(&self, listener: Arc<dyn TraceListener>) -> Result<()> {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);

        let addr = listener_addr(&listener);
        if listeners.iter().any(|l| listener_addr(l) == addr) {
            return Err(PlatformError::DuplicateRegistration(format!(
                "trace listener {addr:p}"
            )));
        }

        listeners.push(listener);
        Ok(())
    }

    fn unregister(&self, listener: &Arc<dyn TraceListener>) -> Result<()> {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);

        let addr = listener_addr(listener);
        let position = listeners
            .iter()
            .position(|l| listener_addr(l) == addr)
            .ok_or_else(|| PlatformError::UnknownListener(format!("trace listener {addr:p}")))?;

        listeners.remove(position);
        Ok(())
    }

    fn deliver(&self, event: &TraceEvent) {
        // 先复制列表，回调中允许注册或注销
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for listener in listeners {
            listener.on_event(event);
        }
    }
}
