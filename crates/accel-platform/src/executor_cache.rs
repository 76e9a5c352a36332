//! 执行器缓存
//!
//! 以 (设备序号, 插件配置, 设备选项) 为键记忆已构造的执行器，不做淘汰。
//!
//! 并发策略：同一个键的并发调用者阻塞等待第一个调用者完成构造，
//! 然后共享其结果（成功的执行器或同一个错误）。构造期间不持有全局锁，
//! 不同键可以并行构造。失败结果发布后即从缓存移除，下次调用重新构造。

use accel_core::{DeviceOptions, DeviceOrdinal, ExecutorConfig, PlatformError, PluginConfig, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::executor::Executor;

/// 缓存键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecutorKey {
    pub ordinal: DeviceOrdinal,
    pub plugin_config: PluginConfig,
    pub device_options: DeviceOptions,
}

impl From<&ExecutorConfig> for ExecutorKey {
    fn from(config: &ExecutorConfig) -> Self {
        Self {
            ordinal: config.ordinal,
            plugin_config: config.plugin_config.clone(),
            device_options: config.device_options.clone(),
        }
    }
}

enum SlotState {
    Pending,
    Ready(Arc<Executor>),
    Failed(PlatformError),
}

/// 单个键的构造槽位
struct Slot {
    state: Mutex<SlotState>,
    ready: Condvar,
    /// 正在等待构造结果的调用者数量
    waiters: AtomicUsize,
}

impl Slot {
    fn pending() -> Self {
        Self {
            state: Mutex::new(SlotState::Pending),
            ready: Condvar::new(),
            waiters: AtomicUsize::new(0),
        }
    }

    fn publish(&self, state: SlotState) {
        *lock(&self.state) = state;
        self.ready.notify_all();
    }

    fn wait(&self) -> Result<Arc<Executor>> {
        self.waiters.fetch_add(1, Ordering::SeqCst);
        let mut state = lock(&self.state);
        let result = loop {
            match &*state {
                SlotState::Pending => {
                    state = self.ready.wait(state).unwrap_or_else(PoisonError::into_inner);
                }
                SlotState::Ready(executor) => break Ok(Arc::clone(executor)),
                SlotState::Failed(err) => break Err(err.clone()),
            }
        };
        self.waiters.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn executor(&self) -> Option<Arc<Executor>> {
        match &*lock(&self.state) {
            SlotState::Ready(executor) => Some(Arc::clone(executor)),
            _ => None,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct ExecutorCache {
    slots: Mutex<HashMap<ExecutorKey, Arc<Slot>>>,
}

impl ExecutorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 命中时直接返回，未命中时由第一个调用者执行 `constructor`
    pub fn get_or_create<F>(&self, key: &ExecutorKey, constructor: F) -> Result<Arc<Executor>>
    where
        F: FnOnce() -> Result<Executor>,
    {
        let (slot, leader) = {
            let mut slots = lock(&self.slots);
            match slots.get(key) {
                Some(slot) => (Arc::clone(slot), false),
                None => {
                    let slot = Arc::new(Slot::pending());
                    slots.insert(key.clone(), Arc::clone(&slot));
                    (slot, true)
                }
            }
        };

        if !leader {
            return slot.wait();
        }

        let mut construction = Construction {
            cache: self,
            key,
            slot: &slot,
            finished: false,
        };
        let result = constructor().map(Arc::new);
        construction.finish(&result);
        result
    }

    /// 只查询，不构造
    pub fn get(&self, key: &ExecutorKey) -> Option<Arc<Executor>> {
        let slot = lock(&self.slots).get(key).cloned()?;
        slot.executor()
    }

    /// 正在等待 `key` 构造完成的调用者数量，不含构造者本身
    ///
    /// 被计入的调用者一定会拿到本次构造的结果。
    pub fn waiting(&self, key: &ExecutorKey) -> usize {
        lock(&self.slots)
            .get(key)
            .map_or(0, |slot| slot.waiters.load(Ordering::SeqCst))
    }

    /// 已成功构造的执行器数量
    pub fn len(&self) -> usize {
        lock(&self.slots)
            .values()
            .filter(|slot| slot.executor().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<ExecutorKey> {
        lock(&self.slots)
            .iter()
            .filter(|(_, slot)| slot.executor().is_some())
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn discard(&self, key: &ExecutorKey, slot: &Arc<Slot>) {
        let mut slots = lock(&self.slots);
        if slots.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(key);
        }
    }
}

/// 构造者持有的发布守卫，构造函数 panic 时仍会唤醒等待者
struct Construction<'a> {
    cache: &'a ExecutorCache,
    key: &'a ExecutorKey,
    slot: &'a Arc<Slot>,
    finished: bool,
}

impl Construction<'_> {
    fn finish(&mut self, result: &Result<Arc<Executor>>) {
        self.finished = true;
        match result {
            Ok(executor) => self.slot.publish(SlotState::Ready(Arc::clone(executor))),
            Err(err) => {
                debug!("执行器构造失败，不缓存: {:?}", self.key);
                self.slot.publish(SlotState::Failed(err.clone()));
                self.cache.discard(self.key, self.slot);
            }
        }
    }
}

impl Drop for Construction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.slot.publish(SlotState::Failed(PlatformError::ConstructionFailure {
            ordinal: self.key.ordinal.index(),
            reason: "constructor panicked".to_string(),
        }));
        self.cache.discard(self.key, self.slot);
    }
}
