use accel_core::{DeviceOrdinal, ExecutorConfig};
use accel_platform::{DeviceContext, DeviceEnumerator};
use mockall::mock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::thread;
use std::time::Duration;

mock! {
    pub Enumerator {}

    impl DeviceEnumerator for Enumerator {
        fn visible_device_count(&self) -> anyhow::Result<usize>;
        fn numa_node(&self, ordinal: DeviceOrdinal) -> anyhow::Result<i32>;
        fn create_context(&self, config: &ExecutorConfig) -> anyhow::Result<Box<dyn DeviceContext>>;
    }
}

#[derive(Debug, Clone)]
pub struct FakeContext {
    name: String,
}

impl FakeContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl DeviceContext for FakeContext {
    fn device_name(&self) -> &str {
        &self.name
    }
}

/// 可编排的设备枚举器
///
/// `numa` 中每一项对应一个设备，`None` 表示该设备的 NUMA 查询失败。
pub struct FakeEnumerator {
    numa: Vec<Option<i32>>,
    construction_delay: Duration,
    count_fails: AtomicBool,
    construction_fails: AtomicBool,
    constructions: AtomicUsize,
    numa_queries: AtomicUsize,
    /// 为 true 时 `create_context` 阻塞，直到 `release_constructions`
    held: Mutex<bool>,
    released: Condvar,
}

impl FakeEnumerator {
    pub fn new(numa: Vec<Option<i32>>) -> Self {
        Self {
            numa,
            construction_delay: Duration::ZERO,
            count_fails: AtomicBool::new(false),
            construction_fails: AtomicBool::new(false),
            constructions: AtomicUsize::new(0),
            numa_queries: AtomicUsize::new(0),
            held: Mutex::new(false),
            released: Condvar::new(),
        }
    }

    pub fn with_devices(count: usize) -> Self {
        Self::new(vec![Some(0); count])
    }

    pub fn construction_delay(mut self, delay: Duration) -> Self {
        self.construction_delay = delay;
        self
    }

    pub fn set_count_fails(&self, fails: bool) {
        self.count_fails.store(fails, Ordering::SeqCst);
    }

    pub fn set_construction_fails(&self, fails: bool) {
        self.construction_fails.store(fails, Ordering::SeqCst);
    }

    /// 之后进入 `create_context` 的调用在计数后阻塞
    pub fn hold_constructions(&self) {
        *self.held.lock().unwrap() = true;
    }

    pub fn release_constructions(&self) {
        *self.held.lock().unwrap() = false;
        self.released.notify_all();
    }

    /// `create_context` 被调用的次数（含失败）
    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }

    pub fn numa_queries(&self) -> usize {
        self.numa_queries.load(Ordering::SeqCst)
    }
}

impl DeviceEnumerator for FakeEnumerator {
    fn visible_device_count(&self) -> anyhow::Result<usize> {
        if self.count_fails.load(Ordering::SeqCst) {
            anyhow::bail!("driver returned CUDA_ERROR_NOT_INITIALIZED");
        }
        Ok(self.numa.len())
    }

    fn numa_node(&self, ordinal: DeviceOrdinal) -> anyhow::Result<i32> {
        self.numa_queries.fetch_add(1, Ordering::SeqCst);
        self.numa
            .get(ordinal.index())
            .copied()
            .flatten()
            .ok_or_else(|| anyhow::anyhow!("could not read numa_node for {ordinal}"))
    }

    fn create_context(&self, config: &ExecutorConfig) -> anyhow::Result<Box<dyn DeviceContext>> {
        self.constructions.fetch_add(1, Ordering::SeqCst);
        let mut held = self.held.lock().unwrap();
        while *held {
            held = self.released.wait(held).unwrap();
        }
        drop(held);
        if !self.construction_delay.is_zero() {
            thread::sleep(self.construction_delay);
        }
        if self.construction_fails.load(Ordering::SeqCst) {
            anyhow::bail!("context creation failed on {}", config.ordinal);
        }
        Ok(Box::new(FakeContext::new(format!("fake-gpu-{}", config.ordinal.index()))))
    }
}
