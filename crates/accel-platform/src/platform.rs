//! 平台门面
//!
//! 持有执行器缓存与拓扑索引，对外提供设备数量、执行器获取、总线查询
//! 以及跟踪监听器注册。

use accel_core::{
    BusOrdinal, DeviceOrdinal, ExecutorConfig, PlatformConfig, PlatformError, PlatformId,
    PluginConfig, Result,
};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::enumerator::DeviceEnumerator;
use crate::executor::Executor;
use crate::executor_cache::{ExecutorCache, ExecutorKey};
use crate::topology::{TopologyBuild, TopologyIndex};
use crate::trace::{TraceDispatcher, TraceEvent, TraceListener, TraceSink};

pub const GPU_PLATFORM_ID: PlatformId = PlatformId::new("gpu");
pub const GPU_PLATFORM_NAME: &str = "GPU";

/// 平台接口
pub trait Platform: Send + Sync {
    fn id(&self) -> PlatformId;

    fn name(&self) -> &str;

    /// 可见设备数量
    ///
    /// 枚举失败时记录错误并返回 -1。这是唯一不返回显式错误的接口，
    /// 为兼容期望整数结果的旧调用方而保留，负值应视为“未知”而非 0。
    fn visible_device_count(&self) -> i64;

    /// 不同总线（NUMA 节点）的数量
    fn bus_count(&self) -> Result<usize>;

    fn device_to_bus(&self, ordinal: DeviceOrdinal) -> Result<BusOrdinal>;

    /// 指定总线上序号最小的设备的执行器
    fn first_executor_for_bus(&self, bus: BusOrdinal) -> Result<Arc<Executor>>;

    fn executor_for_device(&self, ordinal: DeviceOrdinal) -> Result<Arc<Executor>>;

    fn executor_for_device_with_plugin_config(
        &self,
        ordinal: DeviceOrdinal,
        plugin_config: &PluginConfig,
    ) -> Result<Arc<Executor>>;

    fn get_executor(&self, config: &ExecutorConfig) -> Result<Arc<Executor>>;

    /// 绕过缓存，返回的执行器由调用方独占
    fn get_uncached_executor(&self, config: &ExecutorConfig) -> Result<Executor>;

    fn register_trace_listener(&self, listener: Arc<dyn TraceListener>) -> Result<()>;

    fn unregister_trace_listener(&self, listener: &Arc<dyn TraceListener>) -> Result<()>;
}

pub struct GpuPlatform {
    id: PlatformId,
    name: String,
    config: PlatformConfig,
    enumerator: Arc<dyn DeviceEnumerator>,
    trace_sink: Arc<dyn TraceSink>,
    executor_cache: ExecutorCache,
    topology: OnceCell<TopologyBuild>,
}

impl GpuPlatform {
    pub fn new(enumerator: Arc<dyn DeviceEnumerator>) -> Self {
        Self::builder(enumerator).build()
    }

    pub fn builder(enumerator: Arc<dyn DeviceEnumerator>) -> GpuPlatformBuilder {
        GpuPlatformBuilder::new(enumerator)
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    /// 拓扑构建结果，首次调用时构建
    ///
    /// 只有成功的构建会被缓存，枚举失败时下次调用重试。
    pub fn topology(&self) -> Result<&TopologyBuild> {
        self.topology.get_or_try_init(|| {
            let device_count = self
                .enumerator
                .visible_device_count()
                .map_err(|e| PlatformError::enumeration(&e))?;

            let build = TopologyIndex::build(device_count, |ordinal| self.enumerator.numa_node(ordinal))?;
            info!(
                "平台 {} 拓扑: {} 个设备, {} 条总线",
                self.name,
                device_count,
                build.index.bus_count()
            );
            Ok(build)
        })
    }

    pub fn cached_executor_count(&self) -> usize {
        self.executor_cache.len()
    }

    /// 正在等待同一配置执行器构造完成的调用者数量
    pub fn waiting_callers(&self, config: &ExecutorConfig) -> usize {
        self.executor_cache.waiting(&ExecutorKey::from(config))
    }

    fn check_ordinal(&self, ordinal: DeviceOrdinal) -> Result<()> {
        let device_count = self
            .enumerator
            .visible_device_count()
            .map_err(|e| PlatformError::enumeration(&e))?;

        if ordinal.index() >= device_count {
            return Err(PlatformError::InvalidArgument(format!(
                "{ordinal} out of range, {device_count} devices visible"
            )));
        }
        Ok(())
    }

    fn construct(&self, config: &ExecutorConfig) -> Result<Executor> {
        self.check_ordinal(config.ordinal)?;

        let context = self
            .enumerator
            .create_context(config)
            .map_err(|e| PlatformError::construction(config.ordinal.index(), &e))?;

        let executor = Executor::new(config.clone(), context);
        debug!("创建执行器 {} ({})", executor.id(), config.ordinal);
        Ok(executor)
    }

    fn trace_outcome(&self, ordinal: DeviceOrdinal, outcome: std::result::Result<Uuid, &PlatformError>, cached: bool) {
        let event = match outcome {
            Ok(executor_id) => TraceEvent::ExecutorCreated {
                ordinal,
                executor_id,
                cached,
            },
            Err(err) => {
                warn!("为 {} 创建执行器失败: {}", ordinal, err);
                TraceEvent::ExecutorCreationFailed {
                    ordinal,
                    reason: err.to_string(),
                }
            }
        };
        self.trace_sink.deliver(&event);
    }
}

impl Platform for GpuPlatform {
    fn id(&self) -> PlatformId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn visible_device_count(&self) -> i64 {
        match self.enumerator.visible_device_count() {
            Ok(count) => i64::try_from(count).unwrap_or(i64::MAX),
            Err(e) => {
                error!("获取平台 {} 的可见设备数量失败: {:#}", self.name, e);
                -1
            }
        }
    }

    fn bus_count(&self) -> Result<usize> {
        Ok(self.topology()?.index.bus_count())
    }

    fn device_to_bus(&self, ordinal: DeviceOrdinal) -> Result<BusOrdinal> {
        self.topology()?.index.bus_for_device(ordinal)
    }

    fn first_executor_for_bus(&self, bus: BusOrdinal) -> Result<Arc<Executor>> {
        let ordinal = self.topology()?.index.first_device_on_bus(bus)?;
        self.executor_for_device(ordinal)
    }

    fn executor_for_device(&self, ordinal: DeviceOrdinal) -> Result<Arc<Executor>> {
        let plugin_config = self.config.default_plugin_config.clone();
        self.executor_for_device_with_plugin_config(ordinal, &plugin_config)
    }

    fn executor_for_device_with_plugin_config(
        &self,
        ordinal: DeviceOrdinal,
        plugin_config: &PluginConfig,
    ) -> Result<Arc<Executor>> {
        let config = ExecutorConfig::new(ordinal)
            .plugin_config(plugin_config.clone())
            .device_options(self.config.default_device_options.clone());
        self.get_executor(&config)
    }

    fn get_executor(&self, config: &ExecutorConfig) -> Result<Arc<Executor>> {
        let key = ExecutorKey::from(config);
        let mut constructed = false;

        let result = self.executor_cache.get_or_create(&key, || {
            constructed = true;
            self.construct(config)
        });

        // 在发布结果之后投递事件，监听器可以安全地回调平台
        if constructed {
            self.trace_outcome(config.ordinal, result.as_ref().map(|e| e.id()), true);
        }
        result
    }

    fn get_uncached_executor(&self, config: &ExecutorConfig) -> Result<Executor> {
        let result = self.construct(config);
        self.trace_outcome(config.ordinal, result.as_ref().map(Executor::id), false);
        result
    }

    fn register_trace_listener(&self, listener: Arc<dyn TraceListener>) -> Result<()> {
        self.trace_sink.register(listener).inspect_err(|e| {
            warn!("注册跟踪监听器失败: {}", e);
        })?;
        info!("平台 {} 注册跟踪监听器", self.name);
        Ok(())
    }

    fn unregister_trace_listener(&self, listener: &Arc<dyn TraceListener>) -> Result<()> {
        self.trace_sink.unregister(listener).inspect_err(|e| {
            warn!("注销跟踪监听器失败: {}", e);
        })?;
        info!("平台 {} 注销跟踪监听器", self.name);
        Ok(())
    }
}

/// 平台构建器
pub struct GpuPlatformBuilder {
    id: PlatformId,
    name: String,
    config: PlatformConfig,
    enumerator: Arc<dyn DeviceEnumerator>,
    trace_sink: Option<Arc<dyn TraceSink>>,
}

impl GpuPlatformBuilder {
    pub fn new(enumerator: Arc<dyn DeviceEnumerator>) -> Self {
        Self {
            id: GPU_PLATFORM_ID,
            name: GPU_PLATFORM_NAME.to_string(),
            config: PlatformConfig::default(),
            enumerator,
            trace_sink: None,
        }
    }

    pub fn id(mut self, id: PlatformId) -> Self {
        self.id = id;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn config(mut self, config: PlatformConfig) -> Self {
        self.config = config;
        self
    }

    pub fn trace_sink(mut self, trace_sink: Arc<dyn TraceSink>) -> Self {
        self.trace_sink = Some(trace_sink);
        self
    }

    pub fn build(self) -> GpuPlatform {
        let platform = GpuPlatform {
            id: self.id,
            name: self.name,
            config: self.config,
            enumerator: self.enumerator,
            trace_sink: self
                .trace_sink
                .unwrap_or_else(|| Arc::new(TraceDispatcher::new())),
            executor_cache: ExecutorCache::new(),
            topology: OnceCell::new(),
        };

        if platform.config.eager_topology
            && let Err(e) = platform.topology()
        {
            warn!("平台 {} 预先构建拓扑失败，将在首次查询时重试: {}", platform.name, e);
        }

        platform
    }
}
