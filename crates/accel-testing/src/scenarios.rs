use accel_core::{
    BusOrdinal, DeviceOrdinal, ExecutorConfig, PlatformError, PluginConfig, PluginId, init_logging,
};
use accel_platform::{
    GPU_PLATFORM_ID, GpuPlatform, Platform, PlatformRegistry, TraceDispatcher, TraceEvent,
    TraceListener,
};
use mockall::predicate::eq;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use crate::enumerator::{FakeContext, FakeEnumerator, MockEnumerator};
use crate::trace::{MockSink, RecordingListener};

/// 轮询直到条件成立，超时返回 false
fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

fn setup(enumerator: FakeEnumerator) -> (Arc<FakeEnumerator>, GpuPlatform) {
    init_logging("debug");
    let enumerator = Arc::new(enumerator);
    let platform = GpuPlatform::new(enumerator.clone());
    (enumerator, platform)
}

#[test]
fn test_sparse_topology_through_platform() {
    let (enumerator, platform) =
        setup(FakeEnumerator::new(vec![Some(2), Some(2), Some(5), None, Some(5)]));

    assert_eq!(platform.bus_count().unwrap(), 2);
    assert_eq!(platform.device_to_bus(DeviceOrdinal(0)).unwrap(), BusOrdinal(0));
    assert_eq!(platform.device_to_bus(DeviceOrdinal(1)).unwrap(), BusOrdinal(0));
    assert_eq!(platform.device_to_bus(DeviceOrdinal(2)).unwrap(), BusOrdinal(1));
    assert_eq!(platform.device_to_bus(DeviceOrdinal(4)).unwrap(), BusOrdinal(1));
    assert!(matches!(
        platform.device_to_bus(DeviceOrdinal(3)),
        Err(PlatformError::NotFound(_))
    ));

    let topology = platform.topology().unwrap();
    assert_eq!(topology.index.first_device_on_bus(BusOrdinal(0)).unwrap(), DeviceOrdinal(0));
    assert_eq!(topology.index.first_device_on_bus(BusOrdinal(1)).unwrap(), DeviceOrdinal(2));
    assert_eq!(topology.excluded.len(), 1);
    assert_eq!(topology.excluded[0].ordinal, DeviceOrdinal(3));

    let executor = platform.first_executor_for_bus(BusOrdinal(1)).unwrap();
    assert_eq!(executor.ordinal(), DeviceOrdinal(2));
    assert!(matches!(
        platform.first_executor_for_bus(BusOrdinal(2)),
        Err(PlatformError::NotFound(_))
    ));

    assert_eq!(enumerator.numa_queries(), 5);
    assert_eq!(enumerator.constructions(), 1);
}

#[test]
fn test_no_devices() {
    let (enumerator, platform) = setup(FakeEnumerator::with_devices(0));

    assert_eq!(platform.visible_device_count(), 0);
    assert_eq!(platform.bus_count().unwrap(), 0);
    assert!(matches!(
        platform.executor_for_device(DeviceOrdinal(0)),
        Err(PlatformError::InvalidArgument(_))
    ));
    assert_eq!(enumerator.constructions(), 0);
}

#[test]
fn test_visible_device_count_sentinel() {
    let (enumerator, platform) = setup(FakeEnumerator::with_devices(2));

    enumerator.set_count_fails(true);
    assert_eq!(platform.visible_device_count(), -1);

    enumerator.set_count_fails(false);
    assert_eq!(platform.visible_device_count(), 2);
}

#[test]
fn test_concurrent_same_key_single_construction() {
    let (enumerator, platform) =
        setup(FakeEnumerator::with_devices(2).construction_delay(Duration::from_millis(50)));
    let barrier = Barrier::new(16);
    let plugin_config = PluginConfig::default().with_blas(PluginId::Registered(1));

    let executors: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..16)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    platform.executor_for_device_with_plugin_config(DeviceOrdinal(1), &plugin_config)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect()
    });

    assert_eq!(enumerator.constructions(), 1);
    assert!(executors.iter().all(|e| Arc::ptr_eq(e, &executors[0])));
    assert_eq!(platform.cached_executor_count(), 1);
}

#[test]
fn test_concurrent_failure_is_shared_and_not_cached() {
    let (enumerator, platform) = setup(FakeEnumerator::with_devices(1));
    enumerator.set_construction_fails(true);
    enumerator.hold_constructions();
    let config = ExecutorConfig::new(0);

    let (parked, errors): (bool, Vec<_>) = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| platform.executor_for_device(DeviceOrdinal(0))))
            .collect();
        // 构造者被挡住，其余七个调用者都挂在同一个槽位上
        let parked = wait_until(|| {
            enumerator.constructions() == 1 && platform.waiting_callers(&config) == 7
        });
        enumerator.release_constructions();
        let errors = handles.into_iter().map(|h| h.join().unwrap().unwrap_err()).collect();
        (parked, errors)
    });

    assert!(parked);
    assert_eq!(enumerator.constructions(), 1);
    assert!(matches!(errors[0], PlatformError::ConstructionFailure { ordinal: 0, .. }));
    assert!(errors.iter().all(|e| e == &errors[0]));
    assert_eq!(platform.cached_executor_count(), 0);
    assert_eq!(platform.waiting_callers(&config), 0);

    enumerator.set_construction_fails(false);
    let executor = platform.executor_for_device(DeviceOrdinal(0)).unwrap();
    assert_eq!(executor.device_name(), "fake-gpu-0");
    assert_eq!(enumerator.constructions(), 2);
}

#[test]
fn test_distinct_keys_construct_in_parallel() {
    let (enumerator, platform) = setup(FakeEnumerator::with_devices(6));
    enumerator.hold_constructions();

    // 六个构造同时停在 create_context 中，说明构造期间没有持有全局锁
    let all_inside = thread::scope(|s| {
        for ordinal in 0..6 {
            let platform = &platform;
            s.spawn(move || {
                platform.executor_for_device(DeviceOrdinal(ordinal)).unwrap();
            });
        }
        let all_inside = wait_until(|| enumerator.constructions() == 6);
        enumerator.release_constructions();
        all_inside
    });

    assert!(all_inside);
    assert_eq!(enumerator.constructions(), 6);
    assert_eq!(platform.cached_executor_count(), 6);
}

#[test]
fn test_concurrent_topology_built_once() {
    let (enumerator, platform) = setup(FakeEnumerator::new(vec![Some(1), Some(0), Some(1)]));
    let barrier = Barrier::new(8);

    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                barrier.wait();
                assert_eq!(platform.bus_count().unwrap(), 2);
            });
        }
    });

    assert_eq!(enumerator.numa_queries(), 3);
}

#[test]
fn test_uncached_never_matches_cache() {
    let (enumerator, platform) = setup(FakeEnumerator::with_devices(3));

    for ordinal in 0..3 {
        let config = ExecutorConfig::new(ordinal);
        let cached = platform.get_executor(&config).unwrap();
        let owned = platform.get_uncached_executor(&config).unwrap();

        assert_ne!(owned.id(), cached.id());
        assert!(!std::ptr::eq(&owned, Arc::as_ptr(&cached)));
        assert!(Arc::ptr_eq(&cached, &platform.get_executor(&config).unwrap()));
    }

    assert_eq!(enumerator.constructions(), 6);
    assert_eq!(platform.cached_executor_count(), 3);
}

#[test]
fn test_listener_contracts() {
    let (_, platform) = setup(FakeEnumerator::with_devices(1));
    let recorder = RecordingListener::new();
    let listener: Arc<dyn TraceListener> = recorder.clone();
    let stranger: Arc<dyn TraceListener> = RecordingListener::new();

    platform.register_trace_listener(listener.clone()).unwrap();
    assert!(matches!(
        platform.register_trace_listener(listener.clone()),
        Err(PlatformError::DuplicateRegistration(_))
    ));
    assert!(matches!(
        platform.unregister_trace_listener(&stranger),
        Err(PlatformError::UnknownListener(_))
    ));

    // 之前的注册不受影响
    let executor = platform.executor_for_device(DeviceOrdinal(0)).unwrap();
    platform.executor_for_device(DeviceOrdinal(0)).unwrap();
    assert_eq!(
        recorder.events(),
        vec![TraceEvent::ExecutorCreated {
            ordinal: DeviceOrdinal(0),
            executor_id: executor.id(),
            cached: true,
        }]
    );

    platform.unregister_trace_listener(&listener).unwrap();
    assert!(matches!(
        platform.unregister_trace_listener(&listener),
        Err(PlatformError::UnknownListener(_))
    ));
}

#[test]
fn test_failure_events() {
    let (enumerator, platform) = setup(FakeEnumerator::with_devices(1));
    let recorder = RecordingListener::new();
    platform.register_trace_listener(recorder.clone()).unwrap();

    enumerator.set_construction_fails(true);
    platform.get_uncached_executor(&ExecutorConfig::new(0)).unwrap_err();

    let events = recorder.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        TraceEvent::ExecutorCreationFailed { ordinal: DeviceOrdinal(0), reason } if reason.contains("context creation failed")
    ));
}

#[test]
fn test_trace_sink_pass_through() {
    let mut sink = MockSink::new();
    sink.expect_register().times(1).returning(|_| Ok(()));
    sink.expect_unregister()
        .times(1)
        .returning(|_| Err(PlatformError::UnknownListener("mock".to_string())));
    sink.expect_deliver()
        .withf(|event| matches!(event, TraceEvent::ExecutorCreated { cached: false, .. }))
        .times(1)
        .return_const(());

    let platform = GpuPlatform::builder(Arc::new(FakeEnumerator::with_devices(1)))
        .trace_sink(Arc::new(sink))
        .build();
    let listener: Arc<dyn TraceListener> = RecordingListener::new();

    platform.register_trace_listener(listener.clone()).unwrap();
    assert_eq!(
        platform.unregister_trace_listener(&listener),
        Err(PlatformError::UnknownListener("mock".to_string()))
    );
    platform.get_uncached_executor(&ExecutorConfig::new(0)).unwrap();
}

#[test]
fn test_mock_enumerator() {
    let mut enumerator = MockEnumerator::new();
    enumerator.expect_visible_device_count().returning(|| Ok(2));
    enumerator
        .expect_create_context()
        .withf(|config| config.ordinal == DeviceOrdinal(1))
        .times(1)
        .returning(|_| Ok(Box::new(FakeContext::new("mock-gpu"))));
    enumerator
        .expect_numa_node()
        .with(eq(DeviceOrdinal(0)))
        .returning(|_| Ok(3));
    enumerator
        .expect_numa_node()
        .with(eq(DeviceOrdinal(1)))
        .returning(|_| Err(anyhow::anyhow!("permission denied")));

    let platform = GpuPlatform::new(Arc::new(enumerator));

    let a = platform.executor_for_device(DeviceOrdinal(1)).unwrap();
    let b = platform.executor_for_device(DeviceOrdinal(1)).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.device_name(), "mock-gpu");

    assert_eq!(platform.bus_count().unwrap(), 1);
    assert_eq!(platform.topology().unwrap().excluded[0].reason, "permission denied");
}

#[test]
fn test_mock_enumerator_failure() {
    let mut enumerator = MockEnumerator::new();
    enumerator
        .expect_visible_device_count()
        .returning(|| Err(anyhow::anyhow!("no driver")));
    enumerator.expect_create_context().never();

    let platform = GpuPlatform::new(Arc::new(enumerator));

    assert_eq!(platform.visible_device_count(), -1);
    assert_eq!(
        platform.executor_for_device(DeviceOrdinal(0)).unwrap_err(),
        PlatformError::EnumerationFailure("no driver".to_string())
    );
}

#[test]
fn test_registry_lookup() {
    init_logging("debug");
    let registry = PlatformRegistry::new();
    let dispatcher = Arc::new(TraceDispatcher::new());
    let platform = GpuPlatform::builder(Arc::new(FakeEnumerator::with_devices(2)))
        .trace_sink(dispatcher.clone())
        .build();
    registry.register(Arc::new(platform)).unwrap();

    let platform = registry.platform_with_id(GPU_PLATFORM_ID).unwrap();
    let recorder = RecordingListener::new();
    platform.register_trace_listener(recorder.clone()).unwrap();
    assert_eq!(dispatcher.len(), 1);

    let a = platform.executor_for_device(DeviceOrdinal(1)).unwrap();
    let again = registry.platform_with_name("GPU").unwrap();
    let b = again.executor_for_device(DeviceOrdinal(1)).unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(recorder.events().len(), 1);
}
