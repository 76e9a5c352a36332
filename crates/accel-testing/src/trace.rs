use accel_platform::{TraceEvent, TraceListener, TraceSink};
use mockall::mock;
use std::sync::{Arc, Mutex};

mock! {
    pub Sink {}

    impl TraceSink for Sink {
        fn register(&self, listener: Arc<dyn TraceListener>) -> accel_core::Result<()>;
        fn unregister(&self, listener: &Arc<dyn TraceListener>) -> accel_core::Result<()>;
        fn deliver(&self, event: &TraceEvent);
    }
}

/// 记录收到的所有事件
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<TraceEvent>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl TraceListener for RecordingListener {
    fn on_event(&self, event: &TraceEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
