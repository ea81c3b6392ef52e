//! Recording doubles shared by the instance tests

#![allow(dead_code)]

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use weft_bridge::{
    Exception, Instance, InstanceConfig, InstanceExceptionHandler, JsCall, NativeCall,
    ScriptError, ScriptResult, ScriptRuntime,
};
use weft_core::{CallbackId, Value};
use weft_modules::{MemoryPressure, ModuleConfig};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// What the runtime was asked to do, in order
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptEvent {
    Modules(Vec<String>),
    Bundle(String),
    Batch(Vec<JsCall>),
    Callback(CallbackId, Vec<Value>),
    MemoryPressure(MemoryPressure),
    Teardown,
}

/// Test-side view of a [`RecordingRuntime`]
pub struct Script {
    log: Arc<Mutex<Vec<ScriptEvent>>>,
    replies: Arc<Mutex<HashMap<String, ScriptResult>>>,
    events: Receiver<ScriptEvent>,
}

impl Script {
    /// Make a bundle or a `Module.method` call answer with `result`
    pub fn reply(&self, key: &str, result: ScriptResult) {
        self.replies.lock().insert(key.to_string(), result);
    }

    pub fn log(&self) -> Vec<ScriptEvent> {
        self.log.lock().clone()
    }

    pub fn batches(&self) -> Vec<Vec<JsCall>> {
        self.log()
            .into_iter()
            .filter_map(|e| match e {
                ScriptEvent::Batch(calls) => Some(calls),
                _ => None,
            })
            .collect()
    }

    /// Every call handed to script, across batches
    pub fn calls(&self) -> Vec<JsCall> {
        self.batches().into_iter().flatten().collect()
    }

    pub fn count(&self, pred: impl Fn(&ScriptEvent) -> bool) -> usize {
        self.log.lock().iter().filter(|e| pred(e)).count()
    }

    /// Wait until the runtime records an event matching `pred`
    pub fn wait_for(&self, pred: impl Fn(&ScriptEvent) -> bool) -> bool {
        if self.log.lock().iter().any(&pred) {
            return true;
        }
        let deadline = Instant::now() + TIMEOUT;
        while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            match self.events.recv_timeout(remaining) {
                Ok(event) if pred(&event) => return true,
                Ok(_) => {}
                Err(_) => return false,
            }
        }
        false
    }
}

/// Script runtime double: records everything, answers from a reply table
pub struct RecordingRuntime {
    log: Arc<Mutex<Vec<ScriptEvent>>>,
    replies: Arc<Mutex<HashMap<String, ScriptResult>>>,
    events: Sender<ScriptEvent>,
}

impl RecordingRuntime {
    pub fn new() -> (Self, Script) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let replies = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = unbounded();
        (
            Self {
                log: Arc::clone(&log),
                replies: Arc::clone(&replies),
                events: tx,
            },
            Script {
                log,
                replies,
                events: rx,
            },
        )
    }

    fn record(&self, event: ScriptEvent) {
        self.log.lock().push(event.clone());
        let _ = self.events.send(event);
    }

    fn answer(&self, key: &str) -> ScriptResult {
        self.replies.lock().get(key).cloned().unwrap_or(Ok(Vec::new()))
    }
}

impl ScriptRuntime for RecordingRuntime {
    fn install_modules(&mut self, modules: &[ModuleConfig]) {
        self.record(ScriptEvent::Modules(modules.iter().map(|m| m.name.clone()).collect()));
    }

    fn load_bundle(&mut self, bundle: &str) -> ScriptResult {
        self.record(ScriptEvent::Bundle(bundle.to_string()));
        self.answer(bundle)
    }

    fn call_functions(&mut self, batch: &[JsCall]) -> ScriptResult {
        self.record(ScriptEvent::Batch(batch.to_vec()));
        let mut native: Vec<NativeCall> = Vec::new();
        for call in batch {
            native.extend(self.answer(&format!("{}.{}", call.module, call.method))?);
        }
        Ok(native)
    }

    fn invoke_callback(&mut self, callback_id: CallbackId, args: &[Value]) -> ScriptResult {
        self.record(ScriptEvent::Callback(callback_id, args.to_vec()));
        Ok(Vec::new())
    }

    fn handle_memory_pressure(&mut self, level: MemoryPressure) {
        self.record(ScriptEvent::MemoryPressure(level));
    }

    fn teardown(&mut self) {
        self.record(ScriptEvent::Teardown);
    }
}

/// Exception handler double
#[derive(Default)]
pub struct RecordingHandler {
    exceptions: Mutex<Vec<Exception>>,
}

impl RecordingHandler {
    pub fn exceptions(&self) -> Vec<Exception> {
        self.exceptions.lock().clone()
    }
}

impl InstanceExceptionHandler for RecordingHandler {
    fn handle_exception(&self, exception: &Exception) {
        self.exceptions.lock().push(exception.clone());
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Config stepping frames by hand
pub fn test_config() -> InstanceConfig {
    InstanceConfig {
        drive_frames: false,
        ..InstanceConfig::default()
    }
}

/// Let every queue drain and every script call finish
pub fn settle(instance: &Instance) {
    for _ in 0..3 {
        instance.queues().native_modules().run_on_queue_sync(|| ()).unwrap();
        instance.queues().script_runtime().run_on_queue_sync(|| ()).unwrap();
        instance.queues().ui().run_on_queue_sync(|| ()).unwrap();
        assert!(instance.wait_for_idle(TIMEOUT));
    }
}

/// Poll until `cond` holds
pub fn eventually(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

pub fn script_error(message: &str) -> ScriptError {
    ScriptError::new(message)
}
