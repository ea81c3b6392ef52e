//! Integration tests for the instance lifecycle, call batching and idle
//! tracking

mod common;

use common::*;
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use weft_bridge::{
    BridgeError, BridgeIdleListener, Exception, Instance, InstanceConfig, InstanceState, JsCall,
    NativeCall, StackFrame,
};
use weft_core::{CallbackId, Value};
use weft_modules::{
    ArgKind, JsFunctionCaller, MemoryPressure, ModuleBuilder, ModuleError, NativeModule,
    TimingModule,
};

#[derive(Default)]
struct Counters {
    destroyed: AtomicUsize,
    paused: AtomicUsize,
    pressure: AtomicUsize,
}

fn counting_module(counters: &Arc<Counters>) -> Arc<dyn NativeModule> {
    let destroyed = Arc::clone(counters);
    let paused = Arc::clone(counters);
    let pressure = Arc::clone(counters);
    Arc::new(
        ModuleBuilder::new("Counter")
            .on_instance_destroy(move || {
                destroyed.destroyed.fetch_add(1, Ordering::SeqCst);
            })
            .on_host_pause(move || {
                paused.paused.fetch_add(1, Ordering::SeqCst);
            })
            .on_memory_pressure(move |_| {
                pressure.pressure.fetch_add(1, Ordering::SeqCst);
            })
            .build(),
    )
}

fn echo_module() -> Arc<dyn NativeModule> {
    let module = ModuleBuilder::new("Echo")
        .method("echo", vec![ArgKind::String, ArgKind::Callback], |args| {
            let text = args.string(0)?.to_string();
            args.callback(1)?.invoke(vec![Value::from(text)])?;
            Ok(Value::Null)
        })
        .unwrap()
        .method("fail", vec![], |_| Err(ModuleError::call_failed("Echo", "fail", "boom")))
        .unwrap()
        .build();
    Arc::new(module)
}

struct Setup {
    instance: Instance,
    script: Script,
    handler: Arc<RecordingHandler>,
    counters: Arc<Counters>,
}

fn setup_with(config: InstanceConfig) -> Setup {
    init_logging();
    let (runtime, script) = RecordingRuntime::new();
    let handler = Arc::new(RecordingHandler::default());
    let counters = Arc::new(Counters::default());

    let instance = Instance::builder()
        .config(config)
        .runtime(runtime)
        .exception_handler(handler.clone())
        .module(echo_module())
        .module(counting_module(&counters))
        .build()
        .unwrap();

    Setup {
        instance,
        script,
        handler,
        counters,
    }
}

fn setup() -> Setup {
    setup_with(test_config())
}

fn running() -> Setup {
    let s = setup();
    s.instance.initialize("main.bundle").unwrap();
    s
}

fn call(module: &str, method: &str) -> JsCall {
    JsCall::new(module, method, vec![])
}

#[test]
fn test_initialize_runs_bundle_with_module_table() {
    let s = running();
    assert_eq!(s.instance.state(), InstanceState::Running);
    assert_eq!(
        s.script.log()[..2],
        [
            ScriptEvent::Modules(vec![
                TimingModule::NAME.to_string(),
                "Echo".to_string(),
                "Counter".to_string()
            ]),
            ScriptEvent::Bundle("main.bundle".to_string()),
        ]
    );
    assert!(matches!(
        s.instance.initialize("again"),
        Err(BridgeError::AlreadyInitialized)
    ));
    s.instance.destroy().unwrap();
}

#[test]
fn test_destroy_twice_tears_down_once() {
    let s = running();
    let destroyed_listener = Arc::new(IdleTransitions::default());
    s.instance.add_idle_listener(destroyed_listener.clone());

    s.instance.destroy().unwrap();
    s.instance.destroy().unwrap();

    assert_eq!(s.instance.state(), InstanceState::Destroyed);
    assert_eq!(s.counters.destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(s.script.count(|e| *e == ScriptEvent::Teardown), 1);
    assert_eq!(destroyed_listener.destroyed.load(Ordering::SeqCst), 1);
    assert!(!s.instance.queues().script_runtime().is_running());
    assert!(!s.instance.queues().native_modules().is_running());
    assert!(!s.instance.queues().ui().is_running());
}

#[test]
fn test_concurrent_destroy() {
    let s = running();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let instance = s.instance.clone();
            std::thread::spawn(move || instance.destroy())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert!(eventually(|| s.instance.state() == InstanceState::Destroyed));
    assert_eq!(s.counters.destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(s.script.count(|e| *e == ScriptEvent::Teardown), 1);
}

#[test]
fn test_calls_after_destroy_fail() {
    let s = running();
    s.instance.destroy().unwrap();

    assert!(matches!(
        s.instance.call_function("App", "run", vec![]),
        Err(BridgeError::InstanceDestroyed)
    ));
    assert!(matches!(
        s.instance.invoke_native("Echo", 1, vec![]),
        Err(BridgeError::InstanceDestroyed)
    ));
    assert!(matches!(
        s.instance.invoke_callback(CallbackId::new(1), vec![]),
        Err(BridgeError::InstanceDestroyed)
    ));
    assert!(matches!(s.instance.on_host_resume(), Err(BridgeError::InstanceDestroyed)));
    assert!(matches!(
        s.instance.initialize("late"),
        Err(BridgeError::InstanceDestroyed)
    ));
}

#[test]
fn test_destroy_is_refused_on_script_queue() {
    let s = running();
    let instance = s.instance.clone();
    let result = s
        .instance
        .queues()
        .script_runtime()
        .run_on_queue_sync(move || instance.destroy())
        .unwrap();

    assert!(matches!(result, Err(BridgeError::DestroyOnQueue(_))));
    assert_eq!(s.instance.state(), InstanceState::Running);
    s.instance.destroy().unwrap();
}

#[test]
fn test_calls_before_initialize_flush_in_order() {
    let s = setup();
    s.instance.call_function("App", "first", vec![]).unwrap();
    s.instance.call_function("App", "second", vec![]).unwrap();
    assert!(s.script.calls().is_empty());
    assert!(!s.instance.is_bridge_idle());

    s.instance.initialize("main.bundle").unwrap();
    s.instance.call_function("App", "third", vec![]).unwrap();
    settle(&s.instance);

    assert_eq!(
        s.script.calls(),
        vec![call("App", "first"), call("App", "second"), call("App", "third")]
    );
    s.instance.destroy().unwrap();
}

#[test]
fn test_calls_in_one_turn_form_one_batch() {
    let s = running();
    let (open, gate) = bounded::<()>(0);
    s.instance
        .queues()
        .script_runtime()
        .run_on_queue(move || {
            let _ = gate.recv();
        })
        .unwrap();

    for method in ["a", "b", "c"] {
        s.instance.call_function("App", method, vec![]).unwrap();
    }
    open.send(()).unwrap();
    assert!(s.instance.wait_for_idle(TIMEOUT));

    assert_eq!(
        s.script.batches(),
        vec![vec![call("App", "a"), call("App", "b"), call("App", "c")]]
    );
    s.instance.destroy().unwrap();
}

#[test]
fn test_max_batch_size_splits_batches() {
    let s = setup_with(InstanceConfig {
        max_batch_size: 2,
        ..test_config()
    });
    s.instance.initialize("main.bundle").unwrap();

    let (open, gate) = bounded::<()>(0);
    s.instance
        .queues()
        .script_runtime()
        .run_on_queue(move || {
            let _ = gate.recv();
        })
        .unwrap();
    for i in 0..5 {
        s.instance.call_function("App", &format!("m{i}"), vec![]).unwrap();
    }
    open.send(()).unwrap();
    assert!(s.instance.wait_for_idle(TIMEOUT));

    let sizes: Vec<usize> = s.script.batches().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    s.instance.destroy().unwrap();
}

#[test]
fn test_script_native_calls_reach_modules_and_callbacks_return() {
    let s = running();
    s.script.reply(
        "App.greet",
        Ok(vec![NativeCall::new("Echo", 0, vec![Value::from("hi"), Value::from(7)])]),
    );

    s.instance.call_function("App", "greet", vec![]).unwrap();
    assert!(s.script.wait_for(|e| matches!(e, ScriptEvent::Callback(..))));

    assert!(s.script.log().contains(&ScriptEvent::Callback(
        CallbackId::new(7),
        vec![Value::from("hi")]
    )));
    assert!(s.handler.exceptions().is_empty());
    s.instance.destroy().unwrap();
}

#[test]
fn test_module_failure_is_reported_not_propagated() {
    let s = running();
    s.script.reply("App.break", Ok(vec![NativeCall::new("Echo", 1, vec![])]));

    s.instance.call_function("App", "break", vec![]).unwrap();
    s.instance.call_function("App", "after", vec![]).unwrap();
    settle(&s.instance);

    let exceptions = s.handler.exceptions();
    assert_eq!(exceptions.len(), 1);
    assert!(matches!(
        &exceptions[0],
        Exception::Native(ModuleError::CallFailed { message, .. }) if message == "boom"
    ));
    assert_eq!(s.instance.state(), InstanceState::Running);
    assert_eq!(s.script.calls().len(), 2);
    s.instance.destroy().unwrap();
}

#[test]
fn test_unknown_native_method_is_reported() {
    let s = running();
    let result = s.instance.invoke_native("Echo", 9, vec![]);
    assert!(matches!(
        result,
        Err(BridgeError::Module(ModuleError::UnknownMethod { .. }))
    ));
    assert!(matches!(
        s.handler.exceptions().as_slice(),
        [Exception::Native(ModuleError::UnknownMethod { .. })]
    ));
    s.instance.destroy().unwrap();
}

#[test]
fn test_script_exception_forwarded_with_stack() {
    let s = running();
    let frame = StackFrame {
        file: "main.bundle".to_string(),
        method: "render".to_string(),
        line: 12,
        column: 4,
    };
    s.script
        .reply("App.crash", Err(script_error("undefined is not a function").with_frame(frame.clone())));

    s.instance.call_function("App", "crash", vec![]).unwrap();
    settle(&s.instance);

    match s.handler.exceptions().as_slice() {
        [Exception::Script(error)] => {
            assert_eq!(error.message, "undefined is not a function");
            assert_eq!(error.stack, vec![frame]);
        }
        other => panic!("unexpected exceptions: {other:?}"),
    }
    assert!(s.instance.is_bridge_idle());
    s.instance.destroy().unwrap();
}

#[test]
fn test_bundle_failure_is_returned_and_reported() {
    let s = setup();
    s.script.reply("broken.bundle", Err(script_error("SyntaxError")));

    let result = s.instance.initialize("broken.bundle");
    assert!(matches!(result, Err(BridgeError::Script(_))));
    assert_eq!(s.instance.state(), InstanceState::Initializing);
    assert_eq!(s.handler.exceptions().len(), 1);
    s.instance.destroy().unwrap();
    assert_eq!(s.instance.state(), InstanceState::Destroyed);
}

#[test]
fn test_recurring_timer_fires_once_per_frame_until_deleted() {
    let s = setup();
    s.script.reply(
        "main.bundle",
        Ok(vec![NativeCall::new(
            TimingModule::NAME,
            0,
            vec![Value::from(42), Value::from(16.0), Value::from(0.0), Value::from(true)],
        )]),
    );
    s.instance.initialize("main.bundle").unwrap();
    settle(&s.instance);

    let timing = s.instance.module::<TimingModule>(TimingModule::NAME).unwrap();
    assert_eq!(timing.timer_count(), 1);

    let clock = s.instance.frame_clock();
    for frame in 1..=3 {
        clock.do_frame(frame as f64 * 16.0);
        settle(&s.instance);
    }
    let timer_calls = |s: &Setup| {
        s.script
            .calls()
            .into_iter()
            .filter(|c| c.module == "JSTimers" && c.method == "callTimers")
            .count()
    };
    assert_eq!(timer_calls(&s), 3);
    assert_eq!(
        s.script.calls()[0].args,
        vec![Value::Array(vec![Value::from(42)])]
    );

    s.instance
        .invoke_native(TimingModule::NAME, 1, vec![Value::from(42)])
        .unwrap();
    settle(&s.instance);
    clock.do_frame(64.0);
    clock.do_frame(80.0);
    settle(&s.instance);

    assert_eq!(timer_calls(&s), 3);
    s.instance.destroy().unwrap();
}

#[derive(Default)]
struct IdleTransitions {
    busy: AtomicUsize,
    idle: AtomicUsize,
    destroyed: AtomicUsize,
}

impl BridgeIdleListener for IdleTransitions {
    fn on_transition_to_bridge_idle(&self) {
        self.idle.fetch_add(1, Ordering::SeqCst);
    }
    fn on_transition_to_bridge_busy(&self) {
        self.busy.fetch_add(1, Ordering::SeqCst);
    }
    fn on_bridge_destroyed(&self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_idle_transitions_around_a_batch() {
    let s = running();
    let transitions = Arc::new(IdleTransitions::default());
    s.instance.add_idle_listener(transitions.clone());
    assert!(s.instance.is_bridge_idle());

    let (open, gate) = bounded::<()>(0);
    s.instance
        .queues()
        .script_runtime()
        .run_on_queue(move || {
            let _ = gate.recv();
        })
        .unwrap();
    s.instance.call_function("App", "one", vec![]).unwrap();
    s.instance.call_function("App", "two", vec![]).unwrap();
    assert_eq!(s.instance.pending_calls(), 2);
    assert!(!s.instance.wait_for_idle(std::time::Duration::from_millis(20)));

    open.send(()).unwrap();
    assert!(s.instance.wait_for_idle(TIMEOUT));
    assert_eq!(transitions.busy.load(Ordering::SeqCst), 1);
    assert_eq!(transitions.idle.load(Ordering::SeqCst), 1);
    s.instance.destroy().unwrap();
}

#[test]
fn test_host_lifecycle_and_memory_pressure_forwarding() {
    let s = running();
    s.instance.on_host_pause().unwrap();
    s.instance.handle_memory_pressure(MemoryPressure::Moderate).unwrap();
    settle(&s.instance);

    assert_eq!(s.counters.paused.load(Ordering::SeqCst), 1);
    assert_eq!(s.counters.pressure.load(Ordering::SeqCst), 1);
    assert!(s
        .script
        .log()
        .contains(&ScriptEvent::MemoryPressure(MemoryPressure::Moderate)));

    let timing = s.instance.module::<TimingModule>(TimingModule::NAME).unwrap();
    assert!(timing.is_paused());
    s.instance.on_host_resume().unwrap();
    settle(&s.instance);
    assert!(!timing.is_paused());
    s.instance.destroy().unwrap();
}

#[test]
fn test_reload_bundle_requires_dev_mode() {
    let s = running();
    assert!(matches!(
        s.instance.reload_bundle("main.bundle"),
        Err(BridgeError::DevModeRequired(_))
    ));
    s.instance.destroy().unwrap();

    let dev = setup_with(InstanceConfig {
        dev_mode: true,
        ..test_config()
    });
    assert!(matches!(
        dev.instance.reload_bundle("main.bundle"),
        Err(BridgeError::NotInitialized)
    ));
    dev.instance.initialize("main.bundle").unwrap();
    dev.instance.reload_bundle("main.bundle").unwrap();
    settle(&dev.instance);

    let loads = dev
        .script
        .count(|e| *e == ScriptEvent::Bundle("main.bundle".to_string()));
    assert_eq!(loads, 2);
    dev.instance.destroy().unwrap();
}

#[test]
fn test_build_rejects_duplicate_modules_and_missing_runtime() {
    init_logging();
    let (runtime, _script) = RecordingRuntime::new();
    let result = Instance::builder()
        .config(test_config())
        .runtime(runtime)
        .module(echo_module())
        .module(echo_module())
        .build();
    assert!(matches!(
        result,
        Err(BridgeError::Module(ModuleError::DuplicateModule(name))) if name == "Echo"
    ));

    let result = Instance::builder().config(test_config()).build();
    assert!(matches!(result, Err(BridgeError::MissingRuntime)));
}

#[test]
fn test_module_config_json_lists_modules() {
    let s = running();
    let json: serde_json::Value =
        serde_json::from_str(&s.instance.module_config_json().unwrap()).unwrap();
    let names: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Timing", "Echo", "Counter"]);
    s.instance.destroy().unwrap();
}

#[test]
fn test_module_factory_can_call_script() {
    init_logging();
    let (runtime, script) = RecordingRuntime::new();
    let instance = Instance::builder()
        .config(test_config())
        .runtime(runtime)
        .module_with(|ctx| {
            let js = Arc::clone(&ctx.js);
            let module = ModuleBuilder::new("Notifier")
                .method("ping", vec![], move |_| {
                    js.call_function("App", "pong", vec![]);
                    Ok(Value::Null)
                })
                .unwrap()
                .build();
            Arc::new(module)
        })
        .build()
        .unwrap();
    instance.initialize("main.bundle").unwrap();

    instance.invoke_native("Notifier", 0, vec![]).unwrap();
    assert!(script.wait_for(|e| matches!(e, ScriptEvent::Batch(calls) if calls.iter().any(|c| c.method == "pong"))));
    instance.destroy().unwrap();
}
