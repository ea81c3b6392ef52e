//! Instance - the live bridge session
//!
//! ```text
//!  Uninitialized ──► Initializing ──► Running ──► Destroying ──► Destroyed
//!                         │                           ▲
//!                         └───────────────────────────┘ destroy()
//! ```
//!
//! The instance owns the three role queues, the module registry, the
//! script runtime and the Fabric binding. Calls into script are batched:
//! the first call of an empty batch schedules one flush on the script
//! queue and later calls join that batch until it runs.
//!
//! ## Key Invariants
//!
//! 1. **One-way states** - no transition ever goes back
//! 2. **No silent drops** - calls after `destroy()` began fail with
//!    [`BridgeError::InstanceDestroyed`]
//! 3. **Ordered teardown** - modules, native-modules queue, runtime context,
//!    script queue, UI queue
//! 4. **Contained failures** - module and script errors go to the
//!    exception handler; only mount failures destroy the instance

use crate::config::InstanceConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::fabric_binding::{FabricBinding, MountFailureHandler};
use crate::idle::{BridgeIdleListener, PendingCallCounter};
use crate::runtime::{JsCall, NativeCall, ScriptError, ScriptResult, ScriptRuntime};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use weft_core::{CallbackId, Value};
use weft_modules::{
    ExceptionHandler, InvokeOutcome, JsCallbackInvoker, JsFunctionCaller, MemoryPressure,
    ModuleError, ModuleRegistry, NativeModule, TimingModule,
};
use weft_mount::{MountError, ViewManager, ViewManagerRegistry};
use weft_queue::{
    FrameClock, FrameDriver, QueueConfiguration, QueueError, QueueExceptionHandler, QueueRole,
};

/// Lifecycle state of an [`Instance`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceState {
    Uninitialized,
    Initializing,
    Running,
    Destroying,
    Destroyed,
}

impl InstanceState {
    fn is_torn_down(self) -> bool {
        matches!(self, Self::Destroying | Self::Destroyed)
    }
}

/// Everything the instance reports to its exception handler
#[derive(Debug, Clone)]
pub enum Exception {
    /// A native module call or lifecycle hook failed
    Native(ModuleError),
    /// Script threw; the stack is forwarded as reported by the runtime
    Script(ScriptError),
    /// Mounting failed on the UI queue
    Mount { error: MountError, fatal: bool },
    /// A queue task panicked
    Queue(QueueError),
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native(e) => write!(f, "native module exception: {e}"),
            Self::Script(e) => write!(f, "script exception: {e}"),
            Self::Mount { error, fatal: true } => write!(f, "fatal mounting failure: {error}"),
            Self::Mount { error, .. } => write!(f, "mounting failure: {error}"),
            Self::Queue(e) => write!(f, "queue failure: {e}"),
        }
    }
}

/// Receives every exception of an instance
pub trait InstanceExceptionHandler: Send + Sync {
    fn handle_exception(&self, exception: &Exception);
}

/// Default handler: logs, with script stacks in dev mode
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInstanceExceptionHandler {
    dev_mode: bool,
}

impl LoggingInstanceExceptionHandler {
    pub fn new(dev_mode: bool) -> Self {
        Self { dev_mode }
    }
}

impl InstanceExceptionHandler for LoggingInstanceExceptionHandler {
    fn handle_exception(&self, exception: &Exception) {
        match exception {
            Exception::Script(error) if self.dev_mode && !error.stack.is_empty() => {
                let frames: Vec<String> =
                    error.stack.iter().map(|frame| format!("    at {frame}")).collect();
                log::error!("Uncaught {}\n{}", exception, frames.join("\n"));
            }
            Exception::Mount { fatal: false, .. } => log::warn!("{}", exception),
            _ => log::error!("{}", exception),
        }
    }
}

/// Routes registry failures to the instance handler
struct ModuleExceptionAdapter(Arc<dyn InstanceExceptionHandler>);

impl ExceptionHandler for ModuleExceptionAdapter {
    fn handle_exception(&self, error: &ModuleError) {
        self.0.handle_exception(&Exception::Native(error.clone()));
    }
}

/// What a module factory can hold on to
#[derive(Clone)]
pub struct ModuleContext {
    /// Calls into script modules
    pub js: Arc<dyn JsFunctionCaller>,
    /// Invokes script callbacks
    pub callbacks: Arc<dyn JsCallbackInvoker>,
    pub frame_clock: Arc<FrameClock>,
}

type ModuleFactory = Box<dyn FnOnce(&ModuleContext) -> Arc<dyn NativeModule>>;

/// Back-reference from modules, timers and views to the instance.
///
/// Holds the instance weakly so none of them keep it alive.
#[derive(Default)]
struct InstanceLink {
    inner: RwLock<Weak<InstanceInner>>,
}

impl InstanceLink {
    fn bind(&self, inner: &Arc<InstanceInner>) {
        *self.inner.write() = Arc::downgrade(inner);
    }

    fn instance(&self) -> Option<Instance> {
        self.inner.read().upgrade().map(|inner| Instance { inner })
    }
}

impl JsCallbackInvoker for InstanceLink {
    fn invoke_callback(&self, callback_id: CallbackId, args: Vec<Value>) {
        match self.instance() {
            Some(instance) => {
                if let Err(e) = instance.invoke_callback(callback_id, args) {
                    log::warn!("Dropping callback {}: {}", callback_id, e);
                }
            }
            None => log::debug!("Dropping callback {} of a released instance", callback_id),
        }
    }
}

impl JsFunctionCaller for InstanceLink {
    fn call_function(&self, module: &str, method: &str, args: Vec<Value>) {
        match self.instance() {
            Some(instance) => {
                if let Err(e) = instance.call_function(module, method, args) {
                    log::warn!("Dropping call {}.{}: {}", module, method, e);
                }
            }
            None => log::debug!("Dropping call {}.{} of a released instance", module, method),
        }
    }
}

/// Builder for [`Instance`]
pub struct InstanceBuilder {
    config: InstanceConfig,
    runtime: Option<Box<dyn ScriptRuntime>>,
    modules: Vec<ModuleFactory>,
    exception_handler: Option<Arc<dyn InstanceExceptionHandler>>,
    view_managers: Vec<ViewManager>,
    idle_listeners: Vec<Arc<dyn BridgeIdleListener>>,
}

impl InstanceBuilder {
    fn new() -> Self {
        Self {
            config: InstanceConfig::default(),
            runtime: None,
            modules: Vec::new(),
            exception_handler: None,
            view_managers: Vec::new(),
            idle_listeners: Vec::new(),
        }
    }

    pub fn config(mut self, config: InstanceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn runtime(mut self, runtime: impl ScriptRuntime + 'static) -> Self {
        self.runtime = Some(Box::new(runtime));
        self
    }

    pub fn module(mut self, module: Arc<dyn NativeModule>) -> Self {
        self.modules.push(Box::new(move |_: &ModuleContext| module));
        self
    }

    /// Add a module that needs to call back into script
    pub fn module_with<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(&ModuleContext) -> Arc<dyn NativeModule> + 'static,
    {
        self.modules.push(Box::new(factory));
        self
    }

    pub fn exception_handler(mut self, handler: Arc<dyn InstanceExceptionHandler>) -> Self {
        self.exception_handler = Some(handler);
        self
    }

    pub fn view_manager(mut self, manager: ViewManager) -> Self {
        self.view_managers.push(manager);
        self
    }

    pub fn idle_listener(mut self, listener: Arc<dyn BridgeIdleListener>) -> Self {
        self.idle_listeners.push(listener);
        self
    }

    /// Spawn the queues and register every module. The instance starts
    /// `Uninitialized`.
    pub fn build(self) -> BridgeResult<Instance> {
        let config = self.config;
        let runtime = self.runtime.ok_or(BridgeError::MissingRuntime)?;
        let handler = self
            .exception_handler
            .unwrap_or_else(|| Arc::new(LoggingInstanceExceptionHandler::new(config.dev_mode)));

        let queue_handler: QueueExceptionHandler = {
            let handler = Arc::clone(&handler);
            Arc::new(move |role: QueueRole, message: &str| {
                handler.handle_exception(&Exception::Queue(QueueError::TaskPanicked {
                    queue: role.to_string(),
                    message: message.to_string(),
                }));
            })
        };
        let queues = QueueConfiguration::create(&config.queues, queue_handler)?;

        let link = Arc::new(InstanceLink::default());
        let frame_clock = Arc::new(FrameClock::new(config.frame_interval_ms));
        let context = ModuleContext {
            js: link.clone(),
            callbacks: link.clone(),
            frame_clock: Arc::clone(&frame_clock),
        };

        let mut registry = ModuleRegistry::new(
            Arc::clone(queues.native_modules()),
            link.clone(),
            Arc::new(ModuleExceptionAdapter(Arc::clone(&handler))),
        );
        registry.register_module(Arc::new(TimingModule::new(
            Arc::clone(&frame_clock),
            link.clone(),
            config.idle_callback_threshold_ms,
        )))?;
        for factory in self.modules {
            registry.register_module(factory(&context))?;
        }

        let mut managers = ViewManagerRegistry::new();
        for manager in self.view_managers {
            managers.register(manager)?;
        }

        let on_failure: MountFailureHandler = {
            let link = Arc::clone(&link);
            Arc::new(move |error: MountError, fatal: bool| {
                if let Some(instance) = link.instance() {
                    instance.handle_mount_failure(error, fatal);
                }
            })
        };
        let fabric = FabricBinding::new(
            Arc::clone(queues.ui()),
            Arc::clone(queues.script_runtime()),
            managers,
            config.mounting.clone(),
            link.clone(),
            on_failure,
        );

        let pending = PendingCallCounter::new();
        for listener in self.idle_listeners {
            pending.add_listener(listener);
        }

        log::info!("Instance created with {} native module(s)", registry.len());

        let inner = Arc::new(InstanceInner {
            config,
            state: Mutex::new(InstanceState::Uninitialized),
            queues,
            registry: Arc::new(registry),
            runtime: Mutex::new(runtime),
            batch: Mutex::new(Vec::new()),
            parked: Mutex::new(Vec::new()),
            pending,
            frame_clock,
            frame_driver: Mutex::new(None),
            fabric,
            handler,
        });
        link.bind(&inner);

        Ok(Instance { inner })
    }
}

struct InstanceInner {
    config: InstanceConfig,
    state: Mutex<InstanceState>,
    queues: QueueConfiguration,
    registry: Arc<ModuleRegistry>,
    /// Only locked on the script-runtime queue
    runtime: Mutex<Box<dyn ScriptRuntime>>,
    /// Calls waiting for the scheduled flush
    batch: Mutex<Vec<JsCall>>,
    /// Calls made before the instance was running
    parked: Mutex<Vec<JsCall>>,
    pending: PendingCallCounter,
    frame_clock: Arc<FrameClock>,
    frame_driver: Mutex<Option<FrameDriver>>,
    fabric: FabricBinding,
    handler: Arc<dyn InstanceExceptionHandler>,
}

impl Drop for InstanceInner {
    fn drop(&mut self) {
        if *self.state.get_mut() != InstanceState::Destroyed {
            log::warn!("Instance released without destroy()");
            self.registry.notify_instance_destroy();
        }
    }
}

/// Handle to a live bridge session. Clones share the session.
#[derive(Clone)]
pub struct Instance {
    inner: Arc<InstanceInner>,
}

impl Instance {
    pub fn builder() -> InstanceBuilder {
        InstanceBuilder::new()
    }

    fn upgrade(weak: &Weak<InstanceInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn state(&self) -> InstanceState {
        *self.inner.state.lock()
    }

    pub fn config(&self) -> &InstanceConfig {
        &self.inner.config
    }

    pub fn queues(&self) -> &QueueConfiguration {
        &self.inner.queues
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.inner.registry
    }

    /// A registered module, downcast to its concrete type
    pub fn module<T: NativeModule + 'static>(&self, name: &str) -> Option<&T> {
        self.inner.registry.get_module_typed::<T>(name)
    }

    pub fn fabric(&self) -> &FabricBinding {
        &self.inner.fabric
    }

    pub fn frame_clock(&self) -> &Arc<FrameClock> {
        &self.inner.frame_clock
    }

    /// Initialize modules, run the bundle and start accepting calls.
    ///
    /// Calls made before this are flushed, in order, once running. If the
    /// bundle throws, the error is reported and returned and the instance
    /// stays `Initializing` until destroyed.
    pub fn initialize(&self, bundle: &str) -> BridgeResult<()> {
        self.transition(|state| match state {
            InstanceState::Uninitialized => Ok(InstanceState::Initializing),
            s if s.is_torn_down() => Err(BridgeError::InstanceDestroyed),
            _ => Err(BridgeError::AlreadyInitialized),
        })?;

        let registry = Arc::clone(&self.inner.registry);
        self.inner
            .queues
            .native_modules()
            .run_on_queue_sync(move || registry.initialize_modules())?;

        let weak = Arc::downgrade(&self.inner);
        let bundle = bundle.to_string();
        let loaded = self.inner.queues.script_runtime().run_on_queue_sync(move || {
            let Some(instance) = Instance::upgrade(&weak) else {
                return Ok(());
            };
            let modules = instance.inner.registry.describe();
            let result = {
                let mut runtime = instance.inner.runtime.lock();
                runtime.install_modules(&modules);
                runtime.load_bundle(&bundle)
            };
            result.map(|calls| instance.dispatch_native_calls(calls))
        })?;

        if let Err(error) = loaded {
            self.report(Exception::Script(error.clone()));
            return Err(error.into());
        }

        {
            let mut state = self.inner.state.lock();
            if *state != InstanceState::Initializing {
                return Err(BridgeError::InstanceDestroyed);
            }
            *state = InstanceState::Running;

            let parked = std::mem::take(&mut *self.inner.parked.lock());
            if !parked.is_empty() {
                log::debug!("Flushing {} call(s) made before initialization", parked.len());
                let schedule = {
                    let mut batch = self.inner.batch.lock();
                    let was_empty = batch.is_empty();
                    batch.extend(parked);
                    was_empty
                };
                if schedule {
                    self.schedule_flush()?;
                }
            }
        }
        log::info!("Instance running");

        if self.inner.config.drive_frames {
            let interval = Duration::from_secs_f64(self.inner.config.frame_interval_ms / 1000.0);
            let driver = FrameDriver::start(
                Arc::clone(&self.inner.frame_clock),
                Arc::clone(self.inner.queues.ui()),
                interval,
            )?;
            *self.inner.frame_driver.lock() = Some(driver);
        }
        Ok(())
    }

    /// Call `module.method(args)` in script, batched with other calls
    pub fn call_function(&self, module: &str, method: &str, args: Vec<Value>) -> BridgeResult<()> {
        if self.state().is_torn_down() {
            return Err(BridgeError::InstanceDestroyed);
        }

        let call = JsCall::new(module, method, args);
        self.inner.pending.increment();

        let schedule = {
            let state = self.inner.state.lock();
            match *state {
                s if s.is_torn_down() => None,
                InstanceState::Uninitialized | InstanceState::Initializing => {
                    self.inner.parked.lock().push(call);
                    Some(false)
                }
                _ => {
                    let mut batch = self.inner.batch.lock();
                    batch.push(call);
                    Some(batch.len() == 1)
                }
            }
        };

        match schedule {
            None => {
                self.inner.pending.decrement_by(1);
                Err(BridgeError::InstanceDestroyed)
            }
            Some(true) => self.schedule_flush(),
            Some(false) => Ok(()),
        }
    }

    /// Invoke a script callback handed to native earlier
    pub fn invoke_callback(&self, callback_id: CallbackId, args: Vec<Value>) -> BridgeResult<()> {
        match self.state() {
            s if s.is_torn_down() => return Err(BridgeError::InstanceDestroyed),
            InstanceState::Uninitialized => return Err(BridgeError::NotInitialized),
            _ => {}
        }

        self.inner.pending.increment();
        let weak = Arc::downgrade(&self.inner);
        let scheduled = self.inner.queues.script_runtime().run_on_queue(move || {
            let Some(instance) = Instance::upgrade(&weak) else {
                return;
            };
            let result = instance.inner.runtime.lock().invoke_callback(callback_id, &args);
            instance.handle_script_result(result);
            instance.inner.pending.decrement_by(1);
        });

        if let Err(e) = scheduled {
            self.inner.pending.decrement_by(1);
            return Err(e.into());
        }
        Ok(())
    }

    /// Invoke a native module method directly, as script does for sync methods
    pub fn invoke_native(
        &self,
        module: &str,
        method_index: usize,
        args: Vec<Value>,
    ) -> BridgeResult<InvokeOutcome> {
        match self.state() {
            s if s.is_torn_down() => Err(BridgeError::InstanceDestroyed),
            InstanceState::Uninitialized => Err(BridgeError::NotInitialized),
            _ => Ok(self.inner.registry.invoke(module, method_index, args)?),
        }
    }

    /// Native module table as JSON, for runtimes that build their proxies from text
    pub fn module_config_json(&self) -> BridgeResult<String> {
        Ok(serde_json::to_string(&self.inner.registry.describe())?)
    }

    pub fn is_bridge_idle(&self) -> bool {
        self.inner.pending.is_idle()
    }

    /// Block until no script call is outstanding. Returns whether idle.
    pub fn wait_for_idle(&self, timeout: Duration) -> bool {
        self.inner.pending.wait_for_idle(timeout)
    }

    pub fn pending_calls(&self) -> usize {
        self.inner.pending.pending()
    }

    pub fn add_idle_listener(&self, listener: Arc<dyn BridgeIdleListener>) {
        self.inner.pending.add_listener(listener);
    }

    pub fn on_host_resume(&self) -> BridgeResult<()> {
        self.post_lifecycle(|registry| registry.notify_host_resume())
    }

    pub fn on_host_pause(&self) -> BridgeResult<()> {
        self.post_lifecycle(|registry| registry.notify_host_pause())
    }

    pub fn on_host_destroy(&self) -> BridgeResult<()> {
        self.post_lifecycle(|registry| registry.notify_host_destroy())
    }

    /// Forward memory pressure to every module and to the runtime
    pub fn handle_memory_pressure(&self, level: MemoryPressure) -> BridgeResult<()> {
        self.ensure_alive()?;
        log::debug!("Memory pressure: {:?}", level);

        let registry = Arc::clone(&self.inner.registry);
        self.inner
            .queues
            .native_modules()
            .run_on_queue(move || registry.notify_memory_pressure(level))?;

        let weak = Arc::downgrade(&self.inner);
        self.inner.queues.script_runtime().run_on_queue(move || {
            if let Some(instance) = Instance::upgrade(&weak) {
                instance.inner.runtime.lock().handle_memory_pressure(level);
            }
        })?;
        Ok(())
    }

    /// Re-run a bundle on the script queue. Dev mode only.
    pub fn reload_bundle(&self, bundle: &str) -> BridgeResult<()> {
        if !self.inner.config.dev_mode {
            return Err(BridgeError::DevModeRequired("reload_bundle"));
        }
        match self.state() {
            InstanceState::Running => {}
            s if s.is_torn_down() => return Err(BridgeError::InstanceDestroyed),
            _ => return Err(BridgeError::NotInitialized),
        }
        log::info!("Reloading bundle");

        let weak = Arc::downgrade(&self.inner);
        let bundle = bundle.to_string();
        self.inner.queues.script_runtime().run_on_queue(move || {
            if let Some(instance) = Instance::upgrade(&weak) {
                let result = instance.inner.runtime.lock().load_bundle(&bundle);
                instance.handle_script_result(result);
            }
        })?;
        Ok(())
    }

    /// Tear the instance down. Safe to call repeatedly and concurrently;
    /// only the first call does any work.
    ///
    /// Refused on the script-runtime and native-modules queues, which this
    /// joins.
    pub fn destroy(&self) -> BridgeResult<()> {
        if let Some(role @ (QueueRole::ScriptRuntime | QueueRole::NativeModules)) =
            QueueRole::current()
        {
            return Err(BridgeError::DestroyOnQueue(role));
        }

        {
            let mut state = self.inner.state.lock();
            if state.is_torn_down() {
                log::debug!("Instance already {:?}", *state);
                return Ok(());
            }
            *state = InstanceState::Destroying;
        }
        log::info!("Instance destroying");

        if let Some(driver) = self.inner.frame_driver.lock().take() {
            driver.stop();
        }
        self.inner.fabric.stop_all_surfaces();

        let native = self.inner.queues.native_modules();
        let registry = Arc::clone(&self.inner.registry);
        if let Err(e) = native.run_on_queue_sync(move || registry.notify_instance_destroy()) {
            log::warn!("Destroying native modules inline: {}", e);
            self.inner.registry.notify_instance_destroy();
        }
        native.quit_synchronous();

        let script = self.inner.queues.script_runtime();
        let weak = Arc::downgrade(&self.inner);
        let torn_down = script.run_on_queue_sync(move || {
            if let Some(inner) = weak.upgrade() {
                inner.runtime.lock().teardown();
            }
        });
        if let Err(e) = torn_down {
            log::warn!("Script runtime teardown failed: {}", e);
        }
        script.quit_synchronous();

        self.inner.queues.ui().quit_synchronous();
        self.inner.pending.notify_destroyed();

        *self.inner.state.lock() = InstanceState::Destroyed;
        log::info!("Instance destroyed");
        Ok(())
    }

    fn transition(
        &self,
        next: impl FnOnce(InstanceState) -> BridgeResult<InstanceState>,
    ) -> BridgeResult<()> {
        let mut state = self.inner.state.lock();
        let to = next(*state)?;
        log::info!("Instance {:?} -> {:?}", *state, to);
        *state = to;
        Ok(())
    }

    fn ensure_alive(&self) -> BridgeResult<()> {
        if self.state().is_torn_down() {
            return Err(BridgeError::InstanceDestroyed);
        }
        Ok(())
    }

    fn post_lifecycle(&self, f: impl FnOnce(&ModuleRegistry) + Send + 'static) -> BridgeResult<()> {
        self.ensure_alive()?;
        let registry = Arc::clone(&self.inner.registry);
        self.inner.queues.ui().run_on_queue(move || f(&registry))?;
        Ok(())
    }

    fn schedule_flush(&self) -> BridgeResult<()> {
        let weak = Arc::downgrade(&self.inner);
        let scheduled = self.inner.queues.script_runtime().run_on_queue(move || {
            if let Some(instance) = Instance::upgrade(&weak) {
                instance.flush_batch();
            }
        });

        if let Err(e) = scheduled {
            let dropped = std::mem::take(&mut *self.inner.batch.lock());
            self.inner.pending.decrement_by(dropped.len());
            return Err(e.into());
        }
        Ok(())
    }

    /// Hand the current batch to the runtime. Runs on the script queue.
    fn flush_batch(&self) {
        let calls = std::mem::take(&mut *self.inner.batch.lock());
        if calls.is_empty() {
            return;
        }

        let chunk_size = match self.inner.config.max_batch_size {
            0 => calls.len(),
            n => n,
        };
        log::trace!("Flushing {} call(s) to script", calls.len());

        for chunk in calls.chunks(chunk_size) {
            let result = self.inner.runtime.lock().call_functions(chunk);
            self.handle_script_result(result);
        }
        self.inner.pending.decrement_by(calls.len());
    }

    fn handle_script_result(&self, result: ScriptResult) {
        match result {
            Ok(calls) => self.dispatch_native_calls(calls),
            Err(error) => self.report(Exception::Script(error)),
        }
    }

    /// Dispatch the native calls script made during one entry
    fn dispatch_native_calls(&self, calls: Vec<NativeCall>) {
        if calls.is_empty() {
            return;
        }
        if self.state().is_torn_down() {
            log::warn!(
                "Dropping {} native call(s): {}",
                calls.len(),
                BridgeError::InstanceDestroyed
            );
            return;
        }

        for call in calls {
            // The registry has already reported any failure
            if let Err(e) = self.inner.registry.invoke(&call.module, call.method_index, call.args) {
                log::debug!("Native call {}#{} failed: {}", call.module, call.method_index, e);
            }
        }

        let registry = Arc::clone(&self.inner.registry);
        if let Err(e) = self
            .inner
            .queues
            .native_modules()
            .run_on_queue(move || registry.notify_batch_complete())
        {
            log::debug!("Skipping batch completion: {}", e);
        }
    }

    fn handle_mount_failure(&self, error: MountError, fatal: bool) {
        // Teardown of an already broken hierarchy fails again; report once
        if self.state().is_torn_down() {
            log::warn!("Ignoring mount failure during teardown: {}", error);
            return;
        }
        self.report(Exception::Mount { error, fatal });
        if fatal {
            log::error!("View hierarchy is inconsistent, destroying instance");
            if let Err(e) = self.destroy() {
                log::error!("Failed to destroy instance: {}", e);
            }
        }
    }

    fn report(&self, exception: Exception) {
        self.inner.handler.handle_exception(&exception);
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("state", &self.state())
            .field("modules", &self.inner.registry.len())
            .field("pending_calls", &self.pending_calls())
            .finish()
    }
}
