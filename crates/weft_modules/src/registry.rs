//! Native module registry
//!
//! The registry is filled once while an instance is being built and is
//! read-only afterwards. Dispatch rules:
//!
//! - async and promise methods are marshaled on the caller, then run on the
//!   native-modules queue; the call returns immediately
//! - sync methods run inline when called from the native-modules queue, go
//!   through a blocking round trip from any other thread, and are refused on
//!   the UI queue
//!
//! Every dispatch failure (bad arguments, method errors, panics) reaches the
//! exception handler exactly once and is also returned to the caller when
//! the caller is still waiting.

use crate::args::Args;
use crate::callback::JsCallbackInvoker;
use crate::descriptor::{MethodDescriptor, MethodKind, ModuleDescriptor};
use crate::error::{ModuleError, ModuleResult};
use crate::module::{MemoryPressure, NativeModule};
use serde::Serialize;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use weft_core::Value;
use weft_queue::{panic_message, MessageQueueThread, QueueRole};

/// Receives every native module failure
pub trait ExceptionHandler: Send + Sync {
    fn handle_exception(&self, error: &ModuleError);
}

/// Exception handler that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingExceptionHandler;

impl ExceptionHandler for LoggingExceptionHandler {
    fn handle_exception(&self, error: &ModuleError) {
        log::error!("Unhandled native module exception: {}", error);
    }
}

/// Result of a successful `invoke`
#[derive(Debug, Clone, PartialEq)]
pub enum InvokeOutcome {
    /// The call was queued on the native-modules queue
    Scheduled,
    /// A sync method ran and returned this value
    Returned(Value),
}

/// Module table entry handed to the script runtime to build its proxies
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleConfig {
    pub name: String,
    pub constants: Value,
    pub methods: Vec<MethodDescriptor>,
}

struct ModuleEntry {
    module: Arc<dyn NativeModule>,
    descriptor: ModuleDescriptor,
}

/// Registry of native modules for one instance
pub struct ModuleRegistry {
    modules: Vec<ModuleEntry>,
    by_name: HashMap<String, usize>,
    native_modules_queue: Arc<MessageQueueThread>,
    invoker: Arc<dyn JsCallbackInvoker>,
    exception_handler: Arc<dyn ExceptionHandler>,
    initialized: AtomicBool,
    destroyed: AtomicBool,
}

impl ModuleRegistry {
    pub fn new(
        native_modules_queue: Arc<MessageQueueThread>,
        invoker: Arc<dyn JsCallbackInvoker>,
        exception_handler: Arc<dyn ExceptionHandler>,
    ) -> Self {
        Self {
            modules: Vec::new(),
            by_name: HashMap::new(),
            native_modules_queue,
            invoker,
            exception_handler,
            initialized: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Register a module. A duplicate name fails and leaves the registry unchanged.
    pub fn register_module(&mut self, module: Arc<dyn NativeModule>) -> ModuleResult<()> {
        let name = module.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(ModuleError::DuplicateModule(name));
        }

        let descriptor = ModuleDescriptor::new(name.clone(), module.methods());
        log::debug!(
            "Registered native module '{}' ({} methods)",
            name,
            descriptor.methods.len()
        );

        self.by_name.insert(name, self.modules.len());
        self.modules.push(ModuleEntry { module, descriptor });
        Ok(())
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn get_module(&self, name: &str) -> Option<Arc<dyn NativeModule>> {
        self.entry(name).map(|e| Arc::clone(&e.module))
    }

    /// Get a module downcast to its concrete type
    pub fn get_module_typed<T: NativeModule + 'static>(&self, name: &str) -> Option<&T> {
        self.entry(name)
            .and_then(|e| e.module.as_any().downcast_ref::<T>())
    }

    pub fn descriptor(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.entry(name).map(|e| &e.descriptor)
    }

    /// Module names in registration order
    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|e| e.descriptor.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Module table for the script runtime, in registration order
    pub fn describe(&self) -> Vec<ModuleConfig> {
        self.modules
            .iter()
            .map(|e| ModuleConfig {
                name: e.descriptor.name.clone(),
                constants: e.module.constants(),
                methods: e.descriptor.methods.clone(),
            })
            .collect()
    }

    pub fn exception_handler(&self) -> &Arc<dyn ExceptionHandler> {
        &self.exception_handler
    }

    /// Invoke method `method_index` of `module` with script arguments
    pub fn invoke(
        &self,
        module: &str,
        method_index: usize,
        args: Vec<Value>,
    ) -> ModuleResult<InvokeOutcome> {
        let result = self.try_invoke(module, method_index, args);
        if let Err(error) = &result {
            self.exception_handler.handle_exception(error);
        }
        result
    }

    fn try_invoke(
        &self,
        module: &str,
        method_index: usize,
        values: Vec<Value>,
    ) -> ModuleResult<InvokeOutcome> {
        let entry = self
            .entry(module)
            .ok_or_else(|| ModuleError::UnknownModule(module.to_string()))?;
        let method = entry.descriptor.method(method_index)?;
        let args = Args::marshal(&entry.descriptor.name, method, values, &self.invoker)?;

        let target = Arc::clone(&entry.module);
        let method_name = method.name.clone();

        if method.kind == MethodKind::Sync {
            return self
                .invoke_sync(target, method_index, method_name, args)
                .map(InvokeOutcome::Returned);
        }

        log::trace!("Scheduling {}.{}", module, method_name);
        let handler = Arc::clone(&self.exception_handler);
        self.native_modules_queue.run_on_queue(move || {
            if let Err(error) = dispatch(target.as_ref(), method_index, &method_name, args) {
                handler.handle_exception(&error);
            }
        })?;
        Ok(InvokeOutcome::Scheduled)
    }

    fn invoke_sync(
        &self,
        target: Arc<dyn NativeModule>,
        method_index: usize,
        method_name: String,
        args: Args,
    ) -> ModuleResult<Value> {
        if QueueRole::current() == Some(QueueRole::Ui) {
            return Err(ModuleError::WrongThread {
                module: target.name().to_string(),
                method: method_name,
            });
        }

        if self.native_modules_queue.is_on_thread() {
            dispatch(target.as_ref(), method_index, &method_name, args)
        } else {
            self.native_modules_queue.run_on_queue_sync(move || {
                dispatch(target.as_ref(), method_index, &method_name, args)
            })?
        }
    }

    /// Run `initialize` on every module, once, in registration order
    pub fn initialize_modules(&self) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }
        for entry in &self.modules {
            self.guarded_hook(entry, "initialize", |m| m.initialize());
        }
    }

    /// Notify every module that a batch of calls was dispatched
    pub fn notify_batch_complete(&self) {
        for entry in &self.modules {
            self.guarded_hook(entry, "onBatchComplete", |m| m.on_batch_complete());
        }
    }

    pub fn notify_host_resume(&self) {
        self.notify_lifecycle("onHostResume", |m| m.on_host_resume());
    }

    pub fn notify_host_pause(&self) {
        self.notify_lifecycle("onHostPause", |m| m.on_host_pause());
    }

    pub fn notify_host_destroy(&self) {
        self.notify_lifecycle("onHostDestroy", |m| m.on_host_destroy());
    }

    pub fn notify_memory_pressure(&self, level: MemoryPressure) {
        for entry in &self.modules {
            self.guarded_hook(entry, "onMemoryPressure", |m| m.on_memory_pressure(level));
        }
    }

    /// Tear every module down, once, in reverse registration order
    pub fn notify_instance_destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        for entry in self.modules.iter().rev() {
            self.guarded_hook(entry, "onInstanceDestroy", |m| m.on_instance_destroy());
        }
        log::debug!("Destroyed {} native module(s)", self.modules.len());
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn notify_lifecycle(&self, hook: &str, f: impl Fn(&dyn NativeModule)) {
        for entry in self.modules.iter().filter(|e| e.module.observes_lifecycle()) {
            self.guarded_hook(entry, hook, &f);
        }
    }

    fn guarded_hook(&self, entry: &ModuleEntry, hook: &str, f: impl Fn(&dyn NativeModule)) {
        let module = entry.module.as_ref();
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| f(module))) {
            let error = ModuleError::call_failed(
                &entry.descriptor.name,
                hook,
                panic_message(payload.as_ref()),
            );
            log::error!("{}", error);
            self.exception_handler.handle_exception(&error);
        }
    }

    fn entry(&self, name: &str) -> Option<&ModuleEntry> {
        self.by_name.get(name).map(|&i| &self.modules[i])
    }
}

/// Run one method, converting panics into `CallFailed` and rejecting a
/// promise the method left unsettled
fn dispatch(
    module: &dyn NativeModule,
    method_index: usize,
    method_name: &str,
    args: Args,
) -> ModuleResult<Value> {
    let promise = args.promise();

    let result = match panic::catch_unwind(AssertUnwindSafe(|| module.invoke(method_index, args))) {
        Ok(result) => result,
        Err(payload) => Err(ModuleError::call_failed(
            module.name(),
            method_name,
            panic_message(payload.as_ref()),
        )),
    };

    if let Err(error) = &result {
        log::error!("Native module call {}.{} failed: {}", module.name(), method_name, error);
        if let Some(promise) = promise.filter(|p| !p.is_settled()) {
            let _ = promise.reject_with_error(error);
        }
    }
    result
}
