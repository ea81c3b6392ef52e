//! Native module trait and closure-table builder

use crate::args::Args;
use crate::descriptor::{ArgKind, MethodDescriptor};
use crate::error::{ModuleError, ModuleResult};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use weft_core::Value;

/// Memory pressure levels forwarded from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryPressure {
    /// The UI went to the background
    UiHidden,
    Moderate,
    Critical,
}

/// A natively implemented, named set of methods callable from script.
///
/// Methods are addressed by their index in [`NativeModule::methods`]. The
/// method list is read once at registration and never changes afterwards.
pub trait NativeModule: Send + Sync {
    /// Unique module name
    fn name(&self) -> &str;

    /// Ordered method signatures
    fn methods(&self) -> Vec<MethodDescriptor>;

    /// Run the method at `method_index`. Async methods return `Value::Null`.
    fn invoke(&self, method_index: usize, args: Args) -> ModuleResult<Value>;

    /// Constants exported to script alongside the method table
    fn constants(&self) -> Value {
        Value::Null
    }

    /// Called once, after every module is registered
    fn initialize(&self) {}

    /// Called once while the instance tears down
    fn on_instance_destroy(&self) {}

    /// Called after a batch of script calls has been dispatched
    fn on_batch_complete(&self) {}

    /// Whether host lifecycle notifications should be delivered
    fn observes_lifecycle(&self) -> bool {
        false
    }

    fn on_host_resume(&self) {}

    fn on_host_pause(&self) {}

    fn on_host_destroy(&self) {}

    fn on_memory_pressure(&self, _level: MemoryPressure) {}

    /// Get as Any for downcasting
    fn as_any(&self) -> &dyn Any;
}

/// Handler of one builder-defined method
pub type MethodHandler = Arc<dyn Fn(&Args) -> ModuleResult<Value> + Send + Sync>;

type Hook = Arc<dyn Fn() + Send + Sync>;

struct MethodEntry {
    descriptor: MethodDescriptor,
    handler: MethodHandler,
}

#[derive(Default)]
struct Hooks {
    initialize: Option<Hook>,
    instance_destroy: Option<Hook>,
    batch_complete: Option<Hook>,
    host_resume: Option<Hook>,
    host_pause: Option<Hook>,
    host_destroy: Option<Hook>,
    memory_pressure: Option<Arc<dyn Fn(MemoryPressure) + Send + Sync>>,
}

/// Builds a module from a table of named method closures.
///
/// Promise methods may settle their promise themselves; a promise left
/// unsettled when the handler returns `Ok(value)` is resolved with `value`.
///
/// ```ignore
/// let module = ModuleBuilder::new("Echo")
///     .method("echo", vec![ArgKind::String, ArgKind::Callback], |args| {
///         args.callback(1)?.invoke(vec![args.string(0)?.into()])?;
///         Ok(Value::Null)
///     })?
///     .build();
/// ```
pub struct ModuleBuilder {
    name: String,
    methods: Vec<MethodEntry>,
    constants: Value,
    hooks: Hooks,
}

impl ModuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
            constants: Value::Null,
            hooks: Hooks::default(),
        }
    }

    /// Add a non-blocking method (async, or promise when the signature ends
    /// with `ArgKind::Promise`)
    pub fn method<F>(self, name: &str, signature: Vec<ArgKind>, handler: F) -> ModuleResult<Self>
    where
        F: Fn(&Args) -> ModuleResult<Value> + Send + Sync + 'static,
    {
        Ok(self.push(MethodDescriptor::new(name, signature, false)?, Arc::new(handler)))
    }

    /// Add a blocking method that returns its value to the caller
    pub fn sync_method<F>(self, name: &str, signature: Vec<ArgKind>, handler: F) -> ModuleResult<Self>
    where
        F: Fn(&Args) -> ModuleResult<Value> + Send + Sync + 'static,
    {
        Ok(self.push(MethodDescriptor::new(name, signature, true)?, Arc::new(handler)))
    }

    /// Add an exported constant
    pub fn constant(mut self, key: &str, value: impl Into<Value>) -> Self {
        if self.constants.is_null() {
            self.constants = Value::object();
        }
        self.constants.set(key, value);
        self
    }

    pub fn on_initialize(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks.initialize = Some(Arc::new(hook));
        self
    }

    pub fn on_instance_destroy(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks.instance_destroy = Some(Arc::new(hook));
        self
    }

    pub fn on_batch_complete(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks.batch_complete = Some(Arc::new(hook));
        self
    }

    pub fn on_host_resume(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks.host_resume = Some(Arc::new(hook));
        self
    }

    pub fn on_host_pause(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks.host_pause = Some(Arc::new(hook));
        self
    }

    pub fn on_host_destroy(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks.host_destroy = Some(Arc::new(hook));
        self
    }

    pub fn on_memory_pressure(
        mut self,
        hook: impl Fn(MemoryPressure) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.memory_pressure = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> BuiltModule {
        BuiltModule {
            name: self.name,
            methods: self.methods,
            constants: self.constants,
            hooks: self.hooks,
        }
    }

    fn push(mut self, descriptor: MethodDescriptor, handler: MethodHandler) -> Self {
        self.methods.push(MethodEntry {
            descriptor,
            handler,
        });
        self
    }
}

/// A module produced by [`ModuleBuilder`]
pub struct BuiltModule {
    name: String,
    methods: Vec<MethodEntry>,
    constants: Value,
    hooks: Hooks,
}

impl BuiltModule {
    fn run_hook(hook: &Option<Hook>) {
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl NativeModule for BuiltModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn methods(&self) -> Vec<MethodDescriptor> {
        self.methods.iter().map(|m| m.descriptor.clone()).collect()
    }

    fn invoke(&self, method_index: usize, args: Args) -> ModuleResult<Value> {
        let entry = self.methods.get(method_index).ok_or_else(|| {
            ModuleError::UnknownMethod {
                module: self.name.clone(),
                index: method_index,
            }
        })?;

        let value = (entry.handler)(&args)?;

        if let Some(promise) = args.promise() {
            if !promise.is_settled() {
                promise.resolve(value)?;
            }
            return Ok(Value::Null);
        }
        Ok(value)
    }

    fn constants(&self) -> Value {
        self.constants.clone()
    }

    fn initialize(&self) {
        Self::run_hook(&self.hooks.initialize);
    }

    fn on_instance_destroy(&self) {
        Self::run_hook(&self.hooks.instance_destroy);
    }

    fn on_batch_complete(&self) {
        Self::run_hook(&self.hooks.batch_complete);
    }

    fn observes_lifecycle(&self) -> bool {
        self.hooks.host_resume.is_some()
            || self.hooks.host_pause.is_some()
            || self.hooks.host_destroy.is_some()
    }

    fn on_host_resume(&self) {
        Self::run_hook(&self.hooks.host_resume);
    }

    fn on_host_pause(&self) {
        Self::run_hook(&self.hooks.host_pause);
    }

    fn on_host_destroy(&self) {
        Self::run_hook(&self.hooks.host_destroy);
    }

    fn on_memory_pressure(&self, level: MemoryPressure) {
        if let Some(hook) = &self.hooks.memory_pressure {
            hook(level);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for BuiltModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltModule")
            .field("name", &self.name)
            .field(
                "methods",
                &self.methods.iter().map(|m| m.descriptor.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::Arg;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_builder_produces_ordered_methods() {
        let module = ModuleBuilder::new("Math")
            .method("log", vec![ArgKind::String], |_| Ok(Value::Null))
            .unwrap()
            .sync_method("add", vec![ArgKind::Number, ArgKind::Number], |args| {
                Ok(Value::from(args.number(0)? + args.number(1)?))
            })
            .unwrap()
            .constant("RATIO", 2.5)
            .build();

        let methods = module.methods();
        assert_eq!(methods.len(), 2);
        assert_eq!(methods[1].name, "add");
        assert!(methods[1].is_blocking());
        assert_eq!(module.constants().get("RATIO"), Some(&Value::from(2.5)));

        let args = Args::from_args("Math", "add", vec![Arg::Number(2.0), Arg::Number(3.0)]);
        assert_eq!(module.invoke(1, args).unwrap(), Value::from(5.0));
    }

    #[test]
    fn test_unknown_index_is_rejected() {
        let module = ModuleBuilder::new("Empty").build();
        let args = Args::from_args("Empty", "?", vec![]);
        assert!(module.invoke(0, args).is_err());
    }

    #[test]
    fn test_lifecycle_hooks() {
        let resumed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&resumed);

        let module = ModuleBuilder::new("Lifecycle")
            .on_host_resume(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build();

        assert!(module.observes_lifecycle());
        module.on_host_resume();
        module.on_host_pause();
        assert_eq!(resumed.load(Ordering::SeqCst), 1);

        let plain = ModuleBuilder::new("Plain").build();
        assert!(!plain.observes_lifecycle());
    }
}
