//! # weft_modules - Native Module Registry
//!
//! Maps `(module name, method index)` pairs to native methods and converts
//! the script runtime's dynamic arguments into typed parameters.
//!
//! ```text
//!   invoke("Timing", 0, [1, 16, 1000, true])
//!        │
//!        ▼
//!   ModuleRegistry ── marshal ──► Args ──► NativeModule::invoke
//!        │                                  │
//!        │ async: NativeModules queue       │ Callback / Promise
//!        │ sync:  caller (blocking)         ▼
//!        ▼                            JsCallbackInvoker
//!   ExceptionHandler (every failure)
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Unique names** - a module name is registered at most once
//! 2. **Exact arity** - the script passes exactly the slots a signature needs;
//!    callbacks take one slot, promises take two
//! 3. **Contained failures** - errors and panics inside a method are caught at
//!    dispatch and routed to the exception handler
//! 4. **Single resolution** - a Callback or Promise settles at most once

pub mod args;
pub mod callback;
pub mod descriptor;
pub mod error;
pub mod module;
pub mod registry;
pub mod timing;

pub use args::{Arg, Args};
pub use callback::{Callback, JsCallbackInvoker, JsFunctionCaller, Promise};
pub use descriptor::{ArgKind, MethodDescriptor, MethodKind, ModuleDescriptor};
pub use error::{ModuleError, ModuleResult};
pub use module::{BuiltModule, MemoryPressure, MethodHandler, ModuleBuilder, NativeModule};
pub use registry::{
    ExceptionHandler, InvokeOutcome, LoggingExceptionHandler, ModuleConfig, ModuleRegistry,
};
pub use timing::TimingModule;
