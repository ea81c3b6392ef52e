//! # weft_bridge - Instance and Fabric Binding
//!
//! The live session between a script runtime and native code.
//!
//! ```text
//!   host ──► Instance::call_function ──► batch ──► script queue ──► ScriptRuntime
//!                                                                      │ NativeCall
//!                                                                      ▼
//!   ExceptionHandler ◄── failures ── ModuleRegistry ◄─────────────── dispatch
//!
//!   FabricBinding::commit ──► diff ──► UI queue ──► MountingManager
//!                                                       │ events
//!                      RCTEventEmitter.receiveEvent ◄───┘ (event beat)
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Exclusive ownership** - the instance owns its queues, registry and
//!    runtime; modules and views reach it only through weak links
//! 2. **Destroyed once** - `destroy()` is idempotent and guarded
//! 3. **Commit order** - mutation lists reach the UI queue in revision order

pub mod config;
pub mod error;
pub mod fabric_binding;
pub mod idle;
pub mod instance;
pub mod runtime;

pub use config::{InstanceConfig, DEV_MODE_ENV};
pub use error::{BridgeError, BridgeResult, ConfigError, ConfigResult};
pub use fabric_binding::{FabricBinding, MountFailureHandler, EVENT_EMITTER_MODULE, RECEIVE_EVENT};
pub use idle::{BridgeIdleListener, PendingCallCounter};
pub use instance::{
    Exception, Instance, InstanceBuilder, InstanceExceptionHandler, InstanceState,
    LoggingInstanceExceptionHandler, ModuleContext,
};
pub use runtime::{JsCall, NativeCall, ScriptError, ScriptResult, ScriptRuntime, StackFrame};
