//! Script runtime seam
//!
//! The engine that executes script is supplied by the embedder. The
//! instance only ever touches it from the script-runtime queue, feeding it
//! batches of [`JsCall`]s and dispatching the [`NativeCall`]s it returns.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use weft_core::{CallbackId, Value};
use weft_modules::{MemoryPressure, ModuleConfig};

/// A call from native into a script module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsCall {
    pub module: String,
    pub method: String,
    pub args: Vec<Value>,
}

impl JsCall {
    pub fn new(module: &str, method: &str, args: Vec<Value>) -> Self {
        Self {
            module: module.to_string(),
            method: method.to_string(),
            args,
        }
    }
}

/// A call from script into a native module method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeCall {
    pub module: String,
    pub method_index: usize,
    pub args: Vec<Value>,
}

impl NativeCall {
    pub fn new(module: &str, method_index: usize, args: Vec<Value>) -> Self {
        Self {
            module: module.to_string(),
            method_index,
            args,
        }
    }
}

/// One frame of a script stack trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub file: String,
    pub method: String,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}:{}", self.method, self.file, self.line, self.column)
    }
}

/// An uncaught script exception, as reported by the runtime
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ScriptError {
    pub message: String,
    pub stack: Vec<StackFrame>,
    pub is_fatal: bool,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: Vec::new(),
            is_fatal: false,
        }
    }

    pub fn with_frame(mut self, frame: StackFrame) -> Self {
        self.stack.push(frame);
        self
    }

    pub fn fatal(mut self) -> Self {
        self.is_fatal = true;
        self
    }
}

/// Outcome of one runtime entry point: the native calls script made
pub type ScriptResult = Result<Vec<NativeCall>, ScriptError>;

/// A script engine driven by the instance.
///
/// Every method runs on the script-runtime queue.
pub trait ScriptRuntime: Send {
    /// Receive the native module table before the bundle runs
    fn install_modules(&mut self, _modules: &[ModuleConfig]) {}

    /// Evaluate a script bundle
    fn load_bundle(&mut self, bundle: &str) -> ScriptResult;

    /// Run one batch of calls, in order
    fn call_functions(&mut self, batch: &[JsCall]) -> ScriptResult;

    /// Invoke a callback previously handed to native
    fn invoke_callback(&mut self, callback_id: CallbackId, args: &[Value]) -> ScriptResult;

    fn handle_memory_pressure(&mut self, _level: MemoryPressure) {}

    /// Release the engine context. Called once, last.
    fn teardown(&mut self) {}
}
