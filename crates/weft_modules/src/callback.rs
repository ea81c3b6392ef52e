//! Single-resolution callbacks into the script runtime
//!
//! A `Callback` wraps one script function handle; a `Promise` wraps the
//! resolve/reject pair of one script promise. Clones share their settled
//! flag, so the at-most-once rule holds across every copy.

use crate::error::{ModuleError, ModuleResult};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use weft_core::{CallbackId, Value};

/// Hands callback results back to the script runtime
pub trait JsCallbackInvoker: Send + Sync {
    fn invoke_callback(&self, callback_id: CallbackId, args: Vec<Value>);
}

/// Calls a named function of a script module (`JSTimers.callTimers`, ...)
pub trait JsFunctionCaller: Send + Sync {
    fn call_function(&self, module: &str, method: &str, args: Vec<Value>);
}

/// A script function that may be invoked at most once
#[derive(Clone)]
pub struct Callback {
    id: CallbackId,
    invoker: Arc<dyn JsCallbackInvoker>,
    settled: Arc<AtomicBool>,
}

impl Callback {
    pub fn new(id: CallbackId, invoker: Arc<dyn JsCallbackInvoker>) -> Self {
        Self {
            id,
            invoker,
            settled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> CallbackId {
        self.id
    }

    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::SeqCst)
    }

    /// Invoke the script function. A second invocation is refused.
    pub fn invoke(&self, args: Vec<Value>) -> ModuleResult<()> {
        if self.settled.swap(true, Ordering::SeqCst) {
            log::error!("Callback {} invoked more than once", self.id);
            return Err(ModuleError::AlreadySettled(format!("callback {}", self.id)));
        }
        self.invoker.invoke_callback(self.id, args);
        Ok(())
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("id", &self.id)
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// A script promise that settles at most once
#[derive(Clone)]
pub struct Promise {
    resolve_id: CallbackId,
    reject_id: CallbackId,
    invoker: Arc<dyn JsCallbackInvoker>,
    settled: Arc<AtomicBool>,
}

impl Promise {
    pub fn new(
        resolve_id: CallbackId,
        reject_id: CallbackId,
        invoker: Arc<dyn JsCallbackInvoker>,
    ) -> Self {
        Self {
            resolve_id,
            reject_id,
            invoker,
            settled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::SeqCst)
    }

    pub fn resolve(&self, value: impl Into<Value>) -> ModuleResult<()> {
        self.settle()?;
        self.invoker
            .invoke_callback(self.resolve_id, vec![value.into()]);
        Ok(())
    }

    /// Reject with an error code and message. The script receives
    /// `{ code, message }`.
    pub fn reject(&self, code: &str, message: &str) -> ModuleResult<()> {
        self.settle()?;
        let error: Value = [("code", Value::from(code)), ("message", Value::from(message))]
            .into_iter()
            .collect();
        self.invoker.invoke_callback(self.reject_id, vec![error]);
        Ok(())
    }

    /// Reject with a module error
    pub fn reject_with_error(&self, error: &ModuleError) -> ModuleResult<()> {
        self.reject(error.code(), &error.to_string())
    }

    fn settle(&self) -> ModuleResult<()> {
        if self.settled.swap(true, Ordering::SeqCst) {
            log::error!(
                "Promise ({}, {}) settled more than once",
                self.resolve_id,
                self.reject_id
            );
            return Err(ModuleError::AlreadySettled(format!(
                "promise {}",
                self.resolve_id
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("resolve_id", &self.resolve_id)
            .field("reject_id", &self.reject_id)
            .field("settled", &self.is_settled())
            .finish()
    }
}
