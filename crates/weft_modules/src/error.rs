//! Module errors

use crate::descriptor::ArgKind;
use thiserror::Error;
use weft_queue::QueueError;

/// Errors from module registration and dispatch
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModuleError {
    #[error("Module already registered: {0}")]
    DuplicateModule(String),

    #[error("Unknown module: {0}")]
    UnknownModule(String),

    #[error("Unknown method {index} on module {module}")]
    UnknownMethod { module: String, index: usize },

    #[error("{module}.{method} expects {expected} argument(s), got {actual}")]
    ArgumentCount {
        module: String,
        method: String,
        expected: usize,
        actual: usize,
    },

    #[error("{module}.{method}: argument {index} should be {expected}, got {actual}")]
    ArgumentType {
        module: String,
        method: String,
        index: usize,
        expected: ArgKind,
        actual: String,
    },

    #[error("{module}.{method} failed: {message}")]
    CallFailed {
        module: String,
        method: String,
        message: String,
    },

    #[error("{0} was already settled")]
    AlreadySettled(String),

    #[error("Blocking call to {module}.{method} is not allowed from the UI queue")]
    WrongThread { module: String, method: String },

    #[error("Invalid method signature for {method}: {reason}")]
    InvalidSignature { method: String, reason: String },

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

impl ModuleError {
    /// Build a `CallFailed` from inside a method body
    pub fn call_failed(
        module: impl Into<String>,
        method: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::CallFailed {
            module: module.into(),
            method: method.into(),
            message: message.into(),
        }
    }

    /// Error code handed to the script when a promise is rejected with this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateModule(_) => "E_DUPLICATE_MODULE",
            Self::UnknownModule(_) | Self::UnknownMethod { .. } => "E_UNKNOWN_METHOD",
            Self::ArgumentCount { .. } => "E_ARGUMENT_COUNT",
            Self::ArgumentType { .. } => "E_ARGUMENT_TYPE",
            Self::CallFailed { .. } => "E_NATIVE_MODULE_CALL",
            Self::AlreadySettled(_) => "E_ALREADY_SETTLED",
            Self::WrongThread { .. } => "E_WRONG_THREAD",
            Self::InvalidSignature { .. } => "E_INVALID_SIGNATURE",
            Self::Queue(_) => "E_QUEUE",
        }
    }
}

/// Result type for module operations
pub type ModuleResult<T> = Result<T, ModuleError>;
