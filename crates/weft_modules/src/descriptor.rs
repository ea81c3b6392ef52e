//! Module and method descriptors
//!
//! A descriptor is the immutable, registered shape of a module: its name
//! and the ordered signatures of its methods. Method indices are positions
//! in that list.

use crate::error::{ModuleError, ModuleResult};
use serde::Serialize;
use std::fmt;

/// One parameter kind in a method signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgKind {
    Boolean,
    /// Any script number, delivered as f64
    Number,
    /// A script number without fractional part, delivered as i64
    Integer,
    String,
    Array,
    Map,
    /// One slot: the callback id
    Callback,
    /// Two slots: resolve id, reject id. Only valid as the last parameter.
    Promise,
}

impl ArgKind {
    /// Number of script argument slots this parameter consumes
    pub fn js_slots(&self) -> usize {
        match self {
            Self::Promise => 2,
            _ => 1,
        }
    }

    /// Whether a null script value is accepted for this kind
    pub fn is_nullable(&self) -> bool {
        matches!(self, Self::String | Self::Array | Self::Map | Self::Callback)
    }
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::String => "string",
            Self::Array => "array",
            Self::Map => "map",
            Self::Callback => "callback",
            Self::Promise => "promise",
        };
        f.write_str(name)
    }
}

/// How a method is dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodKind {
    /// Scheduled on the native-modules queue, returns nothing
    Async,
    /// Scheduled on the native-modules queue, settles a trailing promise
    Promise,
    /// Blocks the caller and returns a value directly
    Sync,
}

/// Shape of one method
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodDescriptor {
    pub name: String,
    pub signature: Vec<ArgKind>,
    pub kind: MethodKind,
}

impl MethodDescriptor {
    /// Describe a method. `blocking` selects `Sync`; otherwise the kind is
    /// `Promise` when the signature ends with a promise and `Async` if not.
    pub fn new(name: impl Into<String>, signature: Vec<ArgKind>, blocking: bool) -> ModuleResult<Self> {
        let name = name.into();

        let promise_positions: Vec<usize> = signature
            .iter()
            .enumerate()
            .filter(|(_, kind)| **kind == ArgKind::Promise)
            .map(|(i, _)| i)
            .collect();

        match promise_positions.as_slice() {
            [] => {}
            [last] if *last + 1 == signature.len() => {}
            _ => {
                return Err(ModuleError::InvalidSignature {
                    method: name,
                    reason: "a promise must be the single, last parameter".to_string(),
                })
            }
        }

        let ends_with_promise = !promise_positions.is_empty();
        if blocking && ends_with_promise {
            return Err(ModuleError::InvalidSignature {
                method: name,
                reason: "blocking methods return directly and cannot take a promise".to_string(),
            });
        }

        let kind = if blocking {
            MethodKind::Sync
        } else if ends_with_promise {
            MethodKind::Promise
        } else {
            MethodKind::Async
        };

        Ok(Self {
            name,
            signature,
            kind,
        })
    }

    /// Number of script arguments a call must carry
    pub fn js_arg_count(&self) -> usize {
        self.signature.iter().map(ArgKind::js_slots).sum()
    }

    pub fn is_blocking(&self) -> bool {
        self.kind == MethodKind::Sync
    }
}

/// Registered shape of a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleDescriptor {
    pub name: String,
    pub methods: Vec<MethodDescriptor>,
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<String>, methods: Vec<MethodDescriptor>) -> Self {
        Self {
            name: name.into(),
            methods,
        }
    }

    /// Method at `index`
    pub fn method(&self, index: usize) -> ModuleResult<&MethodDescriptor> {
        self.methods.get(index).ok_or_else(|| ModuleError::UnknownMethod {
            module: self.name.clone(),
            index,
        })
    }

    /// Index of the method called `name`
    pub fn method_index(&self, name: &str) -> Option<usize> {
        self.methods.iter().position(|m| m.name == name)
    }
}
