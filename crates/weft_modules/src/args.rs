//! Argument marshaling
//!
//! Converts the positional `Value`s of a script call into typed `Arg`s
//! following the method signature. Callback and promise slots become
//! [`Callback`] and [`Promise`] handles bound to the registry's invoker.

use crate::callback::{Callback, JsCallbackInvoker, Promise};
use crate::descriptor::{ArgKind, MethodDescriptor};
use crate::error::{ModuleError, ModuleResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use weft_core::{CallbackId, Value};

/// One marshaled parameter
#[derive(Debug, Clone)]
pub enum Arg {
    /// A null passed for a nullable kind
    Null,
    Boolean(bool),
    Number(f64),
    Integer(i64),
    String(String),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Callback(Callback),
    Promise(Promise),
}

/// Marshaled parameters of one call
#[derive(Debug, Clone)]
pub struct Args {
    module: String,
    method: String,
    values: Vec<Arg>,
}

impl Args {
    /// Marshal `values` for `method` of `module`
    pub fn marshal(
        module: &str,
        method: &MethodDescriptor,
        values: Vec<Value>,
        invoker: &Arc<dyn JsCallbackInvoker>,
    ) -> ModuleResult<Self> {
        let expected = method.js_arg_count();
        if values.len() != expected {
            return Err(ModuleError::ArgumentCount {
                module: module.to_string(),
                method: method.name.clone(),
                expected,
                actual: values.len(),
            });
        }

        let type_error = |index: usize, expected: ArgKind, actual: &Value| ModuleError::ArgumentType {
            module: module.to_string(),
            method: method.name.clone(),
            index,
            expected,
            actual: actual.type_name().to_string(),
        };

        let mut slots = values.into_iter();
        let mut marshaled = Vec::with_capacity(method.signature.len());
        let mut index = 0;

        for kind in &method.signature {
            let value = slots.next().unwrap_or_default();

            let arg = match (kind, &value) {
                (k, Value::Null) if k.is_nullable() => Arg::Null,
                (ArgKind::Boolean, Value::Bool(b)) => Arg::Boolean(*b),
                (ArgKind::Number, v) => Arg::Number(v.as_float().ok_or_else(|| type_error(index, *kind, v))?),
                (ArgKind::Integer, v) => Arg::Integer(v.as_int().ok_or_else(|| type_error(index, *kind, v))?),
                (ArgKind::String, Value::String(s)) => Arg::String(s.clone()),
                (ArgKind::Array, Value::Array(a)) => Arg::Array(a.clone()),
                (ArgKind::Map, Value::Object(o)) => Arg::Map(o.clone()),
                (ArgKind::Callback, v) => {
                    let id = callback_id(v).ok_or_else(|| type_error(index, *kind, v))?;
                    Arg::Callback(Callback::new(id, Arc::clone(invoker)))
                }
                (ArgKind::Promise, v) => {
                    let resolve = callback_id(v).ok_or_else(|| type_error(index, *kind, v))?;
                    let reject_value = slots.next().unwrap_or_default();
                    let reject = callback_id(&reject_value)
                        .ok_or_else(|| type_error(index + 1, *kind, &reject_value))?;
                    Arg::Promise(Promise::new(resolve, reject, Arc::clone(invoker)))
                }
                (k, v) => return Err(type_error(index, *k, v)),
            };

            index += kind.js_slots();
            marshaled.push(arg);
        }

        Ok(Self {
            module: module.to_string(),
            method: method.name.clone(),
            values: marshaled,
        })
    }

    /// Build directly from typed args (native callers and tests)
    pub fn from_args(module: impl Into<String>, method: impl Into<String>, values: Vec<Arg>) -> Self {
        Self {
            module: module.into(),
            method: method.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arg> {
        self.values.get(index)
    }

    pub fn is_null(&self, index: usize) -> bool {
        matches!(self.values.get(index), Some(Arg::Null))
    }

    pub fn boolean(&self, index: usize) -> ModuleResult<bool> {
        match self.values.get(index) {
            Some(Arg::Boolean(b)) => Ok(*b),
            other => Err(self.mismatch(index, ArgKind::Boolean, other)),
        }
    }

    pub fn number(&self, index: usize) -> ModuleResult<f64> {
        match self.values.get(index) {
            Some(Arg::Number(n)) => Ok(*n),
            Some(Arg::Integer(i)) => Ok(*i as f64),
            other => Err(self.mismatch(index, ArgKind::Number, other)),
        }
    }

    pub fn integer(&self, index: usize) -> ModuleResult<i64> {
        match self.values.get(index) {
            Some(Arg::Integer(i)) => Ok(*i),
            other => Err(self.mismatch(index, ArgKind::Integer, other)),
        }
    }

    pub fn string(&self, index: usize) -> ModuleResult<&str> {
        match self.values.get(index) {
            Some(Arg::String(s)) => Ok(s),
            other => Err(self.mismatch(index, ArgKind::String, other)),
        }
    }

    pub fn array(&self, index: usize) -> ModuleResult<&[Value]> {
        match self.values.get(index) {
            Some(Arg::Array(a)) => Ok(a),
            other => Err(self.mismatch(index, ArgKind::Array, other)),
        }
    }

    pub fn map(&self, index: usize) -> ModuleResult<&BTreeMap<String, Value>> {
        match self.values.get(index) {
            Some(Arg::Map(m)) => Ok(m),
            other => Err(self.mismatch(index, ArgKind::Map, other)),
        }
    }

    pub fn callback(&self, index: usize) -> ModuleResult<Callback> {
        match self.values.get(index) {
            Some(Arg::Callback(c)) => Ok(c.clone()),
            other => Err(self.mismatch(index, ArgKind::Callback, other)),
        }
    }

    /// The trailing promise, if the method takes one
    pub fn promise(&self) -> Option<Promise> {
        match self.values.last() {
            Some(Arg::Promise(p)) => Some(p.clone()),
            _ => None,
        }
    }

    fn mismatch(&self, index: usize, expected: ArgKind, actual: Option<&Arg>) -> ModuleError {
        let actual = match actual {
            None => "missing",
            Some(Arg::Null) => "null",
            Some(Arg::Boolean(_)) => "boolean",
            Some(Arg::Number(_)) => "number",
            Some(Arg::Integer(_)) => "integer",
            Some(Arg::String(_)) => "string",
            Some(Arg::Array(_)) => "array",
            Some(Arg::Map(_)) => "map",
            Some(Arg::Callback(_)) => "callback",
            Some(Arg::Promise(_)) => "promise",
        };
        ModuleError::ArgumentType {
            module: self.module.clone(),
            method: self.method.clone(),
            index,
            expected,
            actual: actual.to_string(),
        }
    }
}

fn callback_id(value: &Value) -> Option<CallbackId> {
    value
        .as_int()
        .filter(|id| *id >= 0)
        .map(|id| CallbackId::new(id as u64))
}
