//! Capability traits over the instrumentation host.
//!
//! The host owns process attachment, method-table patching, symbol resolution,
//! and memory access; this module is the seam through which the bypass stages
//! invoke those capabilities. Symbols are resolved by string lookup at
//! install time and every lookup can fail with a typed not-found error.
//!
//! Hook bodies are registered closures. They fire on whatever thread of the
//! target reaches the hooked code, so everything handed across this boundary
//! is `Send + Sync`.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::memory::ReadMemory;
use crate::profile::SymbolRef;

/// A value crossing the managed-runtime boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum VmValue {
    Null,
    Bool(bool),
    Int(i32),
    Str(String),
}

impl fmt::Display for VmValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmValue::Null => write!(f, "null"),
            VmValue::Bool(v) => write!(f, "{}", v),
            VmValue::Int(v) => write!(f, "{}", v),
            VmValue::Str(v) => write!(f, "{}", v),
        }
    }
}

/// Replacement body for a managed method. The original is never invoked.
pub type ReplacementFn = Arc<dyn Fn(&[VmValue]) -> VmValue + Send + Sync>;

/// Observer pair around a managed method.
///
/// The host invokes `on_enter` with the call arguments, runs the original
/// implementation, invokes `on_leave` with its result, and returns that result
/// unchanged.
#[derive(Clone)]
pub struct MethodTap {
    pub on_enter: Arc<dyn Fn(&[VmValue]) + Send + Sync>,
    pub on_leave: Arc<dyn Fn(&VmValue) + Send + Sync>,
}

/// Managed-runtime hook and reflection capabilities.
pub trait VmRuntime {
    /// Replace a method's implementation outright.
    fn replace_method(&self, class: &str, method: &str, replacement: ReplacementFn) -> Result<()>;

    /// Wrap a method without altering its result.
    fn tap_method(&self, class: &str, method: &str, tap: MethodTap) -> Result<()>;

    /// Read a private static int-array field, bypassing access control.
    fn read_static_int_array(&self, class: &str, field: &str) -> Result<Vec<i32>>;
}

/// Raw argument registers captured at a native call site.
#[derive(Debug, Clone)]
pub struct NativeCall {
    pub args: Vec<u64>,
}

impl NativeCall {
    pub fn new(args: Vec<u64>) -> Self {
        Self { args }
    }

    pub fn arg(&self, index: usize) -> Option<u64> {
        self.args.get(index).copied()
    }
}

/// Return value of an intercepted native call, replaceable on exit.
#[derive(Debug, Clone, Copy)]
pub struct RetVal {
    value: u64,
}

impl RetVal {
    pub fn new(value: u64) -> Self {
        Self { value }
    }

    pub fn get(&self) -> u64 {
        self.value
    }

    pub fn replace(&mut self, value: u64) {
        self.value = value;
    }
}

/// Entry/exit observers for a native export.
#[derive(Clone, Default)]
pub struct NativeTap {
    pub on_enter: Option<Arc<dyn Fn(&NativeCall) + Send + Sync>>,
    pub on_leave: Option<Arc<dyn Fn(&mut RetVal) + Send + Sync>>,
}

/// A resolved string-extraction primitive: `(env, string_handle) -> text`.
pub type StringReaderFn = Arc<dyn Fn(u64, u64) -> Result<String> + Send + Sync>;

/// Native-layer interception and module resolution.
pub trait NativeRuntime: ReadMemory {
    fn module_base(&self, module: &str) -> Result<u64>;

    fn export_address(&self, module: &str, symbol: &str) -> Result<u64>;

    fn attach(&self, module: &str, symbol: &str, tap: NativeTap) -> Result<()>;

    /// Resolve the runtime-internal string-extraction primitive by symbol name.
    ///
    /// The symbol is specific to one runtime build; callers must tolerate a
    /// not-found result.
    fn resolve_string_reader(&self, reader: &SymbolRef) -> Result<StringReaderFn>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vm_value_display() {
        assert_eq!(VmValue::Null.to_string(), "null");
        assert_eq!(VmValue::Bool(false).to_string(), "false");
        assert_eq!(VmValue::Int(42).to_string(), "42");
        assert_eq!(VmValue::Str("APIIT{x}".to_string()).to_string(), "APIIT{x}");
    }

    #[test]
    fn test_retval_replace() {
        let mut ret = RetVal::new(1);
        assert_eq!(ret.get(), 1);
        ret.replace(0);
        assert_eq!(ret.get(), 0);
    }

    #[test]
    fn test_native_call_arg() {
        let call = NativeCall::new(vec![10, 20, 30]);
        assert_eq!(call.arg(2), Some(30));
        assert_eq!(call.arg(3), None);
    }
}
