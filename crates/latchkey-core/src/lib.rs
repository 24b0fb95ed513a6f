//! # latchkey-core
//!
//! Core library for the latchkey runtime-bypass toolkit.
//!
//! This crate provides:
//! - A serializable target profile (hook lists, secret layout, scan parameters)
//! - Capability traits modeling the instrumentation host (method replacement,
//!   native interception, module resolution, memory reads)
//! - The bypass stages: VM check overrides, pass-through taps, secret-fragment
//!   extraction, native hooks, and the delayed memory scan
//! - Rendering of the in-process agent script issued to the host
//!
//! ## Feature Flags
//!
//! - `debug-tools`: Enables the stand-in target used by the CLI selftest and by
//!   integration-style tests. Not intended for production use.

pub mod agent;
pub mod error;
pub mod extract;
pub mod hooks;
pub mod host;
pub mod memory;
pub mod pattern;
pub mod profile;
pub mod report;
pub mod scan;
pub mod session;
pub mod shutdown;

#[cfg(any(test, feature = "debug-tools"))]
pub mod standin;

pub use agent::render_agent;
pub use error::{Error, Result};
pub use extract::{decode_char_codes, read_secret};
pub use hooks::{InstallReport, install_bypasses, install_native_hooks, install_taps};
pub use host::{
    MethodTap, NativeCall, NativeRuntime, NativeTap, ReplacementFn, RetVal, StringReaderFn,
    VmRuntime, VmValue,
};
pub use memory::{ImageReader, ReadMemory};
pub use pattern::{format_pattern, parse_pattern};
pub use profile::{
    BypassSpec, NativeHookSpec, NativeSpec, ScanSpec, SecretSpec, StringArgSpec, SymbolRef,
    TapSpec, TargetProfile, builtin_profile, load_profile, save_profile,
};
pub use report::{hexdump, secret_banner};
pub use scan::{ScanMatch, run_scan, scan_range};
pub use session::{Session, SessionReport, Stage};
pub use shutdown::ShutdownSignal;

#[cfg(any(test, feature = "debug-tools"))]
pub use standin::StandInTarget;
