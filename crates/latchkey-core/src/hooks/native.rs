//! Native export interception.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;
use crate::hooks::InstallReport;
use crate::host::{NativeCall, NativeRuntime, NativeTap, RetVal, StringReaderFn};
use crate::profile::{NativeHookSpec, NativeSpec, StringArgSpec};

/// Attach to every configured native export.
pub fn install_native_hooks<N: NativeRuntime + ?Sized>(rt: &N, spec: &NativeSpec) -> InstallReport {
    let mut report = InstallReport::default();
    for hook in &spec.hooks {
        match install_one(rt, &spec.module, hook) {
            Ok(()) => {
                info!("native hook installed: {}!{}", spec.module, hook.export);
                report.ok();
            }
            Err(e) => {
                warn!("failed to hook {}!{}: {}", spec.module, hook.export, e);
                report.fail();
            }
        }
    }
    report
}

fn install_one<N: NativeRuntime + ?Sized>(
    rt: &N,
    module: &str,
    hook: &NativeHookSpec,
) -> Result<()> {
    // The string-extraction primitive is tied to one runtime build; when it
    // cannot be resolved the entry hook degrades to plain invocation logging
    // and the exit hook is installed regardless.
    let string_reader = hook.string_arg.as_ref().and_then(|spec| {
        match rt.resolve_string_reader(&spec.reader) {
            Ok(reader) => Some((spec.clone(), reader)),
            Err(e) => {
                warn!(
                    "string reader {}!{} unavailable: {}",
                    spec.reader.module, spec.reader.symbol, e
                );
                None
            }
        }
    });

    let enter_label = hook.export.clone();
    let on_enter = Arc::new(move |call: &NativeCall| {
        info!("{enter_label}() called");
        if let Some((spec, reader)) = &string_reader {
            log_string_arg(&enter_label, spec, reader, call);
        }
    });

    let leave_label = hook.export.clone();
    let force = hook.force_return;
    let on_leave = Arc::new(move |ret: &mut RetVal| {
        info!("{leave_label}() returned: {:#x}", ret.get());
        if let Some(value) = force {
            ret.replace(value);
            info!("{leave_label}() forced to return: {value:#x}");
        }
    });

    rt.attach(
        module,
        &hook.export,
        NativeTap {
            on_enter: Some(on_enter),
            on_leave: Some(on_leave),
        },
    )
}

fn log_string_arg(label: &str, spec: &StringArgSpec, reader: &StringReaderFn, call: &NativeCall) {
    let (Some(env), Some(handle)) = (call.arg(spec.env_index), call.arg(spec.index)) else {
        warn!("{label}: call has no argument at index {}", spec.index);
        return;
    };
    match reader(env, handle) {
        Ok(text) => info!("{label} input: {text}"),
        Err(e) => warn!("{label}: failed to read string argument: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{SymbolRef, builtin_profile};
    use crate::standin::StandInTarget;

    const PROBE: &str = "_Z16anti_debug_checkv";
    const VERIFY: &str = "Java_com_ctf_secureapp_MainActivity_verifyFlag";

    #[test]
    fn test_probe_exit_hook_forces_zero() {
        let target = StandInTarget::secureapp();
        let profile = builtin_profile();

        // Unhooked, the probe reports a tracer attached.
        assert_eq!(target.invoke_native(PROBE, &[]).unwrap(), 1);

        let report = install_native_hooks(&target, &profile.native);
        assert_eq!(report.installed, 2);
        assert_eq!(report.failed, 0);

        assert_eq!(target.invoke_native(PROBE, &[]).unwrap(), 0);
    }

    #[test]
    fn test_verify_hook_leaves_return_untouched() {
        let target = StandInTarget::secureapp();
        let profile = builtin_profile();
        install_native_hooks(&target, &profile.native);

        let jstring = target.flag_jstring();
        assert_eq!(target.invoke_native(VERIFY, &[0, 0, jstring]).unwrap(), 0);
    }

    #[test]
    fn test_missing_string_reader_keeps_forced_return() {
        let target = StandInTarget::secureapp();
        let spec = NativeSpec {
            module: "libnative-lib.so".to_string(),
            hooks: vec![NativeHookSpec {
                export: PROBE.to_string(),
                string_arg: Some(StringArgSpec {
                    env_index: 0,
                    index: 2,
                    reader: SymbolRef {
                        module: "libart.so".to_string(),
                        symbol: "_ZN3art3JNI7NoSuchBuildSymbolEv".to_string(),
                    },
                }),
                force_return: Some(0),
            }],
        };

        let report = install_native_hooks(&target, &spec);
        assert_eq!(report.installed, 1);
        assert_eq!(target.invoke_native(PROBE, &[0, 0, 0]).unwrap(), 0);
    }

    #[test]
    fn test_missing_export_counts_as_failure() {
        let target = StandInTarget::secureapp();
        let spec = NativeSpec {
            module: "libnative-lib.so".to_string(),
            hooks: vec![NativeHookSpec {
                export: "_Z12no_such_funcv".to_string(),
                string_arg: None,
                force_return: None,
            }],
        };

        let report = install_native_hooks(&target, &spec);
        assert_eq!(report.installed, 0);
        assert_eq!(report.failed, 1);
    }
}
