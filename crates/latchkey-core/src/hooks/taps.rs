//! Pass-through observers around the target's verification entry points.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;
use crate::hooks::InstallReport;
use crate::host::{MethodTap, VmRuntime, VmValue};
use crate::profile::TapSpec;

/// Wrap every configured method so its arguments and result are logged.
///
/// The click hook rides along here: it is the same wrapper shape, just aimed
/// at the listener-registration method so UI activity shows up in the stream.
pub fn install_taps<V: VmRuntime + ?Sized>(
    vm: &V,
    taps: &[TapSpec],
    click: Option<&TapSpec>,
) -> InstallReport {
    let mut report = InstallReport::default();
    for spec in taps.iter().chain(click) {
        match install_one(vm, spec) {
            Ok(()) => {
                info!("tap installed: {}.{}", spec.class, spec.method);
                report.ok();
            }
            Err(e) => {
                warn!("failed to tap {}.{}: {}", spec.class, spec.method, e);
                report.fail();
            }
        }
    }
    report
}

fn install_one<V: VmRuntime + ?Sized>(vm: &V, spec: &TapSpec) -> Result<()> {
    let enter_label = format!("{}.{}", spec.class, spec.method);
    let leave_label = enter_label.clone();
    vm.tap_method(
        &spec.class,
        &spec.method,
        MethodTap {
            on_enter: Arc::new(move |args| {
                info!("{enter_label}() called with: {}", format_args_list(args));
            }),
            on_leave: Arc::new(move |result| {
                info!("{leave_label}() returned: {result}");
            }),
        },
    )
}

fn format_args_list(args: &[VmValue]) -> String {
    if args.is_empty() {
        return "(no arguments)".to_string();
    }
    args.iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::builtin_profile;
    use crate::standin::StandInTarget;

    #[test]
    fn test_taps_pass_results_through_unchanged() {
        let target = StandInTarget::secureapp();
        let profile = builtin_profile();

        let report = install_taps(&target, &profile.taps, profile.click.as_ref());
        assert_eq!(report.failed, 0);
        assert_eq!(report.installed, profile.taps.len() + 1);

        let flag = target.flag();
        let good = target
            .invoke_vm(
                "com.ctf.secureapp.HiddenCheck",
                "verify",
                &[VmValue::Str(flag)],
            )
            .unwrap();
        assert_eq!(good, VmValue::Bool(true));

        let bad = target
            .invoke_vm(
                "com.ctf.secureapp.HiddenCheck",
                "verify",
                &[VmValue::Str("APIIT{nope}".to_string())],
            )
            .unwrap();
        assert_eq!(bad, VmValue::Bool(false));
    }

    #[test]
    fn test_format_args_list() {
        assert_eq!(format_args_list(&[]), "(no arguments)");
        assert_eq!(
            format_args_list(&[VmValue::Str("x".to_string()), VmValue::Int(3)]),
            "x, 3"
        );
    }
}
