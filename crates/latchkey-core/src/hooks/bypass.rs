//! Forced-boolean replacements for the target's self-defense checks.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;
use crate::hooks::InstallReport;
use crate::host::{VmRuntime, VmValue};
use crate::profile::BypassSpec;

/// Replace every configured check method with a fixed-boolean implementation.
pub fn install_bypasses<V: VmRuntime + ?Sized>(vm: &V, hooks: &[BypassSpec]) -> InstallReport {
    let mut report = InstallReport::default();
    for spec in hooks {
        match install_one(vm, spec) {
            Ok(()) => {
                info!(
                    "bypass installed: {}.{} -> {}",
                    spec.class, spec.method, spec.returns
                );
                report.ok();
            }
            Err(e) => {
                warn!("failed to bypass {}.{}: {}", spec.class, spec.method, e);
                report.fail();
            }
        }
    }
    report
}

fn install_one<V: VmRuntime + ?Sized>(vm: &V, spec: &BypassSpec) -> Result<()> {
    let label = format!("{}.{}", spec.class, spec.method);
    let forced = spec.returns;
    vm.replace_method(
        &spec.class,
        &spec.method,
        Arc::new(move |_args| {
            info!("{label}() called - returning {forced}");
            VmValue::Bool(forced)
        }),
    )
}
