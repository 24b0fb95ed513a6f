//! Exercise every stage against the in-process stand-in target.
//!
//! Installs the full hook set, then drives the hooked target the way the app
//! itself would: calls the bypassed checks, feeds the recovered secret back
//! into the target's own verifier, and triggers the native probe.

use anyhow::{Result, ensure};
use latchkey_core::{
    Session, ShutdownSignal, StandInTarget, VmValue, builtin_profile, hexdump, secret_banner,
};
use owo_colors::OwoColorize;
use tracing::info;

const ACTIVITY: &str = "com.ctf.secureapp.MainActivity";
const PROBE_EXPORT: &str = "_Z16anti_debug_checkv";
const SELFTEST_DELAY_MS: u64 = 50;

pub fn run() -> Result<()> {
    let mut profile = builtin_profile();
    info!(
        "scan delay shortened to {}ms for the stand-in run",
        SELFTEST_DELAY_MS
    );
    profile.scan.delay_ms = SELFTEST_DELAY_MS;

    let target = StandInTarget::secureapp();
    let session = Session::new(profile);
    let shutdown = ShutdownSignal::new();
    let report = session.run(&target, &target, &shutdown);

    println!();
    status(
        "VM hooks",
        report.vm.all_ok() && report.vm.installed > 0,
        &format!("{} installed, {} failed", report.vm.installed, report.vm.failed),
    );
    status(
        "native hooks",
        report.native.all_ok() && report.native.installed > 0,
        &format!(
            "{} installed, {} failed",
            report.native.installed, report.native.failed
        ),
    );

    let debugger = target.invoke_vm("android.os.Debug", "isDebuggerConnected", &[])?;
    status(
        "debugger check bypassed",
        debugger == VmValue::Bool(false),
        &format!("isDebuggerConnected reports {debugger}"),
    );

    let rooted = target.invoke_vm(ACTIVITY, "isRooted", &[])?;
    status(
        "root check bypassed",
        rooted == VmValue::Bool(false),
        &format!("isRooted reports {rooted}"),
    );

    let signature = target.invoke_vm(ACTIVITY, "verifyCertificate", &[])?;
    status(
        "signature check bypassed",
        signature == VmValue::Bool(true),
        &format!("verifyCertificate reports {signature}"),
    );

    let probe = target.invoke_native(PROBE_EXPORT, &[])?;
    status(
        "native probe forced",
        probe == 0,
        &format!("{PROBE_EXPORT} returns {probe:#x}"),
    );

    if let Some(secret) = &report.secret {
        let verdict = target.invoke_vm(ACTIVITY, "verifyFlag", &[VmValue::Str(secret.clone())])?;
        status(
            "recovered secret verifies",
            verdict == VmValue::Bool(true),
            &format!("target verifier reports {verdict}"),
        );
        println!();
        println!("{}", secret_banner(secret));
    }

    for hit in &report.matches {
        println!();
        println!("pattern hit at {:#x}", hit.address);
        print!("{}", hexdump(hit.address, &hit.window));
    }

    ensure!(report.secret.is_some(), "secret extraction failed");
    ensure!(!report.matches.is_empty(), "memory scan found nothing");
    ensure!(
        report.vm.all_ok() && report.native.all_ok(),
        "hook installation reported failures"
    );

    println!();
    println!("{}", "stand-in run passed".green().bold());
    Ok(())
}

fn status(label: &str, ok: bool, detail: &str) {
    if ok {
        println!("[{}] {label}: {detail}", "+".green());
    } else {
        println!("[{}] {label}: {detail}", "-".red());
    }
}
