//! Stage orchestration.
//!
//! A session runs the stages in declaration order: VM bypasses, VM taps,
//! secret extraction, native hooks, then the delayed scan. The stages share no
//! state and each is guarded on its own; nothing a single stage does can abort
//! the others.

use std::time::Duration;

use tracing::{info, warn};

use crate::extract::read_secret;
use crate::hooks::{InstallReport, install_bypasses, install_native_hooks, install_taps};
use crate::host::{NativeRuntime, VmRuntime};
use crate::profile::TargetProfile;
use crate::scan::{ScanMatch, run_scan};
use crate::shutdown::ShutdownSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Stage {
    Bypass,
    Tap,
    Secret,
    Native,
    Scan,
}

/// Everything a finished session produced.
#[derive(Debug, Default)]
pub struct SessionReport {
    pub vm: InstallReport,
    pub native: InstallReport,
    pub secret: Option<String>,
    pub matches: Vec<ScanMatch>,
}

pub struct Session {
    profile: TargetProfile,
}

impl Session {
    pub fn new(profile: TargetProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &TargetProfile {
        &self.profile
    }

    /// Stages 1 and 2: check bypasses, then pass-through taps.
    pub fn install_vm_hooks<V: VmRuntime + ?Sized>(&self, vm: &V) -> InstallReport {
        info!("installing {} hooks for {}", Stage::Bypass, self.profile.name);
        let bypass = install_bypasses(vm, &self.profile.bypasses);

        info!("installing {} hooks", Stage::Tap);
        let tap = install_taps(vm, &self.profile.taps, self.profile.click.as_ref());

        InstallReport {
            installed: bypass.installed + tap.installed,
            failed: bypass.failed + tap.failed,
        }
    }

    /// Stage 3: recover the secret, or log why it could not be read.
    pub fn extract_secret<V: VmRuntime + ?Sized>(&self, vm: &V) -> Option<String> {
        info!("running {} stage on {}", Stage::Secret, self.profile.secret.class);
        match read_secret(vm, &self.profile.secret) {
            Ok(secret) => {
                info!("secret recovered ({} chars)", secret.chars().count());
                Some(secret)
            }
            Err(e) => {
                warn!("secret extraction failed: {}", e);
                None
            }
        }
    }

    /// Stage 4: native export interception.
    pub fn install_native_hooks<N: NativeRuntime + ?Sized>(&self, rt: &N) -> InstallReport {
        info!("installing {} hooks on {}", Stage::Native, self.profile.native.module);
        install_native_hooks(rt, &self.profile.native)
    }

    /// Stage 5: wait out the configured delay, then scan once.
    ///
    /// A triggered shutdown skips the scan; resolution or read failures log
    /// and produce no matches.
    pub fn delayed_scan<N: NativeRuntime + ?Sized>(
        &self,
        rt: &N,
        shutdown: &ShutdownSignal,
    ) -> Vec<ScanMatch> {
        let delay = Duration::from_millis(self.profile.scan.delay_ms);
        if shutdown.wait(delay) {
            info!("shutdown before {} stage, skipping", Stage::Scan);
            return Vec::new();
        }

        info!("running {} stage on {}", Stage::Scan, self.profile.scan.module);
        match run_scan(rt, &self.profile.scan) {
            Ok(matches) => {
                info!("scan complete: {} match(es)", matches.len());
                matches
            }
            Err(e) => {
                warn!("scan failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Run every stage in declaration order. Never fails; per-stage problems
    /// surface in the report and the log stream.
    pub fn run<V, N>(&self, vm: &V, rt: &N, shutdown: &ShutdownSignal) -> SessionReport
    where
        V: VmRuntime + ?Sized,
        N: NativeRuntime + ?Sized,
    {
        let vm_report = self.install_vm_hooks(vm);
        let secret = self.extract_secret(vm);
        let native_report = self.install_native_hooks(rt);
        let matches = self.delayed_scan(rt, shutdown);

        SessionReport {
            vm: vm_report,
            native: native_report,
            secret,
            matches,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::builtin_profile;
    use crate::standin::StandInTarget;
    use std::time::Instant;

    fn quick_profile() -> TargetProfile {
        let mut profile = builtin_profile();
        profile.scan.delay_ms = 40;
        profile
    }

    #[test]
    fn test_full_run_against_secureapp_standin() {
        let target = StandInTarget::secureapp();
        let session = Session::new(quick_profile());
        let shutdown = ShutdownSignal::new();

        let report = session.run(&target, &target, &shutdown);

        assert!(report.vm.all_ok());
        assert!(report.native.all_ok());
        assert_eq!(
            report.secret.as_deref(),
            Some("APIIT{N4t1v3_4nd_J4v4_Obfusc4t1on_M4st3r}")
        );
        assert_eq!(report.matches.len(), 1);
    }

    #[test]
    fn test_failed_extraction_leaves_native_stage_intact() {
        let target = StandInTarget::secureapp();
        let mut profile = quick_profile();
        profile.secret.fields.push("PART7".to_string());

        let session = Session::new(profile);
        let shutdown = ShutdownSignal::new();
        let report = session.run(&target, &target, &shutdown);

        assert!(report.secret.is_none());
        assert_eq!(report.native.installed, 2);
        assert_eq!(report.native.failed, 0);
    }

    #[test]
    fn test_delayed_scan_respects_delay() {
        let target = StandInTarget::secureapp();
        let session = Session::new(quick_profile());
        let shutdown = ShutdownSignal::new();

        let start = Instant::now();
        let matches = session.delayed_scan(&target, &shutdown);
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn test_delayed_scan_skipped_on_shutdown() {
        let target = StandInTarget::secureapp();
        let session = Session::new(quick_profile());
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();

        assert!(session.delayed_scan(&target, &shutdown).is_empty());
    }

    #[test]
    fn test_scan_with_absent_pattern_reports_no_matches() {
        let target = StandInTarget::secureapp();
        let mut profile = quick_profile();
        profile.scan.pattern = "DE AD BE EF 00 01".to_string();

        let session = Session::new(profile);
        let shutdown = ShutdownSignal::new();
        let report = session.run(&target, &target, &shutdown);

        assert!(report.matches.is_empty());
    }

    #[test]
    fn test_stage_display_names() {
        assert_eq!(Stage::Bypass.to_string(), "bypass");
        assert_eq!(Stage::Scan.to_string(), "scan");
    }
}
