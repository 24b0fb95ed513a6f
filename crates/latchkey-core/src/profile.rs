//! Target profile: every symbol name, field list, and scan constant the bypass
//! stages act on, in one serializable structure.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::pattern::parse_pattern;

/// Forced-boolean replacement for a managed check method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BypassSpec {
    pub class: String,
    pub method: String,
    pub returns: bool,
}

/// Log-only pass-through wrapper around a managed method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapSpec {
    pub class: String,
    pub method: String,
}

/// Where the secret fragments live: ordered private static int-array fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretSpec {
    pub class: String,
    pub fields: Vec<String>,
}

/// A symbol in a named module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolRef {
    pub module: String,
    pub symbol: String,
}

/// How to pull a string argument out of a native call: argument indices plus
/// the runtime-internal extraction primitive to resolve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StringArgSpec {
    #[serde(default)]
    pub env_index: usize,
    pub index: usize,
    pub reader: SymbolRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeHookSpec {
    pub export: String,
    #[serde(default)]
    pub string_arg: Option<StringArgSpec>,
    #[serde(default)]
    pub force_return: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeSpec {
    pub module: String,
    #[serde(default)]
    pub hooks: Vec<NativeHookSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSpec {
    pub module: String,
    pub pattern: String,
    pub delay_ms: u64,
    pub window: usize,
    pub end_export: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetProfile {
    pub name: String,
    #[serde(default)]
    pub bypasses: Vec<BypassSpec>,
    #[serde(default)]
    pub taps: Vec<TapSpec>,
    #[serde(default)]
    pub click: Option<TapSpec>,
    pub secret: SecretSpec,
    pub native: NativeSpec,
    pub scan: ScanSpec,
}

impl TargetProfile {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidProfile("target name is empty".to_string()));
        }
        for hook in &self.bypasses {
            if hook.class.trim().is_empty() || hook.method.trim().is_empty() {
                return Err(Error::InvalidProfile(
                    "bypass entry with blank class or method".to_string(),
                ));
            }
        }
        if self.secret.fields.is_empty() {
            return Err(Error::InvalidProfile("secret field list is empty".to_string()));
        }
        for hook in &self.native.hooks {
            if hook.export.trim().is_empty() {
                return Err(Error::InvalidProfile(
                    "native hook with blank export name".to_string(),
                ));
            }
        }
        parse_pattern(&self.scan.pattern)?;
        if self.scan.window == 0 {
            return Err(Error::InvalidProfile("scan window is zero".to_string()));
        }
        if self.scan.end_export.trim().is_empty() {
            return Err(Error::InvalidProfile("scan end export is blank".to_string()));
        }
        Ok(())
    }
}

pub fn load_profile<P: AsRef<Path>>(path: P) -> Result<TargetProfile> {
    let content = fs::read_to_string(&path)?;
    let profile: TargetProfile = serde_json::from_str(&content)?;
    profile.validate()?;
    Ok(profile)
}

pub fn save_profile<P: AsRef<Path>>(path: P, profile: &TargetProfile) -> Result<()> {
    let content = serde_json::to_string_pretty(profile)?;
    fs::write(path, content)?;
    Ok(())
}

/// Profile for the `com.ctf.secureapp` practice target.
pub fn builtin_profile() -> TargetProfile {
    let activity = "com.ctf.secureapp.MainActivity";
    let hidden = "com.ctf.secureapp.HiddenCheck";
    let native_lib = "libnative-lib.so";
    let verify_export = "Java_com_ctf_secureapp_MainActivity_verifyFlag";

    TargetProfile {
        name: "com.ctf.secureapp".to_string(),
        bypasses: vec![
            BypassSpec {
                class: "android.os.Debug".to_string(),
                method: "isDebuggerConnected".to_string(),
                returns: false,
            },
            BypassSpec {
                class: "android.os.Debug".to_string(),
                method: "waitingForDebugger".to_string(),
                returns: false,
            },
            BypassSpec {
                class: activity.to_string(),
                method: "isRooted".to_string(),
                returns: false,
            },
            BypassSpec {
                class: activity.to_string(),
                method: "verifyCertificate".to_string(),
                returns: true,
            },
        ],
        taps: vec![
            TapSpec {
                class: activity.to_string(),
                method: "verifyFlagMultiLayer".to_string(),
            },
            TapSpec {
                class: activity.to_string(),
                method: "verifyFlag".to_string(),
            },
            TapSpec {
                class: hidden.to_string(),
                method: "verify".to_string(),
            },
        ],
        click: Some(TapSpec {
            class: "android.view.View".to_string(),
            method: "setOnClickListener".to_string(),
        }),
        secret: SecretSpec {
            class: hidden.to_string(),
            fields: vec![
                "PART1".to_string(),
                "PART2".to_string(),
                "PART3".to_string(),
                "PART4".to_string(),
                "PART5".to_string(),
                "PART6".to_string(),
            ],
        },
        native: NativeSpec {
            module: native_lib.to_string(),
            hooks: vec![
                NativeHookSpec {
                    export: "_Z16anti_debug_checkv".to_string(),
                    string_arg: None,
                    force_return: Some(0),
                },
                NativeHookSpec {
                    export: verify_export.to_string(),
                    string_arg: Some(StringArgSpec {
                        env_index: 0,
                        index: 2,
                        reader: SymbolRef {
                            module: "libart.so".to_string(),
                            symbol: "_ZN3art3JNI13GetStringUTFCharsEP7_JNIEnvP8_jstringPh"
                                .to_string(),
                        },
                    }),
                    force_return: None,
                },
            ],
        },
        scan: ScanSpec {
            module: native_lib.to_string(),
            // "APIIT{"
            pattern: "41 50 49 49 54 7B".to_string(),
            delay_ms: 2000,
            window: 50,
            end_export: verify_export.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profile_is_valid() {
        let profile = builtin_profile();
        assert!(profile.validate().is_ok());
        assert_eq!(profile.secret.fields.len(), 6);
        assert_eq!(profile.native.hooks.len(), 2);
        assert_eq!(profile.scan.delay_ms, 2000);
    }

    #[test]
    fn test_validate_rejects_bad_pattern() {
        let mut profile = builtin_profile();
        profile.scan.pattern = "not hex".to_string();
        assert!(matches!(profile.validate(), Err(Error::InvalidPattern(_))));
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut profile = builtin_profile();
        profile.scan.window = 0;
        assert!(matches!(profile.validate(), Err(Error::InvalidProfile(_))));
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        let mut profile = builtin_profile();
        profile.secret.fields.clear();
        assert!(matches!(profile.validate(), Err(Error::InvalidProfile(_))));
    }

    #[test]
    fn test_profile_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");

        let profile = builtin_profile();
        save_profile(&path, &profile).unwrap();
        let loaded = load_profile(&path).unwrap();

        assert_eq!(loaded.name, profile.name);
        assert_eq!(loaded.bypasses.len(), profile.bypasses.len());
        assert_eq!(loaded.scan.pattern, profile.scan.pattern);
        assert_eq!(
            loaded.native.hooks[0].force_return,
            profile.native.hooks[0].force_return
        );
    }

    #[test]
    fn test_profile_optional_fields_default() {
        let json = r#"{
            "name": "com.example.app",
            "secret": { "class": "com.example.Hidden", "fields": ["A"] },
            "native": { "module": "libapp.so" },
            "scan": {
                "module": "libapp.so",
                "pattern": "DE AD",
                "delay_ms": 100,
                "window": 16,
                "end_export": "app_main"
            }
        }"#;
        let profile: TargetProfile = serde_json::from_str(json).unwrap();
        assert!(profile.bypasses.is_empty());
        assert!(profile.taps.is_empty());
        assert!(profile.click.is_none());
        assert!(profile.native.hooks.is_empty());
        assert!(profile.validate().is_ok());
    }
}
