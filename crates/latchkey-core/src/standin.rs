//! A controlled stand-in target implementing every host capability in-process.
//!
//! Used by the CLI selftest and by tests to exercise the bypass stages without
//! an attached process: installed replacements and taps change what
//! `invoke_vm` / `invoke_native` return, the same contract a live host
//! provides.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::extract::decode_char_codes;
use crate::host::{
    MethodTap, NativeCall, NativeRuntime, NativeTap, ReplacementFn, RetVal, StringReaderFn,
    VmRuntime, VmValue,
};
use crate::memory::{ImageReader, ReadMemory};
use crate::profile::SymbolRef;

type MethodKey = (String, String);
type MethodFn = Arc<dyn Fn(&[VmValue]) -> VmValue + Send + Sync>;
type NativeFn = Arc<dyn Fn(&[u64]) -> u64 + Send + Sync>;

struct StandInModule {
    name: String,
    image: ImageReader,
    exports: HashMap<String, u64>,
}

#[derive(Default)]
pub struct StandInTarget {
    methods: HashMap<MethodKey, MethodFn>,
    fields: HashMap<MethodKey, Option<Vec<i32>>>,
    modules: Vec<StandInModule>,
    native_impls: HashMap<String, NativeFn>,
    jstrings: HashMap<u64, String>,
    string_readers: HashSet<(String, String)>,
    replacements: Mutex<HashMap<MethodKey, ReplacementFn>>,
    taps: Mutex<HashMap<MethodKey, MethodTap>>,
    native_taps: Mutex<HashMap<String, Vec<NativeTap>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl StandInTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method<F>(mut self, class: &str, method: &str, body: F) -> Self
    where
        F: Fn(&[VmValue]) -> VmValue + Send + Sync + 'static,
    {
        self.methods
            .insert((class.to_string(), method.to_string()), Arc::new(body));
        self
    }

    pub fn with_static_int_arrays(
        mut self,
        class: &str,
        fields: &[(&str, Option<Vec<i32>>)],
    ) -> Self {
        for (name, value) in fields {
            self.fields
                .insert((class.to_string(), name.to_string()), value.clone());
        }
        self
    }

    pub fn with_module(mut self, name: &str, base: u64, image: Vec<u8>) -> Self {
        self.modules.push(StandInModule {
            name: name.to_string(),
            image: ImageReader::new(base, image),
            exports: HashMap::new(),
        });
        self
    }

    pub fn with_export(mut self, module: &str, symbol: &str, address: u64) -> Self {
        if let Some(entry) = self.modules.iter_mut().find(|m| m.name == module) {
            entry.exports.insert(symbol.to_string(), address);
        }
        self
    }

    pub fn with_native_impl<F>(mut self, export: &str, body: F) -> Self
    where
        F: Fn(&[u64]) -> u64 + Send + Sync + 'static,
    {
        self.native_impls.insert(export.to_string(), Arc::new(body));
        self
    }

    pub fn with_jstring(mut self, handle: u64, text: &str) -> Self {
        self.jstrings.insert(handle, text.to_string());
        self
    }

    pub fn with_string_reader(mut self, module: &str, symbol: &str) -> Self {
        self.string_readers
            .insert((module.to_string(), symbol.to_string()));
        self
    }

    fn class_known(&self, class: &str) -> bool {
        self.methods.keys().any(|(c, _)| c == class) || self.fields.keys().any(|(c, _)| c == class)
    }

    fn find_module(&self, name: &str) -> Result<&StandInModule> {
        self.modules
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| Error::ModuleNotFound(name.to_string()))
    }

    fn resolve_method(&self, class: &str, method: &str) -> Result<MethodFn> {
        match self.methods.get(&(class.to_string(), method.to_string())) {
            Some(body) => Ok(Arc::clone(body)),
            None if self.class_known(class) => Err(Error::MethodNotFound {
                class: class.to_string(),
                method: method.to_string(),
            }),
            None => Err(Error::ClassNotFound(class.to_string())),
        }
    }

    /// Call a managed method the way the target app would, dispatching through
    /// any installed replacement or tap.
    pub fn invoke_vm(&self, class: &str, method: &str, args: &[VmValue]) -> Result<VmValue> {
        let key = (class.to_string(), method.to_string());

        let replacement = lock(&self.replacements).get(&key).cloned();
        if let Some(body) = replacement {
            return Ok(body(args));
        }

        let original = self.resolve_method(class, method)?;
        let tap = lock(&self.taps).get(&key).cloned();
        match tap {
            Some(tap) => {
                (tap.on_enter)(args);
                let result = original(args);
                (tap.on_leave)(&result);
                Ok(result)
            }
            None => Ok(original(args)),
        }
    }

    /// Call a native export, running entry/exit observers around the original
    /// implementation and returning the (possibly replaced) value.
    pub fn invoke_native(&self, export: &str, args: &[u64]) -> Result<u64> {
        let original = self
            .native_impls
            .get(export)
            .cloned()
            .ok_or_else(|| Error::ExportNotFound {
                module: "?".to_string(),
                symbol: export.to_string(),
            })?;

        let taps: Vec<NativeTap> = lock(&self.native_taps)
            .get(export)
            .cloned()
            .unwrap_or_default();

        let call = NativeCall::new(args.to_vec());
        for tap in &taps {
            if let Some(on_enter) = &tap.on_enter {
                on_enter(&call);
            }
        }

        let mut ret = RetVal::new(original(args));
        for tap in &taps {
            if let Some(on_leave) = &tap.on_leave {
                on_leave(&mut ret);
            }
        }
        Ok(ret.get())
    }
}

impl VmRuntime for StandInTarget {
    fn replace_method(&self, class: &str, method: &str, replacement: ReplacementFn) -> Result<()> {
        self.resolve_method(class, method)?;
        lock(&self.replacements).insert((class.to_string(), method.to_string()), replacement);
        Ok(())
    }

    fn tap_method(&self, class: &str, method: &str, tap: MethodTap) -> Result<()> {
        self.resolve_method(class, method)?;
        lock(&self.taps).insert((class.to_string(), method.to_string()), tap);
        Ok(())
    }

    fn read_static_int_array(&self, class: &str, field: &str) -> Result<Vec<i32>> {
        match self.fields.get(&(class.to_string(), field.to_string())) {
            Some(Some(values)) => Ok(values.clone()),
            Some(None) => Err(Error::NullField {
                class: class.to_string(),
                field: field.to_string(),
            }),
            None if self.class_known(class) => Err(Error::FieldNotFound {
                class: class.to_string(),
                field: field.to_string(),
            }),
            None => Err(Error::ClassNotFound(class.to_string())),
        }
    }
}

impl ReadMemory for StandInTarget {
    fn read_bytes(&self, address: u64, len: usize) -> Result<Vec<u8>> {
        for module in &self.modules {
            if module.image.contains(address) {
                return module.image.read_bytes(address, len);
            }
        }
        Err(Error::MemoryReadFailed {
            address,
            message: "address not mapped".to_string(),
        })
    }
}

impl NativeRuntime for StandInTarget {
    fn module_base(&self, module: &str) -> Result<u64> {
        Ok(self.find_module(module)?.image.base())
    }

    fn export_address(&self, module: &str, symbol: &str) -> Result<u64> {
        let entry = self.find_module(module)?;
        entry
            .exports
            .get(symbol)
            .copied()
            .ok_or_else(|| Error::ExportNotFound {
                module: module.to_string(),
                symbol: symbol.to_string(),
            })
    }

    fn attach(&self, module: &str, symbol: &str, tap: NativeTap) -> Result<()> {
        self.export_address(module, symbol)?;
        lock(&self.native_taps)
            .entry(symbol.to_string())
            .or_default()
            .push(tap);
        Ok(())
    }

    fn resolve_string_reader(&self, reader: &SymbolRef) -> Result<StringReaderFn> {
        if !self
            .string_readers
            .contains(&(reader.module.clone(), reader.symbol.clone()))
        {
            return Err(Error::ExportNotFound {
                module: reader.module.clone(),
                symbol: reader.symbol.clone(),
            });
        }
        let strings = self.jstrings.clone();
        Ok(Arc::new(move |_env, handle| {
            strings
                .get(&handle)
                .cloned()
                .ok_or_else(|| Error::MemoryReadFailed {
                    address: handle,
                    message: "no string at handle".to_string(),
                })
        }))
    }
}

// Fixture data mirroring the com.ctf.secureapp practice target.

const ACTIVITY: &str = "com.ctf.secureapp.MainActivity";
const HIDDEN: &str = "com.ctf.secureapp.HiddenCheck";
const NATIVE_LIB: &str = "libnative-lib.so";
const PROBE_EXPORT: &str = "_Z16anti_debug_checkv";
const VERIFY_EXPORT: &str = "Java_com_ctf_secureapp_MainActivity_verifyFlag";
const STRING_READER: &str = "_ZN3art3JNI13GetStringUTFCharsEP7_JNIEnvP8_jstringPh";

const MODULE_BASE: u64 = 0x7400_0000;
const MODULE_SIZE: usize = 0x2000;
const FLAG_OFFSET: usize = 0x800;
const PROBE_OFFSET: u64 = 0x100;
const VERIFY_OFFSET: u64 = 0x1800;
const FLAG_JSTRING: u64 = 0x4A00;

const PART1: &[i32] = &[65, 80, 73, 73, 84, 123];
const PART2: &[i32] = &[78, 52, 116, 49, 118, 51];
const PART3: &[i32] = &[95, 52, 110, 100];
const PART4: &[i32] = &[95, 74, 52, 118, 52];
const PART5: &[i32] = &[95, 79, 98, 102, 117, 115, 99, 52, 116, 49, 111, 110];
const PART6: &[i32] = &[95, 77, 52, 115, 116, 51, 114, 125];

fn fixture_flag() -> String {
    let codes: Vec<i32> = [PART1, PART2, PART3, PART4, PART5, PART6].concat();
    decode_char_codes(&codes)
}

fn flag_check(flag: String) -> impl Fn(&[VmValue]) -> VmValue + Send + Sync {
    move |args| match args.first() {
        Some(VmValue::Str(input)) => VmValue::Bool(*input == flag),
        _ => VmValue::Bool(false),
    }
}

impl StandInTarget {
    /// Stand-in for the hardened practice app: checks report debugger and root
    /// present, the signature check fails, the secret fragments are populated,
    /// and the native module's image contains the secret between its base and
    /// the verify export.
    pub fn secureapp() -> Self {
        let flag = fixture_flag();

        let mut image = vec![0u8; MODULE_SIZE];
        image[FLAG_OFFSET..FLAG_OFFSET + flag.len()].copy_from_slice(flag.as_bytes());

        Self::new()
            .with_method("android.os.Debug", "isDebuggerConnected", |_| {
                VmValue::Bool(true)
            })
            .with_method("android.os.Debug", "waitingForDebugger", |_| {
                VmValue::Bool(true)
            })
            .with_method(ACTIVITY, "isRooted", |_| VmValue::Bool(true))
            .with_method(ACTIVITY, "verifyCertificate", |_| VmValue::Bool(false))
            .with_method(ACTIVITY, "verifyFlagMultiLayer", flag_check(flag.clone()))
            .with_method(ACTIVITY, "verifyFlag", flag_check(flag.clone()))
            .with_method(HIDDEN, "verify", flag_check(flag.clone()))
            .with_method("android.view.View", "setOnClickListener", |_| VmValue::Null)
            .with_static_int_arrays(
                HIDDEN,
                &[
                    ("PART1", Some(PART1.to_vec())),
                    ("PART2", Some(PART2.to_vec())),
                    ("PART3", Some(PART3.to_vec())),
                    ("PART4", Some(PART4.to_vec())),
                    ("PART5", Some(PART5.to_vec())),
                    ("PART6", Some(PART6.to_vec())),
                ],
            )
            .with_module(NATIVE_LIB, MODULE_BASE, image)
            .with_export(NATIVE_LIB, PROBE_EXPORT, MODULE_BASE + PROBE_OFFSET)
            .with_export(NATIVE_LIB, VERIFY_EXPORT, MODULE_BASE + VERIFY_OFFSET)
            .with_native_impl(PROBE_EXPORT, |_| 1)
            .with_native_impl(VERIFY_EXPORT, |_| 0)
            .with_jstring(FLAG_JSTRING, &flag)
            .with_string_reader("libart.so", STRING_READER)
    }

    /// The secret the secureapp fixture hides.
    pub fn flag(&self) -> String {
        fixture_flag()
    }

    /// Handle of the jstring the fixture's string table serves.
    pub fn flag_jstring(&self) -> u64 {
        FLAG_JSTRING
    }
}
