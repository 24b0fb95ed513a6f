//! Secret-fragment extraction: read the obfuscated int-array fields and
//! reassemble them in field order.

use tracing::debug;

use crate::error::Result;
use crate::host::VmRuntime;
use crate::profile::SecretSpec;

/// Decode an int array whose elements are character codes.
///
/// Out-of-range elements decode to U+FFFD rather than dropping silently.
pub fn decode_char_codes(codes: &[i32]) -> String {
    codes
        .iter()
        .map(|&code| {
            u32::try_from(code)
                .ok()
                .and_then(char::from_u32)
                .unwrap_or(char::REPLACEMENT_CHARACTER)
        })
        .collect()
}

/// Read every secret field in profile order and concatenate the decoded parts.
///
/// Fields are assumed static and populated at call time; any missing or null
/// field fails the whole extraction.
pub fn read_secret<V: VmRuntime + ?Sized>(vm: &V, spec: &SecretSpec) -> Result<String> {
    let mut secret = String::new();
    for field in &spec.fields {
        let codes = vm.read_static_int_array(&spec.class, field)?;
        debug!("{}.{}: {} code points", spec.class, field, codes.len());
        secret.push_str(&decode_char_codes(&codes));
    }
    Ok(secret)
}
