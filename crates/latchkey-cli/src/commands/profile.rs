//! Print or validate the active target profile.

use std::path::Path;

use anyhow::{Context, Result, bail};
use latchkey_core::{builtin_profile, load_profile};

pub fn run(path: Option<&Path>, check: bool) -> Result<()> {
    if check {
        let Some(path) = path else {
            bail!("--check needs a profile path (-p/--profile)");
        };
        let profile =
            load_profile(path).with_context(|| format!("load profile {}", path.display()))?;
        println!(
            "profile OK: {} ({} bypasses, {} taps, {} native hooks, {} secret fields)",
            profile.name,
            profile.bypasses.len(),
            profile.taps.len(),
            profile.native.hooks.len(),
            profile.secret.fields.len(),
        );
        return Ok(());
    }

    let profile = match path {
        Some(path) => {
            load_profile(path).with_context(|| format!("load profile {}", path.display()))?
        }
        None => builtin_profile(),
    };
    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(())
}
