//! Emit the rendered agent script for use with a standalone host CLI.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use latchkey_core::{TargetProfile, render_agent};
use tracing::info;

pub fn run(profile: &TargetProfile, output: Option<&Path>) -> Result<()> {
    let source = render_agent(profile).context("render agent script")?;
    match output {
        Some(path) => {
            fs::write(path, &source)
                .with_context(|| format!("write agent script to {}", path.display()))?;
            info!("agent script written to {}", path.display());
        }
        None => print!("{source}"),
    }
    Ok(())
}
