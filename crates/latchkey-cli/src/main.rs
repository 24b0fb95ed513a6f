use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use latchkey_core::{TargetProfile, builtin_profile, load_profile};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::commands::run::RunTarget;

mod commands;

#[derive(Parser)]
#[command(name = "latchkey")]
#[command(about = "Runtime bypass toolkit for hardened Android targets", version)]
struct Args {
    /// Target profile (JSON); defaults to the built-in profile
    #[arg(short, long, global = true)]
    profile: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Attach to the target app and drive the bypass agent
    Run {
        /// Package name of the target application
        package: String,

        /// Attach to an already-running process id
        #[arg(long, conflicts_with = "spawn")]
        pid: Option<u32>,

        /// Spawn the package instead of attaching
        #[arg(long)]
        spawn: bool,

        /// Prefer a USB device
        #[arg(long)]
        usb: bool,

        /// Connect to a remote server (host:port)
        #[arg(long)]
        remote: Option<String>,
    },

    /// Emit the rendered agent script
    Agent {
        /// Write the script here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the active profile, or strictly validate one
    Profile {
        /// Load and validate the profile, failing loudly on problems
        #[arg(long)]
        check: bool,
    },

    /// Exercise every stage against the built-in stand-in target
    Selftest,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("latchkey=info".parse()?)
                .add_directive("latchkey_core=info".parse()?),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Run {
            package,
            pid,
            spawn,
            usb,
            remote,
        } => {
            let profile = resolve_profile(args.profile.as_deref());
            commands::run::run(
                &profile,
                &RunTarget {
                    package,
                    pid,
                    spawn,
                    usb,
                    remote,
                },
            )
        }
        Command::Agent { output } => {
            let profile = resolve_profile(args.profile.as_deref());
            commands::agent::run(&profile, output.as_deref())
        }
        Command::Profile { check } => commands::profile::run(args.profile.as_deref(), check),
        Command::Selftest => commands::selftest::run(),
    }
}

fn resolve_profile(path: Option<&Path>) -> TargetProfile {
    match path {
        Some(path) => match load_profile(path) {
            Ok(profile) => {
                info!("loaded profile {} from {}", profile.name, path.display());
                profile
            }
            Err(e) => {
                warn!("failed to load profile: {}, using built-in", e);
                builtin_profile()
            }
        },
        None => builtin_profile(),
    }
}
