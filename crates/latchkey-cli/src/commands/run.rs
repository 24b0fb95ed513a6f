//! Attach to the target and drive the bypass agent through the
//! instrumentation host.

use anyhow::Result;
use latchkey_core::TargetProfile;

pub struct RunTarget {
    pub package: String,
    pub pid: Option<u32>,
    pub spawn: bool,
    pub usb: bool,
    pub remote: Option<String>,
}

pub fn run(profile: &TargetProfile, target: &RunTarget) -> Result<()> {
    #[cfg(feature = "frida")]
    {
        inner::run(profile, target)
    }

    #[cfg(not(feature = "frida"))]
    {
        let _ = (profile, target);
        anyhow::bail!(
            "attach support is disabled. Rebuild latchkey with `--features frida` to drive \
             a live target, or use `latchkey agent` to emit the script for a standalone host."
        );
    }
}

#[cfg(feature = "frida")]
mod inner {
    use super::*;
    use std::sync::Arc;
    use std::sync::mpsc::{self, RecvTimeoutError};
    use std::time::Duration;

    use anyhow::{Context, anyhow};
    use frida::{
        Device, DeviceManager, DeviceType, Frida, Message, MessageSend, ScriptHandler,
        ScriptOption, SpawnOptions,
    };
    use serde::Deserialize;
    use tracing::{info, warn};

    use latchkey_core::{ShutdownSignal, decode_char_codes, hexdump, secret_banner, render_agent};

    const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(250);

    pub(super) fn run(profile: &TargetProfile, target: &RunTarget) -> Result<()> {
        let frida = unsafe { Frida::obtain() };
        let manager = DeviceManager::obtain(&frida);
        let device = select_device(&manager, target).context("select device")?;

        let (pid, spawned) = if target.spawn {
            let pid = device
                .spawn(&target.package, &SpawnOptions::default())
                .with_context(|| format!("spawn {}", target.package))?;
            (pid, true)
        } else {
            let pid = target
                .pid
                .ok_or_else(|| anyhow!("--pid is required unless --spawn is set"))?;
            (pid, false)
        };

        let session = device
            .attach(pid)
            .with_context(|| format!("attach to pid {pid}"))?;

        let source = render_agent(profile).context("render agent script")?;
        let mut options = ScriptOption::default();
        let mut script = session
            .create_script(&source, &mut options)
            .context("create agent script")?;

        let (sender, receiver) = mpsc::channel();
        script
            .handle_message(ChannelHandler { sender })
            .context("register message handler")?;
        script.load().context("load agent script")?;
        info!("agent loaded into {} (pid {pid})", target.package);

        let shutdown = Arc::new(ShutdownSignal::new());
        let trigger = Arc::clone(&shutdown);
        ctrlc::set_handler(move || trigger.trigger()).context("install interrupt handler")?;

        let mut resume_pending = spawned;
        while !shutdown.is_shutdown() {
            match receiver.recv_timeout(EVENT_POLL_INTERVAL) {
                Ok(AgentEvent::Ready) => {
                    if resume_pending {
                        device.resume(pid).context("resume spawned process")?;
                        resume_pending = false;
                    }
                    info!("agent active, monitoring target");
                }
                Ok(AgentEvent::Log(message)) => info!("{message}"),
                Ok(AgentEvent::ConsoleLog { level, message }) => info!("[{level}] {message}"),
                Ok(AgentEvent::SecretParts(parts)) => {
                    let secret: String =
                        parts.iter().map(|codes| decode_char_codes(codes)).collect();
                    println!("{}", secret_banner(&secret));
                }
                Ok(AgentEvent::ScanMatch { address, window }) => {
                    info!("pattern hit at {address:#x}");
                    print!("{}", hexdump(address, &window));
                }
                Ok(AgentEvent::ScanComplete) => info!("memory scan complete"),
                Ok(AgentEvent::HookError { stage, message }) => {
                    warn!("{stage} hook error: {message}");
                }
                Ok(AgentEvent::AgentError(message)) => warn!("agent error: {message}"),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        script.unload().ok();
        session.detach().ok();
        Ok(())
    }

    fn select_device<'a>(manager: &'a DeviceManager, target: &RunTarget) -> Result<Device<'a>> {
        if let Some(remote) = target.remote.as_ref() {
            return manager
                .get_remote_device(remote)
                .with_context(|| format!("connect remote device {remote}"));
        }
        if target.usb {
            if let Ok(device) = manager.get_device_by_type(DeviceType::USB) {
                return Ok(device);
            }
        }
        manager.get_local_device().context("obtain local device")
    }

    struct ChannelHandler {
        sender: mpsc::Sender<AgentEvent>,
    }

    impl ScriptHandler for ChannelHandler {
        fn on_message(&mut self, message: &Message, data: Option<Vec<u8>>) {
            let _ = match message {
                Message::Send(payload) => self.handle_send(payload, data),
                Message::Log(log) => self.sender.send(AgentEvent::ConsoleLog {
                    level: format!("{:?}", log.level),
                    message: log.payload.clone(),
                }),
                Message::Error(err) => self
                    .sender
                    .send(AgentEvent::AgentError(err.description.clone())),
                Message::Other(value) => self
                    .sender
                    .send(AgentEvent::AgentError(format!("unexpected message: {value}"))),
            };
        }
    }

    impl ChannelHandler {
        fn handle_send(
            &mut self,
            payload: &MessageSend,
            data: Option<Vec<u8>>,
        ) -> Result<(), mpsc::SendError<AgentEvent>> {
            let json = payload.payload.returns.clone();
            match serde_json::from_value::<AgentPayload>(json) {
                Ok(payload) => self.route(payload, data),
                Err(err) => self
                    .sender
                    .send(AgentEvent::AgentError(format!("malformed agent payload: {err}"))),
            }
        }

        fn route(
            &mut self,
            payload: AgentPayload,
            data: Option<Vec<u8>>,
        ) -> Result<(), mpsc::SendError<AgentEvent>> {
            match payload.event.as_str() {
                "ready" => self.sender.send(AgentEvent::Ready),
                "log" => self
                    .sender
                    .send(AgentEvent::Log(payload.message.unwrap_or_default())),
                "secret-parts" => self
                    .sender
                    .send(AgentEvent::SecretParts(payload.parts.unwrap_or_default())),
                "scan-match" => {
                    let address = payload
                        .address
                        .as_deref()
                        .and_then(|text| parse_pointer(text).ok())
                        .unwrap_or(0);
                    self.sender.send(AgentEvent::ScanMatch {
                        address,
                        window: data.unwrap_or_default(),
                    })
                }
                "scan-complete" => self.sender.send(AgentEvent::ScanComplete),
                "hook-error" => self.sender.send(AgentEvent::HookError {
                    stage: payload.stage.unwrap_or_else(|| "unknown".to_string()),
                    message: payload.message.unwrap_or_default(),
                }),
                other => self
                    .sender
                    .send(AgentEvent::AgentError(format!("unknown agent event: {other}"))),
            }
        }
    }

    fn parse_pointer(text: &str) -> Result<u64> {
        let trimmed = text.trim_start_matches("0x");
        u64::from_str_radix(trimmed, 16).with_context(|| format!("parse pointer {text}"))
    }

    #[derive(Debug, Deserialize)]
    struct AgentPayload {
        event: String,
        message: Option<String>,
        stage: Option<String>,
        parts: Option<Vec<Vec<i32>>>,
        address: Option<String>,
    }

    enum AgentEvent {
        Ready,
        Log(String),
        ConsoleLog { level: String, message: String },
        SecretParts(Vec<Vec<i32>>),
        ScanMatch { address: u64, window: Vec<u8> },
        ScanComplete,
        HookError { stage: String, message: String },
        AgentError(String),
    }
}
