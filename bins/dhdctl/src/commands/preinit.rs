//! dhdctl preinit command implementation.
//!
//! Runs the pre-initialization sequence against a recording transport and
//! prints every command it would send.

use std::path::PathBuf;

use clap::Args;
use dhd::dongle::error::bcme;
use dhd::dongle::transport::Command;
use dhd::dongle::{EventMask, RecordingTransport, preinit};

use super::load_config;

#[derive(Args)]
pub struct PreinitCmd {
    /// Configuration file (defaults when omitted).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Firmware version string to report for "ver".
    #[arg(long, default_value = "wl0: dry run")]
    fw_version: String,

    /// Make writes of this variable fail, to preview the error path.
    #[arg(long = "fail", value_name = "NAME")]
    fail: Vec<String>,
}

fn describe(cmd: &Command) -> String {
    let dir = if cmd.set { "set" } else { "get" };
    let value: String = cmd.var_value().iter().map(|b| format!("{b:02x}")).collect();
    match cmd.var_name() {
        Some(name) => format!("{dir} {name} {value}"),
        None => format!("ioctl {} {value}", cmd.cmd),
    }
}

impl PreinitCmd {
    pub fn run(&self, json: bool) -> anyhow::Result<()> {
        let config = load_config(self.config.as_deref())?;

        let t = RecordingTransport::new();
        let mut ver = self.fw_version.clone().into_bytes();
        ver.push(0);
        t.reply("ver", ver);
        for name in &self.fail {
            t.fail(name, bcme::UNSUPPORTED);
        }

        let report = preinit(&t, &config, &EventMask::default());
        let commands: Vec<String> = t.commands().iter().map(describe).collect();

        if json {
            let out = serde_json::json!({
                "fw_version": report.fw_version,
                "commands": commands,
                "steps": report.steps.iter().map(|s| serde_json::json!({
                    "name": s.name,
                    "error": s.outcome.as_ref().err().map(ToString::to_string),
                })).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
            return Ok(());
        }

        if let Some(v) = &report.fw_version {
            println!("firmware: {v}");
        }
        for line in &commands {
            println!("  {line}");
        }
        for step in report.failures() {
            if let Err(e) = &step.outcome {
                println!("failed: {}: {e}", step.name);
            }
        }
        Ok(())
    }
}
