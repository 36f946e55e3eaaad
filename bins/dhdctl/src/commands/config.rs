//! dhdctl config command implementation.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use dhd::dongle::PktFilter;

use super::load_config;

#[derive(Args)]
pub struct ConfigCmd {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as JSON.
    Show {
        /// Configuration file (defaults when omitted).
        file: Option<PathBuf>,
    },
    /// Validate a configuration file.
    Check {
        file: PathBuf,
    },
}

impl ConfigCmd {
    pub fn run(&self, json: bool) -> anyhow::Result<()> {
        match &self.action {
            ConfigAction::Show { file } => {
                let config = load_config(file.as_deref())?;
                println!("{}", config.to_json()?);
                Ok(())
            }
            ConfigAction::Check { file } => {
                let config = load_config(Some(file.as_path()))?;
                let mut problems = Vec::new();
                if config.ioctl_timeout_ms == 0 {
                    problems.push("ioctl_timeout_ms must be greater than zero".to_string());
                }
                if config.iscan_max_nodes == 0 {
                    problems.push("iscan_max_nodes must be greater than zero".to_string());
                }
                for spec in &config.pkt_filters {
                    if let Err(e) = spec.parse::<PktFilter>() {
                        problems.push(e.to_string());
                    }
                }
                if let Some(cc) = &config.country_code {
                    if cc.is_empty() || cc.len() > 3 {
                        problems.push(format!("country code \"{cc}\""));
                    }
                }

                if json {
                    let out = serde_json::json!({
                        "file": file.display().to_string(),
                        "ok": problems.is_empty(),
                        "problems": problems,
                    });
                    println!("{}", serde_json::to_string_pretty(&out)?);
                } else {
                    for p in &problems {
                        println!("{}: {p}", file.display());
                    }
                }
                if !problems.is_empty() {
                    anyhow::bail!("{}: {} problem(s)", file.display(), problems.len());
                }
                if !json {
                    println!("{}: ok", file.display());
                }
                Ok(())
            }
        }
    }
}
