//! dhdctl event command implementation.
//!
//! Frames are routed through an [`EventRouter`] exactly as the driver
//! would, and whatever reaches the sink is printed.

use std::io::BufRead;
use std::sync::Arc;

use clap::{Args, Subcommand};
use dhd::dongle::show::describe;
use dhd::dongle::{
    DriverConfig, DriverContext, EventFrame, EventRouter, InterfaceTable, stream,
};
use tokio_stream::StreamExt;

use super::parse_hex;

#[derive(Args)]
pub struct EventCmd {
    #[command(subcommand)]
    action: EventAction,
}

#[derive(Subcommand)]
enum EventAction {
    /// Decode hex-encoded frames (one per argument, or one per stdin line).
    Decode {
        /// Frames as hex. Read from stdin when none are given.
        frames: Vec<String>,

        /// Primary interface name.
        #[arg(long, default_value = "wl0")]
        primary: String,

        /// Deliver NDIS_LINK unchanged instead of as LINK.
        #[arg(long)]
        no_link_alias: bool,
    },
}

impl EventCmd {
    pub async fn run(&self, json: bool) -> anyhow::Result<()> {
        let EventAction::Decode {
            frames,
            primary,
            no_link_alias,
        } = &self.action;

        let frames = if frames.is_empty() {
            std::io::stdin()
                .lock()
                .lines()
                .collect::<std::io::Result<Vec<_>>>()?
                .into_iter()
                .filter(|l| !l.trim().is_empty())
                .collect()
        } else {
            frames.clone()
        };

        let config = DriverConfig::new().legacy_link_alias(!no_link_alias);
        let ctx = Arc::new(DriverContext::new(config));
        let (sink, mut events) = stream::channel();
        let router = EventRouter::new(ctx, sink, Arc::new(InterfaceTable::new(primary)));

        let mut rejected = 0;
        for (i, hex) in frames.iter().enumerate() {
            let frame = parse_hex(hex)?;
            if let Err(e) = router.route(&frame, 0) {
                rejected += 1;
                if json {
                    let out = serde_json::json!({ "frame": i, "error": e.to_string() });
                    println!("{out}");
                } else {
                    println!("frame {i}: rejected: {e}");
                }
            }
        }
        drop(router);

        while let Some(ev) = events.next().await {
            let data = EventFrame::parse(&ev.frame).map(|f| f.data).unwrap_or_default();
            let summary = describe(&ev.event, data);
            if json {
                let out = serde_json::json!({
                    "ifidx": ev.ifidx,
                    "event": ev.event.event_type.name(),
                    "code": ev.event.event_type.code(),
                    "status": ev.event.status.code(),
                    "reason": ev.event.reason,
                    "ifname": ev.event.ifname,
                    "datalen": ev.event.datalen,
                    "summary": summary,
                });
                println!("{out}");
            } else {
                println!(
                    "if{} {} ({}) status {} reason {} ifname {:?}",
                    ev.ifidx,
                    ev.event.event_type,
                    ev.event.event_type.code(),
                    ev.event.status.code(),
                    ev.event.reason,
                    ev.event.ifname
                );
                if let Some(line) = summary {
                    println!("  {line}");
                }
            }
        }

        if rejected > 0 {
            anyhow::bail!("{rejected} frame(s) rejected");
        }
        Ok(())
    }
}
