//! Host-side core of a dongle wireless driver.
//!
//! The radio runs its own firmware; the host talks to it through typed
//! named variables (iovars), receives asynchronous event frames, queues
//! transmit packets by precedence and assembles scan results that arrive in
//! pieces. This crate implements those pieces independent of any bus.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use dhd::dongle::{Dispatcher, DriverConfig, DriverContext};
//!
//! let ctx = Arc::new(DriverContext::new(DriverConfig::from_file("dhd.json")?));
//! let dhd = Dispatcher::new(ctx.clone());
//!
//! ctx.set_up(true);
//! dhd.set("wdtick", &5u32.to_le_bytes())?;
//!
//! let mut out = [0u8; 4];
//! dhd.get("wdtick", &[], &mut out)?;
//! assert_eq!(u32::from_le_bytes(out), 5);
//! ```
//!
//! # Event Monitoring
//!
//! ```ignore
//! use dhd::dongle::{EventRouter, InterfaceTable, stream};
//! use tokio_stream::StreamExt;
//!
//! let (sink, mut events) = stream::channel();
//! let router = EventRouter::new(ctx, sink, InterfaceTable::new("wl0"));
//!
//! // frames from the bus
//! router.route(&frame, 0)?;
//!
//! while let Some(ev) = events.next().await {
//!     println!("{}: {}", ev.ifidx, ev.event.event_type);
//! }
//! ```

pub mod dongle;
pub mod util;

pub use dongle::{DriverContext, Error, Result};
