//! Dongle host driver core.
//!
//! This module holds the host side of a dongle-based wireless adapter: the
//! named-variable (iovar) command path, firmware event validation and
//! routing, the multi-precedence transmit queue and the incremental scan
//! result cache. Bus framing lives behind the [`Transport`] trait.
//!
//! # Commands
//!
//! A [`Dispatcher`] offers each named request to an ordered chain of
//! [`IovarHandler`] layers. The generic table ([`CoreIovars`]) always comes
//! first; [`FirmwareIovars`] forwards whatever is left to the firmware.
//!
//! ```ignore
//! use std::sync::Arc;
//! use dhd::dongle::{Dispatcher, DriverConfig, DriverContext, FirmwareIovars, RecordingTransport};
//!
//! let ctx = Arc::new(DriverContext::new(DriverConfig::default()));
//! let transport = Arc::new(RecordingTransport::new());
//! let dhd = Dispatcher::new(ctx.clone()).with_layer(FirmwareIovars::new(transport));
//!
//! let mut out = [0u8; 4];
//! dhd.get("wdtick", &[], &mut out)?;
//! ```
//!
//! # Events
//!
//! ```ignore
//! use std::sync::Arc;
//! use dhd::dongle::{EventRouter, InterfaceTable, stream};
//! use tokio_stream::StreamExt;
//!
//! let (sink, mut events) = stream::channel();
//! let router = EventRouter::new(ctx, sink, Arc::new(InterfaceTable::new("wl0")));
//! router.route(&frame, 0)?;
//!
//! while let Some(ev) = events.next().await {
//!     println!("{} on if{}", ev.event.event_type, ev.ifidx);
//! }
//! ```
//!
//! # Scanning
//!
//! ```ignore
//! use std::sync::Arc;
//! use dhd::dongle::{Iscan, ScanCache, ScanStatus};
//!
//! let cache = Arc::new(ScanCache::new(config.iscan_max_nodes));
//! let iscan = Iscan::new(transport, cache.clone());
//! iscan.start()?;
//! while iscan.get_partial_result()? == ScanStatus::Partial {}
//! for bss in cache.bss_list() {
//!     println!("{} {}", bss.ssid, bss.rssi);
//! }
//! ```

pub mod bss;
pub mod config;
pub mod context;
pub mod control;
pub mod core_iovars;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod iovar;
pub mod iscan;
pub mod msglevel;
pub mod parse;
pub mod pktq;
pub mod preinit;
pub mod record;
pub mod router;
pub mod show;
pub mod stream;
pub mod transport;
pub mod wlc;

pub use bss::{BssBuilder, BssRecord, ScanStatus};
pub use config::{ArpOffload, DriverConfig, PowerMode};
pub use context::{DriverContext, DriverState};
pub use control::{CdcHeader, ControlChannel};
pub use core_iovars::CoreIovars;
pub use dispatch::{Dispatcher, FirmwareIovars, IovarHandler, IovarRequest};
pub use error::{Error, Result};
pub use event::{EventBuilder, EventFrame, EventMask, EventStatus, EventType, IfAction, IfEvent, WlEvent};
pub use iovar::{Action, IoVar, IoVarKind, Registry};
pub use iscan::{Iscan, NodeId, ScanCache, ScanEntry, ScanNotifier};
pub use msglevel::MsgLevel;
pub use parse::FromDongle;
pub use pktq::{DiscardPolicy, Enqueue, PktQ};
pub use preinit::{PktFilter, PreinitReport, preinit};
pub use record::{RecordIter, RecordLayout};
pub use router::{EventRouter, EventSink, InterfaceOps, InterfaceTable, RoutedEvent};
pub use stream::{ChannelSink, DeliveredEvent, EventStream};
pub use transport::{RecordingTransport, Transport, TransportExt};
