//! Event routing.
//!
//! Every firmware event frame passes through [`EventRouter::route`]. The frame
//! is validated and its header converted to host order once; interface events
//! update the [`InterfaceOps`] table; everything, known or not, is forwarded
//! to the [`EventSink`] with the interface index resolved from the event's
//! interface name.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use dhd::dongle::{DriverContext, EventRouter, InterfaceTable};
//! use dhd::dongle::stream;
//!
//! let (sink, mut events) = stream::channel();
//! let router = EventRouter::new(Arc::new(DriverContext::default()), sink, InterfaceTable::new("wl0"));
//! router.route(&frame, 0)?;
//! ```

use std::borrow::Cow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::bss::{EscanResult, ScanStatus};
use super::context::DriverContext;
use super::error::{Error, Result};
use super::event::{EVENT_TYPE_OFFSET, EventFrame, EventStatus, EventType, IfAction, IfEvent, WlEvent};
use super::iscan::{ScanCache, ScanNotifier};
use super::msglevel::MsgLevel;
use super::parse::FromDongle;
use super::show::{TraceDecoder, describe};
use crate::util::addr::format_mac;
use crate::util::ifname;

/// Number of interface slots; slot 0 is the primary interface.
pub const MAX_IFS: usize = 16;

// ============================================================================
// Collaborators
// ============================================================================

/// Receives every routed event frame.
pub trait EventSink: Send + Sync {
    /// Deliver `frame` (header plus payload) for interface `ifidx`.
    ///
    /// `event` describes `frame` as delivered.
    fn deliver(&self, ifidx: usize, frame: &[u8], event: &WlEvent);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn deliver(&self, ifidx: usize, frame: &[u8], event: &WlEvent) {
        (**self).deliver(ifidx, frame, event)
    }
}

/// Virtual interface management.
pub trait InterfaceOps: Send + Sync {
    /// Bind `name` to slot `ifidx`.
    fn add_if(&self, ifidx: usize, name: &str, mac: [u8; 6], flags: u8, bssidx: u8) -> Result<()>;

    /// Release slot `ifidx`.
    fn del_if(&self, ifidx: usize);

    /// Slot bound to `name`; the primary interface when none is.
    fn ifname_to_idx(&self, name: &str) -> usize;
}

impl<T: InterfaceOps + ?Sized> InterfaceOps for Arc<T> {
    fn add_if(&self, ifidx: usize, name: &str, mac: [u8; 6], flags: u8, bssidx: u8) -> Result<()> {
        (**self).add_if(ifidx, name, mac, flags, bssidx)
    }

    fn del_if(&self, ifidx: usize) {
        (**self).del_if(ifidx)
    }

    fn ifname_to_idx(&self, name: &str) -> usize {
        (**self).ifname_to_idx(name)
    }
}

/// A bound interface slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfEntry {
    pub name: String,
    pub mac: [u8; 6],
    pub flags: u8,
    pub bssidx: u8,
}

/// Fixed table of interface slots.
#[derive(Debug)]
pub struct InterfaceTable {
    slots: Mutex<[Option<IfEntry>; MAX_IFS]>,
}

impl InterfaceTable {
    /// Table with only the primary interface, `primary`.
    pub fn new(primary: &str) -> Self {
        let mut slots: [Option<IfEntry>; MAX_IFS] = Default::default();
        slots[0] = Some(IfEntry {
            name: primary.to_string(),
            mac: [0; 6],
            flags: 0,
            bssidx: 0,
        });
        Self {
            slots: Mutex::new(slots),
        }
    }

    fn lock(&self) -> MutexGuard<'_, [Option<IfEntry>; MAX_IFS]> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Entry in slot `ifidx`.
    pub fn get(&self, ifidx: usize) -> Option<IfEntry> {
        self.lock().get(ifidx).cloned().flatten()
    }

    /// Bound slot indices.
    pub fn bound(&self) -> Vec<usize> {
        self.lock()
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| i))
            .collect()
    }
}

impl InterfaceOps for InterfaceTable {
    fn add_if(&self, ifidx: usize, name: &str, mac: [u8; 6], flags: u8, bssidx: u8) -> Result<()> {
        ifname::validate(name).map_err(|e| Error::BadArg(e.to_string()))?;
        let mut slots = self.lock();
        let slot = slots
            .get_mut(ifidx)
            .ok_or_else(|| Error::BadArg(format!("interface index {ifidx}")))?;
        *slot = Some(IfEntry {
            name: name.to_string(),
            mac,
            flags,
            bssidx,
        });
        tracing::debug!(ifidx, name, mac = %format_mac(&mac), "interface added");
        Ok(())
    }

    fn del_if(&self, ifidx: usize) {
        if ifidx == 0 {
            return;
        }
        if let Some(slot) = self.lock().get_mut(ifidx) {
            if slot.take().is_some() {
                tracing::debug!(ifidx, "interface removed");
            }
        }
    }

    fn ifname_to_idx(&self, name: &str) -> usize {
        if name.is_empty() {
            return 0;
        }
        self.lock()
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, s)| s.as_ref().is_some_and(|e| e.name == name))
            .map_or(0, |(i, _)| i)
    }
}

// ============================================================================
// Router
// ============================================================================

/// What [`EventRouter::route`] did with a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedEvent {
    /// Interface the frame was delivered on.
    pub ifidx: usize,
    /// The event as received.
    pub event: WlEvent,
    /// The frame went out with `NDIS_LINK` rewritten to `LINK`.
    pub aliased: bool,
}

/// Validates, classifies and forwards firmware events.
pub struct EventRouter<S, I> {
    ctx: Arc<DriverContext>,
    sink: S,
    ifs: I,
    scan: Option<Arc<ScanCache>>,
    notifier: Option<Arc<dyn ScanNotifier>>,
    trace: Mutex<TraceDecoder>,
}

impl<S: EventSink, I: InterfaceOps> EventRouter<S, I> {
    pub fn new(ctx: Arc<DriverContext>, sink: S, ifs: I) -> Self {
        Self {
            ctx,
            sink,
            ifs,
            scan: None,
            notifier: None,
            trace: Mutex::new(TraceDecoder::new()),
        }
    }

    /// Feed extended scan results into `cache`.
    pub fn with_scan_cache(mut self, cache: Arc<ScanCache>) -> Self {
        self.scan = Some(cache);
        self
    }

    /// Report extended scans abandoned for lack of buffers to `notifier`.
    pub fn with_scan_notifier(mut self, notifier: Arc<dyn ScanNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn interfaces(&self) -> &I {
        &self.ifs
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Route one frame received on interface `ifidx`.
    ///
    /// A frame that fails validation is rejected before anything is
    /// touched.
    pub fn route(&self, frame: &[u8], ifidx: usize) -> Result<RoutedEvent> {
        let parsed = EventFrame::parse(frame).inspect_err(|e| {
            tracing::error!(error = %e, len = frame.len(), "dropping event frame");
        })?;
        let event = parsed.event;
        let mut ifidx = ifidx;
        let mut aliased = false;

        match event.event_type {
            EventType::If => {
                match IfEvent::from_bytes(parsed.data) {
                    Ok(ifev) => {
                        self.on_if(&event, &ifev, parsed.dhost);
                        if ifev.action != IfAction::Add {
                            ifidx = self.ifs.ifname_to_idx(&event.ifname);
                        }
                    }
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            ifname = %event.ifname,
                            "bad interface event payload"
                        );
                        ifidx = self.ifs.ifname_to_idx(&event.ifname);
                    }
                }
                self.sink.deliver(ifidx, parsed.bytes, &event);
            }
            _ => {
                ifidx = self.ifs.ifname_to_idx(&event.ifname);
                let (out, delivered) = self.alias(parsed.bytes, &event);
                aliased = matches!(out, Cow::Owned(_));
                self.sink.deliver(ifidx, &out, &delivered);
                tracing::trace!(
                    event = %event.event_type,
                    flags = event.flags,
                    status = event.status.code(),
                    ifidx,
                    "mac event"
                );
            }
        }

        if event.event_type == EventType::EscanResult {
            self.on_escan(&event, parsed.data);
        }
        self.ctx
            .store_conn_status(event.event_type.code(), event.status.code(), event.reason);
        self.show(&event, parsed.data);

        Ok(RoutedEvent {
            ifidx,
            event,
            aliased,
        })
    }

    fn on_if(&self, event: &WlEvent, ifev: &IfEvent, mac: [u8; 6]) {
        tracing::trace!(?ifev, ifname = %event.ifname, "if event");
        let idx = ifev.ifidx as usize;
        if idx == 0 || idx >= MAX_IFS {
            tracing::error!(ifidx = idx, ifname = %event.ifname, "invalid interface index");
            return;
        }
        if ifev.action == IfAction::Add {
            if let Err(e) = self.ifs.add_if(idx, &event.ifname, mac, ifev.flags, ifev.bssidx) {
                tracing::error!(error = %e, ifidx = idx, "add interface failed");
            }
        } else {
            self.ifs.del_if(idx);
        }
    }

    /// Outgoing bytes for `frame`: an `NDIS_LINK` is sent as `LINK` when
    /// legacy aliasing is on. The caller's frame is never modified.
    fn alias<'a>(&self, frame: &'a [u8], event: &'a WlEvent) -> (Cow<'a, [u8]>, Cow<'a, WlEvent>) {
        if event.event_type != EventType::NdisLink || !self.ctx.config().legacy_link_alias {
            return (Cow::Borrowed(frame), Cow::Borrowed(event));
        }
        let mut out = frame.to_vec();
        out[EVENT_TYPE_OFFSET..EVENT_TYPE_OFFSET + 4]
            .copy_from_slice(&EventType::Link.code().to_be_bytes());
        let mut delivered = event.clone();
        delivered.event_type = EventType::Link;
        tracing::trace!("NDIS_LINK forwarded as LINK");
        (Cow::Owned(out), Cow::Owned(delivered))
    }

    fn on_escan(&self, event: &WlEvent, data: &[u8]) {
        let Some(cache) = &self.scan else {
            return;
        };
        match event.status {
            EventStatus::Partial => {
                let appended = EscanResult::parse(data)
                    .and_then(|res| cache.append(&res.to_results(ScanStatus::Partial)));
                match appended {
                    Ok(_) => {}
                    Err(e @ Error::NoMemory(_)) => {
                        tracing::error!(error = %e, "no buffer for escan results, aborting scan");
                        cache.abort();
                        if let Some(n) = &self.notifier {
                            n.scan_confirm(false);
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "escan result dropped"),
                }
            }
            EventStatus::Success => {
                tracing::debug!(nodes = cache.len(), "escan complete");
            }
            other => {
                let dropped = cache.free_all();
                tracing::debug!(status = other.code(), dropped, "escan ended, cache released");
            }
        }
    }

    fn show(&self, event: &WlEvent, data: &[u8]) {
        if !self.ctx.config().show_events || !self.ctx.msg_level().contains(MsgLevel::EVENT) {
            return;
        }
        if event.event_type == EventType::Trace {
            let mut trace = self.trace.lock().unwrap_or_else(PoisonError::into_inner);
            match trace.decode(data) {
                Ok(record) => {
                    for line in &record.lines {
                        tracing::info!(target: "dhd::fw", "FW: {line}");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "undecodable trace event"),
            }
            return;
        }
        tracing::info!(event = %event.event_type, id = event.event_type.code(), "EVENT");
        if let Some(line) = describe(event, data) {
            tracing::info!("{line}");
        }
    }
}

impl<S, I> std::fmt::Debug for EventRouter<S, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("scan", &self.scan.is_some())
            .field("notifier", &self.notifier.is_some())
            .finish_non_exhaustive()
    }
}
