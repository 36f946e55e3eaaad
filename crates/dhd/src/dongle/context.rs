//! Driver-wide mutable state.
//!
//! Everything the iovar handlers and the event router read or change
//! (traffic counters, timer intervals, the message level, the last
//! connection status) lives in one [`DriverState`] behind a mutex owned by
//! [`DriverContext`]. [`DriverContext::new`] and
//! [`DriverContext::reset_counters`] are the only reset points.

use std::fmt::Write as _;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::config::DriverConfig;
use super::msglevel::MsgLevel;
use crate::util::addr::format_mac;

/// Driver identification string reported by the `version` variable.
pub const DHD_VERSION: &str = concat!("Dongle Host Driver, version ", env!("CARGO_PKG_VERSION"));

/// Counters kept on behalf of the network interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DongleStats {
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub tx_errors: u64,
    pub tx_dropped: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub rx_errors: u64,
    pub rx_dropped: u64,
    pub multicast: u64,
}

/// Counters kept by the bus and protocol layers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    pub tx_packets: u64,
    pub tx_multicast: u64,
    pub tx_errors: u64,
    pub tx_ctlpkts: u64,
    pub tx_ctlerrs: u64,
    pub rx_packets: u64,
    pub rx_multicast: u64,
    pub rx_errors: u64,
    pub rx_ctlpkts: u64,
    pub rx_ctlerrs: u64,
    pub rx_dropped: u64,
    pub rx_flushed: u64,
    pub rx_readahead_cnt: u64,
    pub tx_realloc: u64,
    pub fc_packets: u64,
    pub wd_dpc_sched: u64,
}

/// Outcome of the most recent connection attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnStatus {
    /// Event code.
    pub event: u32,
    /// Status code.
    pub status: u32,
    /// Reason code.
    pub reason: u32,
}

/// Bus state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BusState {
    #[default]
    Down,
    Load,
    Data,
}

/// State guarded by [`DriverContext`].
#[derive(Debug, Clone)]
pub struct DriverState {
    /// Logical link is up.
    pub up: bool,
    /// Transmit flow control engaged.
    pub txoff: bool,
    pub busstate: BusState,
    /// Bus header length.
    pub hdrlen: u32,
    /// Largest control message.
    pub maxctl: u32,
    /// Receive buffer size.
    pub rxsz: u32,
    /// Firmware is a wireless (wl) image.
    pub iswl: bool,
    pub drv_version: u32,
    /// Dongle MAC address.
    pub mac: [u8; 6],
    /// Last firmware status returned to the control interface.
    pub bcmerror: i32,
    /// Watchdog ticks since start.
    pub tickcnt: u32,
    pub dstats: DongleStats,
    pub bus: BusStats,
    pub watchdog_ms: u32,
    pub console_ms: u32,
    pub ioctl_timeout_ms: u32,
    pub msg_level: MsgLevel,
    pub conn: ConnStatus,
}

impl DriverState {
    fn new(config: &DriverConfig) -> Self {
        Self {
            up: false,
            txoff: false,
            busstate: BusState::Down,
            hdrlen: 0,
            maxctl: 0,
            rxsz: 0,
            iswl: true,
            drv_version: 0,
            mac: [0; 6],
            bcmerror: 0,
            tickcnt: 0,
            dstats: DongleStats::default(),
            bus: BusStats::default(),
            watchdog_ms: config.watchdog_ms,
            console_ms: config.console_ms,
            ioctl_timeout_ms: config.ioctl_timeout_ms,
            msg_level: config.msg_level,
            conn: ConnStatus::default(),
        }
    }

    /// Record the outcome of a connection attempt.
    ///
    /// An encryption or RSN mismatch produces both a `PRUNE` and a failed
    /// `SET_SSID`; the prune carries the useful reason, so a failed
    /// `SET_SSID` never replaces it.
    pub fn store_conn_status(&mut self, event: u32, status: u32, reason: u32) {
        use super::event::{EventStatus, EventType};

        let ssid_fail = event == EventType::SetSsid.code()
            && status == EventStatus::Fail.code()
            && self.conn.event == EventType::Prune.code();
        if !ssid_fail {
            self.conn = ConnStatus {
                event,
                status,
                reason,
            };
        }
    }

    /// Zero the traffic counters (the `clearcounts` variable).
    ///
    /// Multicast, flush and flow-control counts are not traffic counters and
    /// survive the reset.
    pub fn reset_counters(&mut self) {
        let kept = self.bus;
        self.bus = BusStats {
            tx_multicast: kept.tx_multicast,
            rx_multicast: kept.rx_multicast,
            rx_flushed: kept.rx_flushed,
            fc_packets: kept.fc_packets,
            ..BusStats::default()
        };
        self.dstats = DongleStats::default();
    }

    /// Render the `dump` text.
    pub fn dump(&self) -> String {
        let mut s = String::new();
        let b = &self.bus;
        let d = &self.dstats;
        // writing into a String cannot fail
        let _ = writeln!(s, "{DHD_VERSION}");
        let _ = writeln!(
            s,
            "pub.up {} pub.txoff {} pub.busstate {:?}",
            u8::from(self.up),
            u8::from(self.txoff),
            self.busstate
        );
        let _ = writeln!(
            s,
            "pub.hdrlen {} pub.maxctl {} pub.rxsz {}",
            self.hdrlen, self.maxctl, self.rxsz
        );
        let _ = writeln!(
            s,
            "pub.iswl {} pub.drv_version {} pub.mac {}",
            u8::from(self.iswl),
            self.drv_version,
            format_mac(&self.mac)
        );
        let _ = writeln!(s, "pub.bcmerror {} tickcnt {}", self.bcmerror, self.tickcnt);
        let _ = writeln!(s, "dongle stats:");
        let _ = writeln!(
            s,
            "tx_packets {} tx_bytes {} tx_errors {} tx_dropped {}",
            d.tx_packets, d.tx_bytes, d.tx_errors, d.tx_dropped
        );
        let _ = writeln!(
            s,
            "rx_packets {} rx_bytes {} rx_errors {} rx_dropped {}",
            d.rx_packets, d.rx_bytes, d.rx_errors, d.rx_dropped
        );
        let _ = writeln!(s, "multicast {}", d.multicast);
        let _ = writeln!(s, "bus stats:");
        let _ = writeln!(
            s,
            "tx_packets {} tx_multicast {} tx_errors {}",
            b.tx_packets, b.tx_multicast, b.tx_errors
        );
        let _ = writeln!(s, "tx_ctlpkts {} tx_ctlerrs {}", b.tx_ctlpkts, b.tx_ctlerrs);
        let _ = writeln!(
            s,
            "rx_packets {} rx_multicast {} rx_errors {}",
            b.rx_packets, b.rx_multicast, b.rx_errors
        );
        let _ = writeln!(
            s,
            "rx_ctlpkts {} rx_ctlerrs {} rx_dropped {} rx_flushed {}",
            b.rx_ctlpkts, b.rx_ctlerrs, b.rx_dropped, b.rx_flushed
        );
        let _ = writeln!(
            s,
            "rx_readahead_cnt {} tx_realloc {} fc_packets {}",
            b.rx_readahead_cnt, b.tx_realloc, b.fc_packets
        );
        let _ = writeln!(s, "wd_dpc_sched {}", b.wd_dpc_sched);
        s
    }
}

/// Shared handle to the driver state plus the configuration it was built from.
#[derive(Debug)]
pub struct DriverContext {
    config: DriverConfig,
    state: Mutex<DriverState>,
}

impl DriverContext {
    /// Create a context in its initial (link down, counters zero) state.
    pub fn new(config: DriverConfig) -> Self {
        let state = DriverState::new(&config);
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    /// The configuration this context was created with.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Lock the state.
    ///
    /// A panic in another holder does not leave the counters in a state
    /// worth refusing, so poisoning is ignored.
    pub fn lock(&self) -> MutexGuard<'_, DriverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with the state locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut DriverState) -> R) -> R {
        f(&mut self.lock())
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> DriverState {
        self.lock().clone()
    }

    /// Mark the logical link up or down.
    pub fn set_up(&self, up: bool) {
        tracing::debug!(up, "link state");
        self.with(|s| s.up = up);
    }

    /// Check if the logical link is up.
    pub fn is_up(&self) -> bool {
        self.lock().up
    }

    /// Current control reply timeout.
    pub fn ioctl_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.lock().ioctl_timeout_ms))
    }

    /// Current message level.
    pub fn msg_level(&self) -> MsgLevel {
        self.lock().msg_level
    }

    /// Zero the traffic counters.
    pub fn reset_counters(&self) {
        self.with(DriverState::reset_counters);
    }

    /// See [`DriverState::store_conn_status`].
    pub fn store_conn_status(&self, event: u32, status: u32, reason: u32) {
        self.with(|s| s.store_conn_status(event, status, reason));
    }

    /// Last recorded connection status.
    pub fn conn_status(&self) -> ConnStatus {
        self.lock().conn
    }

    /// Remember the status of the last control request.
    pub fn record_bcmerror(&self, code: i32) {
        self.with(|s| s.bcmerror = code);
    }
}

impl Default for DriverContext {
    fn default() -> Self {
        Self::new(DriverConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dongle::event::{EventStatus, EventType};

    #[test]
    fn test_new_takes_config() {
        let ctx = DriverContext::new(DriverConfig::new().watchdog_ms(25).ioctl_timeout_ms(500));
        let s = ctx.snapshot();
        assert!(!s.up);
        assert_eq!(s.watchdog_ms, 25);
        assert_eq!(ctx.ioctl_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_prune_is_sticky() {
        let ctx = DriverContext::default();
        let prune = EventType::Prune.code();
        let set_ssid = EventType::SetSsid.code();
        let fail = EventStatus::Fail.code();

        ctx.store_conn_status(prune, EventStatus::Success.code(), 11);
        ctx.store_conn_status(set_ssid, fail, 1);
        assert_eq!(ctx.conn_status().event, prune);
        assert_eq!(ctx.conn_status().reason, 11);

        // a successful SET_SSID does replace it
        ctx.store_conn_status(set_ssid, EventStatus::Success.code(), 0);
        assert_eq!(ctx.conn_status().event, set_ssid);
    }

    #[test]
    fn test_set_ssid_fail_overwrites_non_prune() {
        let ctx = DriverContext::default();
        ctx.store_conn_status(EventType::Auth.code(), 0, 0);
        ctx.store_conn_status(EventType::SetSsid.code(), EventStatus::Fail.code(), 3);
        assert_eq!(
            ctx.conn_status(),
            ConnStatus {
                event: EventType::SetSsid.code(),
                status: EventStatus::Fail.code(),
                reason: 3,
            }
        );
    }

    #[test]
    fn test_reset_counters() {
        let ctx = DriverContext::default();
        ctx.with(|s| {
            s.bus.tx_packets = 10;
            s.bus.fc_packets = 4;
            s.dstats.rx_bytes = 1000;
        });
        ctx.reset_counters();
        let s = ctx.snapshot();
        assert_eq!(s.bus.tx_packets, 0);
        assert_eq!(s.dstats, DongleStats::default());
        assert_eq!(s.bus.fc_packets, 4);
    }

    #[test]
    fn test_dump_mentions_counters() {
        let ctx = DriverContext::default();
        ctx.with(|s| s.bus.rx_ctlpkts = 7);
        let text = ctx.snapshot().dump();
        assert!(text.starts_with(DHD_VERSION));
        assert!(text.contains("rx_ctlpkts 7"));
        assert!(text.contains("dongle stats:"));
    }
}
