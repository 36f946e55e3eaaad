//! Driver configuration.
//!
//! A [`DriverConfig`] seeds a fresh [`DriverContext`](super::DriverContext)
//! and drives the firmware pre-init sequence. It can be built in code with
//! the builder methods or loaded from JSON:
//!
//! ```ignore
//! use dhd::dongle::DriverConfig;
//!
//! let config = DriverConfig::new()
//!     .country_code("US")
//!     .pkt_filter("100 0 0 0 0x01 0x00")
//!     .legacy_link_alias(false);
//!
//! let from_file = DriverConfig::from_file("/etc/dhd.json")?;
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::Result;
use super::msglevel::MsgLevel;

/// Firmware power-save mode (`WLC_SET_PM`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerMode {
    /// Always awake.
    Off,
    /// Legacy PS-Poll power save.
    #[default]
    Max,
    /// Fast power save.
    Fast,
}

impl PowerMode {
    /// Value written with `WLC_SET_PM`.
    pub fn as_u32(self) -> u32 {
        match self {
            PowerMode::Off => 0,
            PowerMode::Max => 1,
            PowerMode::Fast => 2,
        }
    }
}

/// ARP offload settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArpOffload {
    /// Offload agent mode bits (`arp_ol`).
    pub mode: u32,
    /// Whether the agent is enabled (`arpoe`).
    pub enable: bool,
}

impl Default for ArpOffload {
    fn default() -> Self {
        // ARP_OL_AGENT | ARP_OL_PEER_AUTO_REPLY
        Self {
            mode: 0x0001 | 0x0002,
            enable: true,
        }
    }
}

/// Driver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Watchdog tick interval in milliseconds.
    pub watchdog_ms: u32,
    /// Control reply timeout in milliseconds.
    pub ioctl_timeout_ms: u32,
    /// Firmware console poll interval in milliseconds (0 = off).
    pub console_ms: u32,
    /// Initial message level.
    pub msg_level: MsgLevel,
    /// Firmware image path.
    pub fw_path: String,
    /// NVRAM path.
    pub nv_path: String,
    /// Country code applied at pre-init (`None` keeps the firmware default).
    pub country_code: Option<String>,
    /// Power-save mode applied at pre-init.
    pub power_mode: PowerMode,
    /// Disable in-firmware roaming so an external supplicant can roam.
    pub roam_off: bool,
    /// Beacons lost before link down is reported.
    pub bcn_timeout: u32,
    /// Bring the radio up during pre-init.
    pub radio_up: bool,
    /// Keep-alive period in milliseconds (0 disables it).
    pub keep_alive_ms: u32,
    /// Packet filter specifications, `"id polarity type offset 0xmask 0xpattern"`.
    pub pkt_filters: Vec<String>,
    /// Install `pkt_filters` during pre-init.
    pub pkt_filter_enable: bool,
    /// Packet filter master mode (`pkt_filter_mode`).
    pub pkt_filter_master_mode: u32,
    /// ARP offload, if any.
    pub arp_offload: Option<ArpOffload>,
    /// Report `NDIS_LINK` events as `LINK` to consumers.
    pub legacy_link_alias: bool,
    /// Upper bound on buffered incremental scan nodes.
    pub iscan_max_nodes: usize,
    /// Decode every event to the log.
    pub show_events: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            watchdog_ms: 10,
            ioctl_timeout_ms: 2000,
            console_ms: 0,
            msg_level: MsgLevel::default(),
            fw_path: String::new(),
            nv_path: String::new(),
            country_code: None,
            power_mode: PowerMode::default(),
            roam_off: false,
            bcn_timeout: 8,
            radio_up: true,
            keep_alive_ms: 60_000,
            pkt_filters: Vec::new(),
            pkt_filter_enable: false,
            pkt_filter_master_mode: 1,
            arp_offload: None,
            legacy_link_alias: true,
            iscan_max_nodes: 32,
            show_events: false,
        }
    }
}

impl DriverConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    /// Render as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Set the watchdog tick interval.
    pub fn watchdog_ms(mut self, ms: u32) -> Self {
        self.watchdog_ms = ms;
        self
    }

    /// Set the control reply timeout.
    pub fn ioctl_timeout_ms(mut self, ms: u32) -> Self {
        self.ioctl_timeout_ms = ms;
        self
    }

    /// Set the initial message level.
    pub fn msg_level(mut self, level: MsgLevel) -> Self {
        self.msg_level = level;
        self
    }

    /// Set the country code.
    pub fn country_code(mut self, code: impl Into<String>) -> Self {
        self.country_code = Some(code.into());
        self
    }

    /// Set the power-save mode.
    pub fn power_mode(mut self, mode: PowerMode) -> Self {
        self.power_mode = mode;
        self
    }

    /// Turn in-firmware roaming off (or back on).
    pub fn roam_off(mut self, off: bool) -> Self {
        self.roam_off = off;
        self
    }

    /// Set the keep-alive period.
    pub fn keep_alive_ms(mut self, ms: u32) -> Self {
        self.keep_alive_ms = ms;
        self
    }

    /// Add a packet filter and enable filter installation.
    pub fn pkt_filter(mut self, spec: impl Into<String>) -> Self {
        self.pkt_filters.push(spec.into());
        self.pkt_filter_enable = true;
        self
    }

    /// Configure ARP offload.
    pub fn arp_offload(mut self, arp: ArpOffload) -> Self {
        self.arp_offload = Some(arp);
        self
    }

    /// Enable or disable `NDIS_LINK` to `LINK` aliasing.
    pub fn legacy_link_alias(mut self, enable: bool) -> Self {
        self.legacy_link_alias = enable;
        self
    }

    /// Bound the number of buffered scan nodes.
    pub fn iscan_max_nodes(mut self, nodes: usize) -> Self {
        self.iscan_max_nodes = nodes;
        self
    }

    /// Enable verbose event decoding.
    pub fn show_events(mut self, enable: bool) -> Self {
        self.show_events = enable;
        self
    }
}
