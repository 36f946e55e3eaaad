//! Firmware configuration applied once the dongle is up.
//!
//! [`preinit`] walks a fixed sequence of commands. A failing step is logged
//! and recorded in the [`PreinitReport`]; later steps still run, since most
//! firmware builds reject at least one of them.
//!
//! The packet filter, ARP offload and keep-alive encoders are public so
//! tools can issue them on their own.

use std::net::Ipv4Addr;
use std::str::FromStr;

use super::config::DriverConfig;
use super::error::{Error, Result};
use super::event::EventMask;
use super::parse::parse_cstr;
use super::transport::{Transport, TransportExt};
use super::wlc::{DHD_SDALIGN, band, wlc_cmd};
use crate::util::parse::{get_u32, parse_hex_pattern};

// ============================================================================
// Packet filters
// ============================================================================

/// A pattern-match packet filter.
///
/// Parsed from `"<id> <polarity> <type> <offset> <0xmask> <0xpattern>"`;
/// numbers take C prefixes, mask and pattern must be the same size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PktFilter {
    pub id: u32,
    /// Non-zero inverts the match.
    pub negate_match: u32,
    pub filter_type: u32,
    /// Byte offset of the pattern in the packet.
    pub offset: u32,
    pub mask: Vec<u8>,
    pub pattern: Vec<u8>,
}

impl FromStr for PktFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut args = s.split_whitespace();
        let mut next = |what: &str| {
            args.next()
                .ok_or_else(|| Error::BadArg(format!("pkt filter \"{s}\": {what} not provided")))
        };
        let num = |v: &str| get_u32(v).map_err(|e| Error::BadArg(e.to_string()));
        let hex = |v: &str| parse_hex_pattern(v).map_err(|e| Error::BadArg(e.to_string()));

        let id = num(next("id")?)?;
        let negate_match = num(next("polarity")?)?;
        let filter_type = num(next("filter type")?)?;
        let offset = num(next("offset")?)?;
        let mask = hex(next("bitmask")?)?;
        let pattern = hex(next("pattern")?)?;
        if mask.len() != pattern.len() {
            return Err(Error::BadArg(format!(
                "pkt filter \"{s}\": mask and pattern not the same size"
            )));
        }
        Ok(Self {
            id,
            negate_match,
            filter_type,
            offset,
            mask,
            pattern,
        })
    }
}

impl PktFilter {
    /// Argument bytes of `pkt_filter_add`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(20 + 2 * self.mask.len());
        out.extend_from_slice(&self.id.to_le_bytes());
        out.extend_from_slice(&self.filter_type.to_le_bytes());
        out.extend_from_slice(&self.negate_match.to_le_bytes());
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&(self.mask.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.mask);
        out.extend_from_slice(&self.pattern);
        out
    }

    /// Install the filter.
    pub fn add<T: Transport + ?Sized>(&self, t: &T) -> Result<()> {
        t.set_var("pkt_filter_add", &self.to_bytes())
    }
}

/// Argument bytes of `pkt_filter_enable`.
pub fn pkt_filter_enable_bytes(id: u32, enable: bool) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[..4].copy_from_slice(&id.to_le_bytes());
    out[4..].copy_from_slice(&u32::from(enable).to_le_bytes());
    out
}

/// Enable or disable filter `id`.
pub fn pkt_filter_enable<T: Transport + ?Sized>(t: &T, id: u32, enable: bool) -> Result<()> {
    t.set_var("pkt_filter_enable", &pkt_filter_enable_bytes(id, enable))
}

/// Set the filter master mode.
pub fn pkt_filter_mode<T: Transport + ?Sized>(t: &T, mode: u32) -> Result<()> {
    t.set_var_u32("pkt_filter_mode", mode)
}

// ============================================================================
// ARP offload and keep-alive
// ============================================================================

pub fn arp_offload_set<T: Transport + ?Sized>(t: &T, mode: u32) -> Result<()> {
    t.set_var_u32("arp_ol", mode)
}

pub fn arp_offload_enable<T: Transport + ?Sized>(t: &T, enable: bool) -> Result<()> {
    t.set_var_u32("arpoe", u32::from(enable))
}

/// Add a host address to the offload agent.
pub fn arp_add_ip<T: Transport + ?Sized>(t: &T, ip: Ipv4Addr) -> Result<()> {
    t.set_var("arp_hostip", &ip.octets())
}

pub fn arp_hostip_clear<T: Transport + ?Sized>(t: &T) -> Result<()> {
    t.set_var("arp_hostip_clear", &[])
}

pub fn arp_table_clear<T: Transport + ?Sized>(t: &T) -> Result<()> {
    t.set_var("arp_table_clear", &[])
}

/// Argument bytes of `keep_alive`: the period, then an empty packet.
///
/// A zero period disables keep-alive.
pub fn keepalive_bytes(period_ms: u32) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[..4].copy_from_slice(&period_ms.to_le_bytes());
    let len_bytes: u16 = if period_ms == 0 { 0 } else { 2 };
    out[4..6].copy_from_slice(&len_bytes.to_le_bytes());
    out
}

pub fn keepalive<T: Transport + ?Sized>(t: &T, period_ms: u32) -> Result<()> {
    t.set_var("keep_alive", &keepalive_bytes(period_ms))
}

// ============================================================================
// Sequence
// ============================================================================

/// Outcome of one pre-init step.
#[derive(Debug)]
pub struct PreinitStep {
    pub name: String,
    pub outcome: Result<()>,
}

/// What [`preinit`] did.
#[derive(Debug, Default)]
pub struct PreinitReport {
    pub steps: Vec<PreinitStep>,
    /// First line of the firmware `ver` string.
    pub fw_version: Option<String>,
}

impl PreinitReport {
    fn record(&mut self, name: impl Into<String>, outcome: Result<()>) {
        let name = name.into();
        match &outcome {
            Ok(()) => tracing::debug!(step = %name, "preinit"),
            Err(e) => tracing::warn!(step = %name, error = %e, "preinit step failed"),
        }
        self.steps.push(PreinitStep { name, outcome });
    }

    /// Steps that failed.
    pub fn failures(&self) -> impl Iterator<Item = &PreinitStep> {
        self.steps.iter().filter(|s| s.outcome.is_err())
    }

    /// Check if every step succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Country code field of `WLC_SET_COUNTRY`.
const WLC_CNTRY_BUF_SZ: usize = 4;

/// Roam when a candidate is this much (dB) better.
const ROAM_DELTA_DB: i32 = 3;

/// Seconds between roam scans.
const ROAM_SCAN_PERIOD_S: i32 = 10;

/// Configure the firmware from `config`.
pub fn preinit<T: Transport + ?Sized>(
    t: &T,
    config: &DriverConfig,
    mask: &EventMask,
) -> PreinitReport {
    let mut report = PreinitReport::default();

    if let Some(cc) = &config.country_code {
        let mut buf = [0u8; WLC_CNTRY_BUF_SZ];
        let len = cc.len().min(WLC_CNTRY_BUF_SZ - 1);
        buf[..len].copy_from_slice(&cc.as_bytes()[..len]);
        let outcome = t.wl_ioctl(0, wlc_cmd::SET_COUNTRY, &mut buf, true).map(|_| ());
        report.record("country", outcome);
    }

    let mut ver = [0u8; 128];
    match t.get_var("ver", &[], &mut ver) {
        Ok(len) => {
            let text = parse_cstr(&ver[..len]);
            let first = text.lines().next().unwrap_or_default().trim().to_string();
            tracing::info!(version = %first, "firmware");
            report.fw_version = Some(first);
            report.record("ver", Ok(()));
        }
        Err(e) => report.record("ver", Err(e)),
    }

    let pm = config.power_mode.as_u32() as i32;
    report.record("pm", t.set_int(wlc_cmd::SET_PM, pm));
    if pm == 0 {
        report.record("mpc", t.set_var_u32("mpc", 0));
    }

    report.record("bus:txglomalign", t.set_var_u32("bus:txglomalign", DHD_SDALIGN));
    report.record("bus:txglom", t.set_var_u32("bus:txglom", 0));
    report.record("bcn_timeout", t.set_var_u32("bcn_timeout", config.bcn_timeout));
    report.record("roam_off", t.set_var_u32("roam_off", u32::from(config.roam_off)));

    if config.radio_up {
        report.record("up", t.set_int(wlc_cmd::UP, 0));
    }

    report.record("event_msgs", t.set_var("event_msgs", mask.as_bytes()));

    let mut delta = [0u8; 8];
    delta[..4].copy_from_slice(&ROAM_DELTA_DB.to_le_bytes());
    delta[4..].copy_from_slice(&band::ALL.to_le_bytes());
    let outcome = t
        .wl_ioctl(0, wlc_cmd::SET_ROAM_DELTA, &mut delta, true)
        .map(|_| ());
    report.record("roam_delta", outcome);
    report.record(
        "roam_scan_period",
        t.set_int(wlc_cmd::SET_ROAM_SCAN_PERIOD, ROAM_SCAN_PERIOD_S),
    );

    if let Some(arp) = config.arp_offload {
        if arp.enable {
            report.record("arp_ol", arp_offload_set(t, arp.mode));
        }
        report.record("arpoe", arp_offload_enable(t, arp.enable));
    }

    if config.pkt_filter_enable {
        for spec in &config.pkt_filters {
            // installed disabled; enabled when the host suspends
            let outcome = spec.parse::<PktFilter>().and_then(|f| {
                f.add(t)?;
                pkt_filter_enable(t, f.id, false)
            });
            report.record(format!("pkt_filter {spec}"), outcome);
            report.record(
                "pkt_filter_mode",
                pkt_filter_mode(t, config.pkt_filter_master_mode),
            );
        }
    }

    report.record("keep_alive", keepalive(t, config.keep_alive_ms));
    report.record("bcn_li_dtim", t.set_var_u32("bcn_li_dtim", 1));
    report.record("okc_enable", t.set_var_u32("okc_enable", 1));
    report.record("assoc_prefer", t.set_int(wlc_cmd::SET_ASSOC_PREFER, band::BAND_5G));

    report
}
