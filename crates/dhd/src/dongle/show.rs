//! Human-readable event decode.
//!
//! Purely diagnostic: nothing here changes routing. [`describe`] renders the
//! one-line summary for an event and [`TraceDecoder`] unpacks firmware log
//! (`TRACE`) payloads, tracking lost records by sequence number.

use winnow::binary::{be_u16, be_u32, le_u8};
use winnow::prelude::*;

use super::error::{Error, Result};
use super::event::{EventStatus, EventType, WlEvent};
use super::parse::{FromDongle, PResult};
use super::wlc::dot11_auth;
use crate::util::addr::format_mac;

/// One-line summary of an event, or `None` for events with nothing to say.
pub fn describe(event: &WlEvent, data: &[u8]) -> Option<String> {
    use EventType as E;

    let name = event.event_type.name();
    let mac = format_mac(&event.addr);
    let status = event.status;
    let reason = event.reason;

    let line = match event.event_type {
        E::Start | E::Deauth | E::Disassoc | E::AssocInd | E::ReassocInd => {
            format!("MACEVENT: {name}, MAC {mac}")
        }
        E::Assoc | E::Reassoc => match status {
            EventStatus::Success => format!("MACEVENT: {name}, MAC {mac}, SUCCESS"),
            EventStatus::Timeout => format!("MACEVENT: {name}, MAC {mac}, TIMEOUT"),
            EventStatus::Fail => format!("MACEVENT: {name}, MAC {mac}, FAILURE, reason {reason}"),
            other => format!(
                "MACEVENT: {name}, MAC {mac}, unexpected status {}",
                other.code()
            ),
        },
        E::DeauthInd | E::DisassocInd => format!("MACEVENT: {name}, MAC {mac}, reason {reason}"),
        E::Auth | E::AuthInd => {
            let auth = match event.auth_type {
                dot11_auth::OPEN_SYSTEM => "Open System".to_string(),
                dot11_auth::SHARED_KEY => "Shared Key".to_string(),
                other => format!("AUTH unknown: {other}"),
            };
            if event.event_type == E::AuthInd {
                format!("MACEVENT: {name}, MAC {mac}, {auth}")
            } else {
                match status {
                    EventStatus::Success => format!("MACEVENT: {name}, MAC {mac}, {auth}, SUCCESS"),
                    EventStatus::Timeout => format!("MACEVENT: {name}, MAC {mac}, {auth}, TIMEOUT"),
                    EventStatus::Fail => {
                        format!("MACEVENT: {name}, MAC {mac}, {auth}, FAILURE, reason {reason}")
                    }
                    _ => return None,
                }
            }
        }
        E::Join | E::Roam | E::SetSsid => match status {
            EventStatus::Success => format!("MACEVENT: {name}, MAC {mac}"),
            EventStatus::Fail => format!("MACEVENT: {name}, failed"),
            EventStatus::NoNetworks => format!("MACEVENT: {name}, no networks found"),
            other => format!("MACEVENT: {name}, unexpected status {}", other.code()),
        },
        E::BeaconRx => match status {
            EventStatus::Success => format!("MACEVENT: {name}, SUCCESS"),
            EventStatus::Fail => format!("MACEVENT: {name}, FAIL"),
            other => format!("MACEVENT: {name}, status {}", other.code()),
        },
        E::Link => format!(
            "MACEVENT: {name} {}",
            if event.is_link_up() { "UP" } else { "DOWN" }
        ),
        E::MicError => format!(
            "MACEVENT: {name}, MAC {mac}, Group {}, Flush {}",
            u8::from(event.is_group()),
            u8::from(event.is_flush_txq())
        ),
        E::IcvError | E::UnicastDecodeError | E::MulticastDecodeError => {
            format!("MACEVENT: {name}, MAC {mac}")
        }
        E::TxFail => format!("MACEVENT: {name}, RA {mac}"),
        E::ScanComplete | E::PmkidCache => format!("MACEVENT: {name}"),
        E::PfnNetFound | E::PfnNetLost | E::PfnScanComplete => format!("PNOEVENT: {name}"),
        E::PskSup | E::Prune => format!(
            "MACEVENT: {name}, status {}, reason {reason}",
            status.code()
        ),
        E::Rssi => match data.get(..4).and_then(|b| b.try_into().ok()) {
            Some(raw) => format!("MACEVENT: {name} {}", i32::from_be_bytes(raw)),
            None => format!("MACEVENT: {name}"),
        },
        // decoded separately by TraceDecoder
        E::Trace | E::EscanResult => return None,
        other => format!(
            "MACEVENT: {name} {}, MAC {mac}, status {}, reason {reason}, auth {}",
            other.code(),
            status.code(),
            event.auth_type
        ),
    };
    Some(line)
}

// ============================================================================
// Firmware trace
// ============================================================================

/// Supported trace header version.
pub const MSGTRACE_VERSION: u8 = 1;

/// Size of [`TraceHeader`] on the wire.
pub const MSGTRACE_HDRLEN: usize = 16;

/// Header of a firmware trace record. Fields are big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceHeader {
    pub version: u8,
    /// Bytes of log text following the header.
    pub len: u16,
    pub seqnum: u32,
    /// Bytes the dongle dropped before this record.
    pub discarded_bytes: u32,
    /// printf calls the dongle dropped before this record.
    pub discarded_printf: u32,
}

impl FromDongle for TraceHeader {
    fn parse(input: &mut &[u8]) -> PResult<Self> {
        let version = le_u8.parse_next(input)?;
        let _spare = le_u8.parse_next(input)?;
        let len = be_u16.parse_next(input)?;
        let seqnum = be_u32.parse_next(input)?;
        let discarded_bytes = be_u32.parse_next(input)?;
        let discarded_printf = be_u32.parse_next(input)?;
        Ok(Self {
            version,
            len,
            seqnum,
            discarded_bytes,
            discarded_printf,
        })
    }
}

/// A decoded trace record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    pub header: TraceHeader,
    /// Records missing between the previous one and this one.
    pub lost: u32,
    pub lines: Vec<String>,
}

/// Stateful decoder for firmware trace events.
#[derive(Debug, Default)]
pub struct TraceDecoder {
    seqnum_prev: u32,
}

impl TraceDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one trace payload.
    pub fn decode(&mut self, data: &[u8]) -> Result<TraceRecord> {
        let header = TraceHeader::from_bytes(data)?;
        if header.version != MSGTRACE_VERSION {
            return Err(Error::Unsupported(format!(
                "trace version {} (expected {MSGTRACE_VERSION})",
                header.version
            )));
        }

        let body = &data[MSGTRACE_HDRLEN..];
        let body = &body[..(header.len as usize).min(body.len())];
        let text = match body.iter().position(|&b| b == 0) {
            Some(nul) => &body[..nul],
            None => body,
        };
        let lines = String::from_utf8_lossy(text)
            .split('\n')
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();

        let lost = header
            .seqnum
            .wrapping_sub(self.seqnum_prev)
            .wrapping_sub(1);
        self.seqnum_prev = header.seqnum;

        if header.discarded_bytes != 0 || header.discarded_printf != 0 {
            tracing::warn!(
                discarded_bytes = header.discarded_bytes,
                discarded_printf = header.discarded_printf,
                "dongle discarded trace output"
            );
        }
        if lost != 0 {
            tracing::warn!(seqnum = header.seqnum, lost, "trace records lost");
        }

        Ok(TraceRecord {
            header,
            lost,
            lines,
        })
    }
}

/// Encode a trace payload.
pub fn trace_payload(seqnum: u32, text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(MSGTRACE_HDRLEN + text.len());
    out.push(MSGTRACE_VERSION);
    out.push(0);
    out.extend_from_slice(&(text.len() as u16).to_be_bytes());
    out.extend_from_slice(&seqnum.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(text.as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dongle::event::WLC_EVENT_MSG_LINK;

    fn event(event_type: EventType, status: EventStatus) -> WlEvent {
        WlEvent {
            version: 1,
            flags: 0,
            event_type,
            status,
            reason: 3,
            auth_type: 0,
            datalen: 0,
            addr: [0, 0x11, 0x22, 0x33, 0x44, 0x55],
            ifname: "wl0".into(),
        }
    }

    #[test]
    fn test_describe_assoc() {
        let e = event(EventType::Assoc, EventStatus::Fail);
        assert_eq!(
            describe(&e, &[]).unwrap(),
            "MACEVENT: ASSOC, MAC 00:11:22:33:44:55, FAILURE, reason 3"
        );
    }

    #[test]
    fn test_describe_auth() {
        let mut e = event(EventType::Auth, EventStatus::Success);
        e.auth_type = dot11_auth::SHARED_KEY;
        assert_eq!(
            describe(&e, &[]).unwrap(),
            "MACEVENT: AUTH, MAC 00:11:22:33:44:55, Shared Key, SUCCESS"
        );
    }

    #[test]
    fn test_describe_link() {
        let mut e = event(EventType::Link, EventStatus::Success);
        assert_eq!(describe(&e, &[]).unwrap(), "MACEVENT: LINK DOWN");
        e.flags = WLC_EVENT_MSG_LINK;
        assert_eq!(describe(&e, &[]).unwrap(), "MACEVENT: LINK UP");
    }

    #[test]
    fn test_describe_rssi_and_unknown() {
        let e = event(EventType::Rssi, EventStatus::Success);
        assert_eq!(
            describe(&e, &(-61i32).to_be_bytes()).unwrap(),
            "MACEVENT: RSSI -61"
        );
        let e = event(EventType::Unknown(99), EventStatus::Success);
        assert!(describe(&e, &[]).unwrap().starts_with("MACEVENT: UNKNOWN 99"));
        assert!(describe(&event(EventType::EscanResult, EventStatus::Partial), &[]).is_none());
    }

    #[test]
    fn test_trace_lines() {
        let mut dec = TraceDecoder::new();
        let rec = dec.decode(&trace_payload(1, "wl0: up\nwl0: join\n")).unwrap();
        assert_eq!(rec.lost, 0);
        assert_eq!(rec.lines, vec!["wl0: up", "wl0: join"]);
    }

    #[test]
    fn test_trace_lost_records() {
        let mut dec = TraceDecoder::new();
        dec.decode(&trace_payload(1, "a")).unwrap();
        let rec = dec.decode(&trace_payload(5, "b")).unwrap();
        assert_eq!(rec.lost, 3);
        let rec = dec.decode(&trace_payload(6, "c")).unwrap();
        assert_eq!(rec.lost, 0);
    }

    #[test]
    fn test_trace_bad_version() {
        let mut payload = trace_payload(1, "x");
        payload[0] = 2;
        assert!(TraceDecoder::new().decode(&payload).unwrap_err().is_unsupported());
        assert!(TraceDecoder::new().decode(&payload[..8]).is_err());
    }
}
