//! Firmware event frames.
//!
//! The dongle reports asynchronous conditions (link changes, association
//! progress, scan results, interface creation) as Ethernet frames with
//! ethertype `0x886c`. Each frame is:
//!
//! ```text
//! +----------------+-------------------+--------------------+-----------+
//! | ether (14)     | vendor hdr (10)   | event msg (46)     | payload   |
//! | dst src type   | subtype len ver   | ver flags type ... | datalen   |
//! |                | oui usr_subtype   | addr ifname        | bytes     |
//! +----------------+-------------------+--------------------+-----------+
//! ```
//!
//! All multi-byte fields are big-endian. [`EventFrame::parse`] checks the
//! vendor signature before looking at anything else, then converts the event
//! header to a host-order [`WlEvent`] exactly once.
//!
//! # Example
//!
//! ```ignore
//! use dhd::dongle::event::{EventFrame, EventType};
//!
//! let frame = EventFrame::parse(&bytes)?;
//! if frame.event.event_type == EventType::Link {
//!     println!("link {}", if frame.event.is_link_up() { "up" } else { "down" });
//! }
//! ```

use std::fmt;

use winnow::binary::le_u8;
use winnow::prelude::*;
use zerocopy::byteorder::big_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::error::{Error, Result};
use super::parse::{FromDongle, PResult};
use super::wlc::WL_EVENTING_MASK_LEN;
use crate::util::ifname::{self, IFNAMSIZ};

/// Ethertype of vendor event frames.
pub const ETHER_TYPE_BRCM: u16 = 0x886c;
/// Vendor OUI carried in the event header.
pub const BRCM_OUI: [u8; 3] = [0x00, 0x10, 0x18];
/// Vendor header subtype.
pub const BCMILCP_SUBTYPE_VENDOR_LONG: u16 = 0x8001;
/// Vendor header version.
pub const BCMILCP_BCM_SUBTYPE_HDR_VERSION: u8 = 0;
/// User subtype identifying an event (as opposed to other vendor frames).
pub const BCMILCP_BCM_SUBTYPE_EVENT: u16 = 1;
/// Version written into the event message header.
pub const BCM_EVENT_MSG_VERSION: u16 = 1;

/// Event flag: link is up.
pub const WLC_EVENT_MSG_LINK: u16 = 0x01;
/// Event flag: flush the transmit queue.
pub const WLC_EVENT_MSG_FLUSHTXQ: u16 = 0x02;
/// Event flag: group (multicast) MIC error.
pub const WLC_EVENT_MSG_GROUP: u16 = 0x04;

/// Ethernet header.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct EtherHeader {
    pub dhost: [u8; 6],
    pub shost: [u8; 6],
    pub ether_type: U16,
}

/// Vendor header between the Ethernet header and the event message.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct BcmEthHeader {
    pub subtype: U16,
    /// Bytes following this field.
    pub length: U16,
    pub version: u8,
    pub oui: [u8; 3],
    pub usr_subtype: U16,
}

/// Event message header as sent by the dongle (network order).
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct WlEventMsg {
    pub version: U16,
    pub flags: U16,
    pub event_type: U32,
    pub status: U32,
    pub reason: U32,
    pub auth_type: U32,
    /// Payload bytes following the header.
    pub datalen: U32,
    /// Station address the event is about.
    pub addr: [u8; 6],
    pub ifname: [u8; IFNAMSIZ],
}

/// Complete fixed part of an event frame.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct BcmEvent {
    pub eth: EtherHeader,
    pub bcm_hdr: BcmEthHeader,
    pub event: WlEventMsg,
}

/// Size of [`BcmEvent`].
pub const BCM_EVENT_LEN: usize = std::mem::size_of::<BcmEvent>();

const ETHER_HDR_LEN: usize = std::mem::size_of::<EtherHeader>();
const OUI_OFFSET: usize = ETHER_HDR_LEN + 5;
const USR_SUBTYPE_OFFSET: usize = ETHER_HDR_LEN + 8;
const SIGNATURE_END: usize = USR_SUBTYPE_OFFSET + 2;

/// Offset of the event type inside a frame.
pub const EVENT_TYPE_OFFSET: usize = ETHER_HDR_LEN + std::mem::size_of::<BcmEthHeader>() + 4;

/// Firmware event type.
///
/// Codes the driver does not know are kept as [`EventType::Unknown`] and
/// still forwarded; they are not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    SetSsid,
    Join,
    Start,
    Auth,
    AuthInd,
    Deauth,
    DeauthInd,
    Assoc,
    AssocInd,
    Reassoc,
    ReassocInd,
    Disassoc,
    DisassocInd,
    QuietStart,
    QuietEnd,
    BeaconRx,
    Link,
    MicError,
    NdisLink,
    Roam,
    TxFail,
    PmkidCache,
    RetrogradeTsf,
    Prune,
    AutoAuth,
    EapolMsg,
    ScanComplete,
    AddtsInd,
    DeltsInd,
    BcnsentInd,
    BcnrxMsg,
    BcnlostMsg,
    RoamPrep,
    PfnNetFound,
    PfnNetLost,
    ResetComplete,
    JoinStart,
    RoamStart,
    AssocStart,
    IbssAssoc,
    Radio,
    PsmWatchdog,
    ProbreqMsg,
    ScanConfirmInd,
    PskSup,
    CountryCodeChanged,
    ExceededMediumTime,
    IcvError,
    UnicastDecodeError,
    MulticastDecodeError,
    Trace,
    /// Virtual interface added, removed or changed.
    If,
    Rssi,
    PfnScanComplete,
    ActionFrame,
    ActionFrameComplete,
    /// Extended scan result (partial or final).
    EscanResult,
    /// Code not known to this driver.
    Unknown(u32),
}

impl EventType {
    /// Map a wire code to an event type.
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Self::SetSsid,
            1 => Self::Join,
            2 => Self::Start,
            3 => Self::Auth,
            4 => Self::AuthInd,
            5 => Self::Deauth,
            6 => Self::DeauthInd,
            7 => Self::Assoc,
            8 => Self::AssocInd,
            9 => Self::Reassoc,
            10 => Self::ReassocInd,
            11 => Self::Disassoc,
            12 => Self::DisassocInd,
            13 => Self::QuietStart,
            14 => Self::QuietEnd,
            15 => Self::BeaconRx,
            16 => Self::Link,
            17 => Self::MicError,
            18 => Self::NdisLink,
            19 => Self::Roam,
            20 => Self::TxFail,
            21 => Self::PmkidCache,
            22 => Self::RetrogradeTsf,
            23 => Self::Prune,
            24 => Self::AutoAuth,
            25 => Self::EapolMsg,
            26 => Self::ScanComplete,
            27 => Self::AddtsInd,
            28 => Self::DeltsInd,
            29 => Self::BcnsentInd,
            30 => Self::BcnrxMsg,
            31 => Self::BcnlostMsg,
            32 => Self::RoamPrep,
            33 => Self::PfnNetFound,
            34 => Self::PfnNetLost,
            35 => Self::ResetComplete,
            36 => Self::JoinStart,
            37 => Self::RoamStart,
            38 => Self::AssocStart,
            39 => Self::IbssAssoc,
            40 => Self::Radio,
            41 => Self::PsmWatchdog,
            44 => Self::ProbreqMsg,
            45 => Self::ScanConfirmInd,
            46 => Self::PskSup,
            47 => Self::CountryCodeChanged,
            48 => Self::ExceededMediumTime,
            49 => Self::IcvError,
            50 => Self::UnicastDecodeError,
            51 => Self::MulticastDecodeError,
            52 => Self::Trace,
            54 => Self::If,
            56 => Self::Rssi,
            57 => Self::PfnScanComplete,
            58 => Self::ActionFrame,
            59 => Self::ActionFrameComplete,
            69 => Self::EscanResult,
            other => Self::Unknown(other),
        }
    }

    /// Wire code.
    pub fn code(&self) -> u32 {
        match self {
            Self::SetSsid => 0,
            Self::Join => 1,
            Self::Start => 2,
            Self::Auth => 3,
            Self::AuthInd => 4,
            Self::Deauth => 5,
            Self::DeauthInd => 6,
            Self::Assoc => 7,
            Self::AssocInd => 8,
            Self::Reassoc => 9,
            Self::ReassocInd => 10,
            Self::Disassoc => 11,
            Self::DisassocInd => 12,
            Self::QuietStart => 13,
            Self::QuietEnd => 14,
            Self::BeaconRx => 15,
            Self::Link => 16,
            Self::MicError => 17,
            Self::NdisLink => 18,
            Self::Roam => 19,
            Self::TxFail => 20,
            Self::PmkidCache => 21,
            Self::RetrogradeTsf => 22,
            Self::Prune => 23,
            Self::AutoAuth => 24,
            Self::EapolMsg => 25,
            Self::ScanComplete => 26,
            Self::AddtsInd => 27,
            Self::DeltsInd => 28,
            Self::BcnsentInd => 29,
            Self::BcnrxMsg => 30,
            Self::BcnlostMsg => 31,
            Self::RoamPrep => 32,
            Self::PfnNetFound => 33,
            Self::PfnNetLost => 34,
            Self::ResetComplete => 35,
            Self::JoinStart => 36,
            Self::RoamStart => 37,
            Self::AssocStart => 38,
            Self::IbssAssoc => 39,
            Self::Radio => 40,
            Self::PsmWatchdog => 41,
            Self::ProbreqMsg => 44,
            Self::ScanConfirmInd => 45,
            Self::PskSup => 46,
            Self::CountryCodeChanged => 47,
            Self::ExceededMediumTime => 48,
            Self::IcvError => 49,
            Self::UnicastDecodeError => 50,
            Self::MulticastDecodeError => 51,
            Self::Trace => 52,
            Self::If => 54,
            Self::Rssi => 56,
            Self::PfnScanComplete => 57,
            Self::ActionFrame => 58,
            Self::ActionFrameComplete => 59,
            Self::EscanResult => 69,
            Self::Unknown(code) => *code,
        }
    }

    /// Name used in log output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetSsid => "SET_SSID",
            Self::Join => "JOIN",
            Self::Start => "START",
            Self::Auth => "AUTH",
            Self::AuthInd => "AUTH_IND",
            Self::Deauth => "DEAUTH",
            Self::DeauthInd => "DEAUTH_IND",
            Self::Assoc => "ASSOC",
            Self::AssocInd => "ASSOC_IND",
            Self::Reassoc => "REASSOC",
            Self::ReassocInd => "REASSOC_IND",
            Self::Disassoc => "DISASSOC",
            Self::DisassocInd => "DISASSOC_IND",
            Self::QuietStart => "START_QUIET",
            Self::QuietEnd => "END_QUIET",
            Self::BeaconRx => "BEACON_RX",
            Self::Link => "LINK",
            Self::MicError => "MIC_ERROR",
            Self::NdisLink => "NDIS_LINK",
            Self::Roam => "ROAM",
            Self::TxFail => "TXFAIL",
            Self::PmkidCache => "PMKID_CACHE",
            Self::RetrogradeTsf => "RETROGRADE_TSF",
            Self::Prune => "PRUNE",
            Self::AutoAuth => "AUTOAUTH",
            Self::EapolMsg => "EAPOL_MSG",
            Self::ScanComplete => "SCAN_COMPLETE",
            Self::AddtsInd => "ADDTS_IND",
            Self::DeltsInd => "DELTS_IND",
            Self::BcnsentInd => "BCNSENT_IND",
            Self::BcnrxMsg => "BCNRX_MSG",
            Self::BcnlostMsg => "BCNLOST_MSG",
            Self::RoamPrep => "ROAM_PREP",
            Self::PfnNetFound => "PNO_NET_FOUND",
            Self::PfnNetLost => "PNO_NET_LOST",
            Self::ResetComplete => "RESET_COMPLETE",
            Self::JoinStart => "JOIN_START",
            Self::RoamStart => "ROAM_START",
            Self::AssocStart => "ASSOC_START",
            Self::IbssAssoc => "IBSS_ASSOC",
            Self::Radio => "RADIO",
            Self::PsmWatchdog => "PSM_WATCHDOG",
            Self::ProbreqMsg => "PROBREQ_MSG",
            Self::ScanConfirmInd => "SCAN_CONFIRM_IND",
            Self::PskSup => "PSK_SUP",
            Self::CountryCodeChanged => "COUNTRY_CODE_CHANGED",
            Self::ExceededMediumTime => "EXCEEDED_MEDIUM_TIME",
            Self::IcvError => "ICV_ERROR",
            Self::UnicastDecodeError => "UNICAST_DECODE_ERROR",
            Self::MulticastDecodeError => "MULTICAST_DECODE_ERROR",
            Self::Trace => "TRACE",
            Self::If => "IF",
            Self::Rssi => "RSSI",
            Self::PfnScanComplete => "SCAN_COMPLETE",
            Self::ActionFrame => "ACTION FRAME",
            Self::ActionFrameComplete => "ACTION FRAME TX COMPLETE",
            Self::EscanResult => "ESCAN_RESULT",
            Self::Unknown(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Event status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventStatus {
    Success,
    Fail,
    Timeout,
    NoNetworks,
    Abort,
    NoAck,
    Unsolicited,
    Attempt,
    /// More results follow (scan).
    Partial,
    NewScan,
    NewAssoc,
    Unknown(u32),
}

impl EventStatus {
    /// Map a wire code to a status.
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::Fail,
            2 => Self::Timeout,
            3 => Self::NoNetworks,
            4 => Self::Abort,
            5 => Self::NoAck,
            6 => Self::Unsolicited,
            7 => Self::Attempt,
            8 => Self::Partial,
            9 => Self::NewScan,
            10 => Self::NewAssoc,
            other => Self::Unknown(other),
        }
    }

    /// Wire code.
    pub fn code(&self) -> u32 {
        match self {
            Self::Success => 0,
            Self::Fail => 1,
            Self::Timeout => 2,
            Self::NoNetworks => 3,
            Self::Abort => 4,
            Self::NoAck => 5,
            Self::Unsolicited => 6,
            Self::Attempt => 7,
            Self::Partial => 8,
            Self::NewScan => 9,
            Self::NewAssoc => 10,
            Self::Unknown(code) => *code,
        }
    }
}

/// Event header in host order.
///
/// Produced once per frame by [`EventFrame::parse`]; nothing downstream reads
/// the wire header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WlEvent {
    pub version: u16,
    pub flags: u16,
    pub event_type: EventType,
    pub status: EventStatus,
    pub reason: u32,
    pub auth_type: u32,
    pub datalen: u32,
    pub addr: [u8; 6],
    pub ifname: String,
}

impl WlEvent {
    /// Convert a wire header.
    pub fn from_wire(msg: &WlEventMsg) -> Self {
        Self {
            version: msg.version.get(),
            flags: msg.flags.get(),
            event_type: EventType::from_code(msg.event_type.get()),
            status: EventStatus::from_code(msg.status.get()),
            reason: msg.reason.get(),
            auth_type: msg.auth_type.get(),
            datalen: msg.datalen.get(),
            addr: msg.addr,
            ifname: ifname::from_fixed(&msg.ifname),
        }
    }

    /// Convert back to wire order.
    pub fn to_wire(&self) -> WlEventMsg {
        WlEventMsg {
            version: U16::new(self.version),
            flags: U16::new(self.flags),
            event_type: U32::new(self.event_type.code()),
            status: U32::new(self.status.code()),
            reason: U32::new(self.reason),
            auth_type: U32::new(self.auth_type),
            datalen: U32::new(self.datalen),
            addr: self.addr,
            ifname: ifname::to_fixed(&self.ifname),
        }
    }

    /// Check if the link flag is set.
    pub fn is_link_up(&self) -> bool {
        self.flags & WLC_EVENT_MSG_LINK != 0
    }

    /// Check if a MIC error was on a group key.
    pub fn is_group(&self) -> bool {
        self.flags & WLC_EVENT_MSG_GROUP != 0
    }

    /// Check if the transmit queue should be flushed.
    pub fn is_flush_txq(&self) -> bool {
        self.flags & WLC_EVENT_MSG_FLUSHTXQ != 0
    }
}

/// A validated event frame.
#[derive(Debug, Clone)]
pub struct EventFrame<'a> {
    /// Host-order copy of the event header.
    pub event: WlEvent,
    /// Destination address from the Ethernet header.
    pub dhost: [u8; 6],
    /// Event payload (`datalen` bytes).
    pub data: &'a [u8],
    /// Header plus payload; the part forwarded upstream.
    pub bytes: &'a [u8],
}

impl<'a> EventFrame<'a> {
    /// Validate and decode a frame.
    ///
    /// The vendor OUI and user subtype are compared before any header field
    /// is read; a mismatch is [`Error::InvalidFrame`]. A frame shorter than
    /// its fixed header, or than the payload it declares, is
    /// [`Error::Truncated`]. Trailing bytes past the payload are ignored.
    pub fn parse(frame: &'a [u8]) -> Result<Self> {
        check_signature(frame)?;

        let (raw, _) = BcmEvent::ref_from_prefix(frame).map_err(|_| Error::Truncated {
            expected: BCM_EVENT_LEN,
            actual: frame.len(),
        })?;
        let event = WlEvent::from_wire(&raw.event);

        let total = (event.datalen as usize)
            .checked_add(BCM_EVENT_LEN)
            .filter(|&total| total <= frame.len())
            .ok_or(Error::Truncated {
                expected: BCM_EVENT_LEN.saturating_add(event.datalen as usize),
                actual: frame.len(),
            })?;

        Ok(Self {
            event,
            dhost: raw.eth.dhost,
            data: &frame[BCM_EVENT_LEN..total],
            bytes: &frame[..total],
        })
    }
}

/// Check the vendor signature of an event frame.
pub fn check_signature(frame: &[u8]) -> Result<()> {
    if frame.len() < SIGNATURE_END {
        return Err(Error::Truncated {
            expected: SIGNATURE_END,
            actual: frame.len(),
        });
    }
    if frame[OUI_OFFSET..OUI_OFFSET + 3] != BRCM_OUI {
        return Err(Error::InvalidFrame("mismatched OUI".into()));
    }
    let usr_subtype = u16::from_be_bytes([frame[USR_SUBTYPE_OFFSET], frame[USR_SUBTYPE_OFFSET + 1]]);
    if usr_subtype != BCMILCP_BCM_SUBTYPE_EVENT {
        return Err(Error::InvalidFrame(format!(
            "mismatched subtype {usr_subtype}"
        )));
    }
    Ok(())
}

/// Interface event action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfAction {
    Add,
    Del,
    Change,
    Unknown(u8),
}

impl IfAction {
    fn from_u8(val: u8) -> Self {
        match val {
            1 => Self::Add,
            2 => Self::Del,
            3 => Self::Change,
            other => Self::Unknown(other),
        }
    }

    /// Wire value.
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Add => 1,
            Self::Del => 2,
            Self::Change => 3,
            Self::Unknown(n) => *n,
        }
    }
}

/// Payload of an [`EventType::If`] event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IfEvent {
    pub ifidx: u8,
    pub action: IfAction,
    pub flags: u8,
    pub bssidx: u8,
}

impl IfEvent {
    /// Wire form.
    pub fn to_bytes(&self) -> [u8; 4] {
        [self.ifidx, self.action.as_u8(), self.flags, self.bssidx]
    }
}

impl FromDongle for IfEvent {
    fn parse(input: &mut &[u8]) -> PResult<Self> {
        let ifidx = le_u8.parse_next(input)?;
        let action = IfAction::from_u8(le_u8.parse_next(input)?);
        let flags = le_u8.parse_next(input)?;
        let bssidx = le_u8.parse_next(input)?;
        Ok(Self {
            ifidx,
            action,
            flags,
            bssidx,
        })
    }
}

/// Bitmap of events the firmware should report (`event_msgs`).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EventMask([u8; WL_EVENTING_MASK_LEN]);

impl EventMask {
    /// Mask with no events.
    pub const fn empty() -> Self {
        Self([0; WL_EVENTING_MASK_LEN])
    }

    /// Build a mask from raw bytes.
    pub const fn from_bytes(bytes: [u8; WL_EVENTING_MASK_LEN]) -> Self {
        Self(bytes)
    }

    /// Enable an event. Codes outside the mask are ignored.
    pub fn set(&mut self, event: EventType) -> &mut Self {
        let code = event.code() as usize;
        if let Some(byte) = self.0.get_mut(code / 8) {
            *byte |= 1 << (code % 8);
        }
        self
    }

    /// Disable an event.
    pub fn clear(&mut self, event: EventType) -> &mut Self {
        let code = event.code() as usize;
        if let Some(byte) = self.0.get_mut(code / 8) {
            *byte &= !(1 << (code % 8));
        }
        self
    }

    /// Check if an event is enabled.
    pub fn is_set(&self, event: EventType) -> bool {
        let code = event.code() as usize;
        self.0
            .get(code / 8)
            .is_some_and(|byte| byte & (1 << (code % 8)) != 0)
    }

    /// Raw bytes as sent to the firmware.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Default for EventMask {
    /// The events a station needs to track its connection and scans.
    fn default() -> Self {
        let mut mask = Self::empty();
        for event in [
            EventType::SetSsid,
            EventType::Prune,
            EventType::Auth,
            EventType::Reassoc,
            EventType::ReassocInd,
            EventType::DeauthInd,
            EventType::DisassocInd,
            EventType::Disassoc,
            EventType::Join,
            EventType::AssocInd,
            EventType::PskSup,
            EventType::Link,
            EventType::NdisLink,
            EventType::MicError,
            EventType::PmkidCache,
            EventType::TxFail,
            EventType::JoinStart,
            EventType::ScanComplete,
            EventType::EscanResult,
        ] {
            mask.set(event);
        }
        mask
    }
}

impl fmt::Debug for EventMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventMask(")?;
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        f.write_str(")")
    }
}

/// Builder for event frames.
///
/// The dongle is the only real producer of these frames; this builder exists
/// for tools that replay events and for tests.
#[derive(Debug, Clone)]
#[must_use = "builders do nothing unless .build() is called"]
pub struct EventBuilder {
    event: WlEvent,
    dhost: [u8; 6],
    shost: [u8; 6],
    oui: [u8; 3],
    usr_subtype: u16,
    data: Vec<u8>,
}

impl EventBuilder {
    /// Start a frame for `event_type`.
    pub fn new(event_type: EventType) -> Self {
        Self {
            event: WlEvent {
                version: BCM_EVENT_MSG_VERSION,
                flags: 0,
                event_type,
                status: EventStatus::Success,
                reason: 0,
                auth_type: 0,
                datalen: 0,
                addr: [0; 6],
                ifname: String::new(),
            },
            dhost: [0xff; 6],
            shost: [0; 6],
            oui: BRCM_OUI,
            usr_subtype: BCMILCP_BCM_SUBTYPE_EVENT,
            data: Vec::new(),
        }
    }

    pub fn status(mut self, status: EventStatus) -> Self {
        self.event.status = status;
        self
    }

    pub fn reason(mut self, reason: u32) -> Self {
        self.event.reason = reason;
        self
    }

    pub fn auth_type(mut self, auth_type: u32) -> Self {
        self.event.auth_type = auth_type;
        self
    }

    pub fn flags(mut self, flags: u16) -> Self {
        self.event.flags = flags;
        self
    }

    /// Station address the event refers to.
    pub fn addr(mut self, addr: [u8; 6]) -> Self {
        self.event.addr = addr;
        self
    }

    /// Interface name; truncated to fit the fixed field.
    pub fn ifname(mut self, name: impl Into<String>) -> Self {
        self.event.ifname = name.into();
        self
    }

    /// Ethernet destination (used as the MAC of added interfaces).
    pub fn dhost(mut self, dhost: [u8; 6]) -> Self {
        self.dhost = dhost;
        self
    }

    /// Payload bytes; `datalen` follows.
    pub fn data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self
    }

    /// Override the vendor OUI.
    pub fn oui(mut self, oui: [u8; 3]) -> Self {
        self.oui = oui;
        self
    }

    /// Override the vendor user subtype.
    pub fn usr_subtype(mut self, usr_subtype: u16) -> Self {
        self.usr_subtype = usr_subtype;
        self
    }

    /// Serialize the frame.
    pub fn build(mut self) -> Vec<u8> {
        self.event.datalen = self.data.len() as u32;
        let length = (std::mem::size_of::<BcmEthHeader>() - 4
            + std::mem::size_of::<WlEventMsg>()
            + self.data.len()) as u16;
        let header = BcmEvent {
            eth: EtherHeader {
                dhost: self.dhost,
                shost: self.shost,
                ether_type: U16::new(ETHER_TYPE_BRCM),
            },
            bcm_hdr: BcmEthHeader {
                subtype: U16::new(BCMILCP_SUBTYPE_VENDOR_LONG),
                length: U16::new(length),
                version: BCMILCP_BCM_SUBTYPE_HDR_VERSION,
                oui: self.oui,
                usr_subtype: U16::new(self.usr_subtype),
            },
            event: self.event.to_wire(),
        };
        let mut frame = Vec::with_capacity(BCM_EVENT_LEN + self.data.len());
        frame.extend_from_slice(header.as_bytes());
        frame.extend_from_slice(&self.data);
        frame
    }
}
