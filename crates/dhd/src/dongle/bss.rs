//! Scan result records.
//!
//! A scan result buffer is a small header followed by packed BSS records.
//! Every record starts with a fixed 64-byte [`BssInfoHeader`] whose
//! `length` field covers the whole record, information elements included,
//! so the buffer is walked with [`RecordIter`] and [`BSS_LAYOUT`]. All fields
//! are in dongle order (little-endian).

use zerocopy::byteorder::little_endian::{I16, U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::error::{Error, Result};
use super::record::{LenWidth, RecordIter, RecordLayout};
use super::wlc::WL_BSS_INFO_VERSION;
use crate::util::addr::format_mac;

/// Longest SSID.
pub const DOT11_MAX_SSID_LEN: usize = 32;

/// Fixed part of a BSS record.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct BssInfoHeader {
    pub version: U32,
    /// Full record length, information elements included.
    pub length: U32,
    pub bssid: [u8; 6],
    pub beacon_period: U16,
    pub capability: U16,
    pub ssid_len: u8,
    pub ssid: [u8; DOT11_MAX_SSID_LEN],
    pub chanspec: U16,
    pub rssi: I16,
    pub phy_noise: i8,
    pub dtim_period: u8,
    /// Offset of the information elements from the record start.
    pub ie_offset: U16,
    pub ie_length: U32,
    pub reserved: u8,
}

/// Size of [`BssInfoHeader`].
pub const BSS_INFO_FIXED_LEN: usize = std::mem::size_of::<BssInfoHeader>();

/// Offset of the BSSID inside a record.
pub const BSSID_OFFSET: usize = 8;

/// How BSS records report their length.
pub const BSS_LAYOUT: RecordLayout = RecordLayout {
    len_offset: 4,
    len_width: LenWidth::U32,
    big_endian: false,
    len_bias: 0,
    min_len: BSS_INFO_FIXED_LEN,
};

/// BSSID of the record at the front of `record`.
pub fn record_bssid(record: &[u8]) -> Option<[u8; 6]> {
    record
        .get(BSSID_OFFSET..BSSID_OFFSET + 6)
        .and_then(|b| b.try_into().ok())
}

/// Read-only view of one BSS record.
#[derive(Debug, Clone, Copy)]
pub struct BssRecord<'a> {
    hdr: &'a BssInfoHeader,
    raw: &'a [u8],
}

impl<'a> BssRecord<'a> {
    /// View `raw` as a record. `raw` must hold exactly one record.
    pub fn parse(raw: &'a [u8]) -> Result<Self> {
        let (hdr, _) = BssInfoHeader::ref_from_prefix(raw).map_err(|_| Error::Truncated {
            expected: BSS_INFO_FIXED_LEN,
            actual: raw.len(),
        })?;
        Ok(Self { hdr, raw })
    }

    /// The fixed header.
    pub fn header(&self) -> &'a BssInfoHeader {
        self.hdr
    }

    pub fn bssid(&self) -> [u8; 6] {
        self.hdr.bssid
    }

    /// SSID, lossily decoded.
    pub fn ssid(&self) -> String {
        let len = (self.hdr.ssid_len as usize).min(DOT11_MAX_SSID_LEN);
        String::from_utf8_lossy(&self.hdr.ssid[..len]).into_owned()
    }

    pub fn rssi(&self) -> i16 {
        self.hdr.rssi.get()
    }

    pub fn chanspec(&self) -> u16 {
        self.hdr.chanspec.get()
    }

    /// Record length in bytes.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Check if the record is only a header.
    pub fn is_empty(&self) -> bool {
        self.raw.len() <= BSS_INFO_FIXED_LEN
    }

    /// Raw bytes of the information elements, clipped to the record.
    pub fn ie_bytes(&self) -> &'a [u8] {
        let start = (self.hdr.ie_offset.get() as usize).min(self.raw.len());
        let end = start
            .saturating_add(self.hdr.ie_length.get() as usize)
            .min(self.raw.len());
        &self.raw[start..end]
    }

    /// Walk the information elements as `(id, data)`.
    pub fn ies(&self) -> impl Iterator<Item = (u8, &'a [u8])> {
        RecordIter::new(self.ie_bytes(), RecordLayout::IE).map(|ie| (ie[0], &ie[2..]))
    }
}

/// Builder for BSS records.
#[derive(Debug, Clone)]
#[must_use = "builders do nothing unless .build() is called"]
pub struct BssBuilder {
    bssid: [u8; 6],
    ssid: Vec<u8>,
    rssi: i16,
    chanspec: u16,
    beacon_period: u16,
    capability: u16,
    ies: Vec<u8>,
}

impl BssBuilder {
    /// Start a record for `bssid`.
    pub fn new(bssid: [u8; 6]) -> Self {
        Self {
            bssid,
            ssid: Vec::new(),
            rssi: 0,
            chanspec: 0,
            beacon_period: 100,
            capability: 0,
            ies: Vec::new(),
        }
    }

    /// SSID; truncated to 32 bytes.
    pub fn ssid(mut self, ssid: &str) -> Self {
        let bytes = ssid.as_bytes();
        self.ssid = bytes[..bytes.len().min(DOT11_MAX_SSID_LEN)].to_vec();
        self
    }

    pub fn rssi(mut self, rssi: i16) -> Self {
        self.rssi = rssi;
        self
    }

    pub fn chanspec(mut self, chanspec: u16) -> Self {
        self.chanspec = chanspec;
        self
    }

    pub fn capability(mut self, capability: u16) -> Self {
        self.capability = capability;
        self
    }

    /// Append an information element.
    pub fn ie(mut self, id: u8, data: &[u8]) -> Self {
        let len = data.len().min(u8::MAX as usize);
        self.ies.push(id);
        self.ies.push(len as u8);
        self.ies.extend_from_slice(&data[..len]);
        self
    }

    /// Serialize; the record is padded to a multiple of four bytes.
    pub fn build(self) -> Vec<u8> {
        let unpadded = BSS_INFO_FIXED_LEN + self.ies.len();
        let length = unpadded.next_multiple_of(4);
        let mut ssid = [0u8; DOT11_MAX_SSID_LEN];
        ssid[..self.ssid.len()].copy_from_slice(&self.ssid);
        let hdr = BssInfoHeader {
            version: U32::new(WL_BSS_INFO_VERSION),
            length: U32::new(length as u32),
            bssid: self.bssid,
            beacon_period: U16::new(self.beacon_period),
            capability: U16::new(self.capability),
            ssid_len: self.ssid.len() as u8,
            ssid,
            chanspec: U16::new(self.chanspec),
            rssi: I16::new(self.rssi),
            phy_noise: 0,
            dtim_period: 0,
            ie_offset: U16::new(BSS_INFO_FIXED_LEN as u16),
            ie_length: U32::new(self.ies.len() as u32),
            reserved: 0,
        };
        let mut out = Vec::with_capacity(length);
        out.extend_from_slice(hdr.as_bytes());
        out.extend_from_slice(&self.ies);
        out.resize(length, 0);
        out
    }
}

/// Status of an incremental scan results read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    /// Scan complete; these are the last results.
    Success,
    /// More results will follow.
    Partial,
    /// Nothing new yet.
    Pending,
    Aborted,
    /// Firmware ran out of memory.
    NoMem,
    Unknown(u32),
}

impl ScanStatus {
    pub fn from_u32(val: u32) -> Self {
        match val {
            0 => Self::Success,
            1 => Self::Partial,
            2 => Self::Pending,
            3 => Self::Aborted,
            4 => Self::NoMem,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            Self::Success => 0,
            Self::Partial => 1,
            Self::Pending => 2,
            Self::Aborted => 3,
            Self::NoMem => 4,
            Self::Unknown(n) => *n,
        }
    }
}

/// Header of an incremental scan results buffer.
///
/// `buflen` counts its own 12 bytes (`buflen`, `version`, `count`) plus the
/// packed records; `status` is outside it.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct ScanResultsHeader {
    pub status: U32,
    pub buflen: U32,
    pub version: U32,
    pub count: U32,
}

/// Size of [`ScanResultsHeader`].
pub const SCAN_RESULTS_HDR_LEN: usize = std::mem::size_of::<ScanResultsHeader>();

/// Bytes of [`ScanResultsHeader`] counted by `buflen`.
pub const SCAN_RESULTS_FIXED_LEN: usize = 12;

impl ScanResultsHeader {
    /// Header describing `count` records totalling `records_len` bytes.
    pub fn new(status: ScanStatus, count: usize, records_len: usize) -> Self {
        Self {
            status: U32::new(status.as_u32()),
            buflen: U32::new((SCAN_RESULTS_FIXED_LEN + records_len) as u32),
            version: U32::new(WL_BSS_INFO_VERSION),
            count: U32::new(count as u32),
        }
    }

    pub fn status(&self) -> ScanStatus {
        ScanStatus::from_u32(self.status.get())
    }

    /// Record bytes declared by `buflen`.
    pub fn records_len(&self) -> usize {
        (self.buflen.get() as usize).saturating_sub(SCAN_RESULTS_FIXED_LEN)
    }
}

/// Serialize a results buffer from individual records.
pub fn results_buffer(status: ScanStatus, records: &[Vec<u8>]) -> Vec<u8> {
    let records_len: usize = records.iter().map(Vec::len).sum();
    let hdr = ScanResultsHeader::new(status, records.len(), records_len);
    let mut out = Vec::with_capacity(SCAN_RESULTS_HDR_LEN + records_len);
    out.extend_from_slice(hdr.as_bytes());
    for record in records {
        out.extend_from_slice(record);
    }
    out
}

/// Header of an extended scan result event payload.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct EscanHeader {
    /// Bytes including this header.
    pub buflen: U32,
    pub version: U32,
    pub sync_id: U16,
    pub bss_count: U16,
}

/// Size of [`EscanHeader`].
pub const ESCAN_HDR_LEN: usize = std::mem::size_of::<EscanHeader>();

/// A parsed extended scan result payload.
#[derive(Debug, Clone, Copy)]
pub struct EscanResult<'a> {
    pub sync_id: u16,
    pub bss_count: u16,
    /// Packed BSS records.
    pub records: &'a [u8],
}

impl<'a> EscanResult<'a> {
    /// Parse an event payload. `buflen` is clipped to the payload.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let (hdr, _) = EscanHeader::ref_from_prefix(data).map_err(|_| Error::Truncated {
            expected: ESCAN_HDR_LEN,
            actual: data.len(),
        })?;
        let end = (hdr.buflen.get() as usize).clamp(ESCAN_HDR_LEN, data.len());
        Ok(Self {
            sync_id: hdr.sync_id.get(),
            bss_count: hdr.bss_count.get(),
            records: &data[ESCAN_HDR_LEN..end],
        })
    }

    /// Rebuild as an incremental scan results buffer.
    pub fn to_results(&self, status: ScanStatus) -> Vec<u8> {
        let hdr = ScanResultsHeader::new(status, self.bss_count as usize, self.records.len());
        let mut out = Vec::with_capacity(SCAN_RESULTS_HDR_LEN + self.records.len());
        out.extend_from_slice(hdr.as_bytes());
        out.extend_from_slice(self.records);
        out
    }
}

/// Serialize an extended scan result payload.
pub fn escan_buffer(sync_id: u16, records: &[Vec<u8>]) -> Vec<u8> {
    let records_len: usize = records.iter().map(Vec::len).sum();
    let hdr = EscanHeader {
        buflen: U32::new((ESCAN_HDR_LEN + records_len) as u32),
        version: U32::new(WL_BSS_INFO_VERSION),
        sync_id: U16::new(sync_id),
        bss_count: U16::new(records.len() as u16),
    };
    let mut out = Vec::with_capacity(ESCAN_HDR_LEN + records_len);
    out.extend_from_slice(hdr.as_bytes());
    for record in records {
        out.extend_from_slice(record);
    }
    out
}

/// One line of a scan listing.
pub fn describe(record: &BssRecord<'_>) -> String {
    format!(
        "{} {:>4} dBm chanspec 0x{:04x} \"{}\"",
        format_mac(&record.bssid()),
        record.rssi(),
        record.chanspec(),
        record.ssid()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(BSS_INFO_FIXED_LEN, 64);
        assert_eq!(SCAN_RESULTS_HDR_LEN, 16);
        assert_eq!(ESCAN_HDR_LEN, 12);
    }

    #[test]
    fn test_build_and_view() {
        let raw = BssBuilder::new([2, 0, 0, 0, 0, 1])
            .ssid("home")
            .rssi(-42)
            .chanspec(0x1006)
            .ie(0, b"home")
            .ie(221, &[0x00, 0x50, 0xf2, 1])
            .build();
        assert_eq!(raw.len() % 4, 0);
        assert_eq!(BSS_LAYOUT.record_len(&raw), Some(raw.len()));

        let bss = BssRecord::parse(&raw).unwrap();
        assert_eq!(bss.bssid(), [2, 0, 0, 0, 0, 1]);
        assert_eq!(bss.ssid(), "home");
        assert_eq!(bss.rssi(), -42);
        assert_eq!(record_bssid(&raw), Some([2, 0, 0, 0, 0, 1]));

        let ies: Vec<_> = bss.ies().collect();
        assert_eq!(ies.len(), 2);
        assert_eq!(ies[0], (0, &b"home"[..]));
        assert_eq!(ies[1].0, 221);
    }

    #[test]
    fn test_results_buffer_walk() {
        let a = BssBuilder::new([1; 6]).ssid("a").build();
        let b = BssBuilder::new([2; 6]).ssid("b").ie(1, &[0x82]).build();
        let buf = results_buffer(ScanStatus::Partial, &[a.clone(), b.clone()]);

        let (hdr, rest) = ScanResultsHeader::ref_from_prefix(&buf).unwrap();
        assert_eq!(hdr.status(), ScanStatus::Partial);
        assert_eq!(hdr.count.get(), 2);
        assert_eq!(hdr.records_len(), a.len() + b.len());

        let records: Vec<_> = RecordIter::new(rest, BSS_LAYOUT).collect();
        assert_eq!(records, vec![&a[..], &b[..]]);
    }

    #[test]
    fn test_escan_roundtrip_to_results() {
        let a = BssBuilder::new([7; 6]).build();
        let payload = escan_buffer(0x1234, &[a.clone()]);
        let escan = EscanResult::parse(&payload).unwrap();
        assert_eq!(escan.sync_id, 0x1234);
        assert_eq!(escan.bss_count, 1);
        assert_eq!(escan.records, &a[..]);

        let results = escan.to_results(ScanStatus::Partial);
        assert_eq!(results, results_buffer(ScanStatus::Partial, &[a]));
        assert!(EscanResult::parse(&payload[..4]).is_err());
    }

    #[test]
    fn test_describe() {
        let raw = BssBuilder::new([0xaa, 0xbb, 0xcc, 0, 0, 1]).ssid("x").rssi(-70).build();
        let line = describe(&BssRecord::parse(&raw).unwrap());
        assert!(line.starts_with("aa:bb:cc:00:00:01"));
        assert!(line.contains("-70 dBm"));
    }
}
