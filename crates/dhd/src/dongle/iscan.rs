//! Incremental scan result cache.
//!
//! Partial scan results arrive as fixed-capacity buffers, each holding a
//! [`ScanResultsHeader`] and packed BSS records. The cache keeps them in
//! arrival order in a slot arena addressed by generation-checked
//! [`NodeId`]s. When a new buffer is accepted, every BSSID it carries is
//! removed from the older buffers, so the newest report of an access point
//! is the only one kept. Buffers emptied this way are released.
//!
//! [`Iscan`] drives the firmware side: it starts and aborts the scan and
//! pulls `iscanresults` into the cache.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use zerocopy::byteorder::little_endian::U32;
use zerocopy::{FromBytes, IntoBytes};

use super::bss::{
    BSS_LAYOUT, BssRecord, SCAN_RESULTS_FIXED_LEN, SCAN_RESULTS_HDR_LEN, ScanResultsHeader,
    ScanStatus, describe, record_bssid,
};
use super::error::{Error, Result};
use super::record::RecordIter;
use super::transport::{Transport, TransportExt};
use super::wlc::{ISCAN_REQ_VERSION, WLC_IW_ISCAN_MAXLEN, scan_action};
use crate::util::addr::{ETHER_BCAST, format_mac};

/// Default cap on live buffers.
pub const DEFAULT_MAX_NODES: usize = 64;

/// Handle to a buffer in a [`ScanCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    slot: u32,
    generation: u32,
}

/// Whether the cache accepts new buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Session {
    #[default]
    Idle,
    Active,
    /// Aborted; nothing is accepted until the next session starts.
    Aborted,
}

/// Summary of one cached access point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    pub node: NodeId,
    pub bssid: [u8; 6],
    pub ssid: String,
    pub rssi: i16,
    pub chanspec: u16,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    buf: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct Arena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    /// Live slots, oldest first.
    order: Vec<u32>,
    session: Session,
}

impl Arena {
    fn get(&self, id: NodeId) -> Option<&Vec<u8>> {
        let slot = self.slots.get(id.slot as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.buf.as_ref()
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut Vec<u8>> {
        let slot = self.slots.get_mut(id.slot as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.buf.as_mut()
    }

    fn id_of(&self, slot: u32) -> NodeId {
        NodeId {
            slot,
            generation: self.slots[slot as usize].generation,
        }
    }

    fn alloc(&mut self) -> NodeId {
        let mut buf = Vec::with_capacity(WLC_IW_ISCAN_MAXLEN);
        buf.extend_from_slice(ScanResultsHeader::new(ScanStatus::Pending, 0, 0).as_bytes());
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize].buf = Some(buf);
                slot
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    buf: Some(buf),
                });
                (self.slots.len() - 1) as u32
            }
        };
        self.order.push(slot);
        self.id_of(slot)
    }

    fn release(&mut self, id: NodeId) -> bool {
        let Some(slot) = self.slots.get_mut(id.slot as usize) else {
            return false;
        };
        if slot.generation != id.generation || slot.buf.is_none() {
            return false;
        }
        slot.buf = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.slot);
        self.order.retain(|&s| s != id.slot);
        true
    }

    fn release_all(&mut self) -> usize {
        let live: Vec<NodeId> = self.order.iter().map(|&s| self.id_of(s)).collect();
        for id in &live {
            self.release(*id);
        }
        live.len()
    }

    fn live(&self) -> Vec<NodeId> {
        self.order.iter().map(|&s| self.id_of(s)).collect()
    }

    fn check_open(&self) -> Result<()> {
        if self.session == Session::Aborted {
            return Err(Error::ScanAborted);
        }
        Ok(())
    }

    fn reserve(&mut self, max_nodes: usize) -> Result<NodeId> {
        self.check_open()?;
        if self.order.len() >= max_nodes {
            return Err(Error::NoMemory(format!("scan cache full ({max_nodes} buffers)")));
        }
        Ok(self.alloc())
    }

    /// Replace the contents of `id` with `records`.
    fn store(&mut self, id: NodeId, status: ScanStatus, records: &[&[u8]]) -> Result<()> {
        let buf = self
            .get_mut(id)
            .ok_or_else(|| Error::BadArg(format!("stale scan buffer {id:?}")))?;
        buf.clear();
        buf.extend_from_slice(ScanResultsHeader::new(status, 0, 0).as_bytes());
        for record in records {
            buf.extend_from_slice(record);
        }
        fix_header(buf, records.len());
        Ok(())
    }

    /// Fill a reserved buffer from one results reply. The reply must fit.
    fn fill(&mut self, id: NodeId, data: &[u8]) -> Result<usize> {
        if let Err(e) = self.check_open() {
            self.release(id);
            return Err(e);
        }
        let (status, records) = parse_results(data)?;
        let used: usize = records.iter().map(|r| r.len()).sum();
        if used > NODE_RECORDS_MAX {
            return Err(Error::BufferTooShort {
                needed: SCAN_RESULTS_HDR_LEN + used,
                actual: WLC_IW_ISCAN_MAXLEN,
            });
        }
        self.store(id, status, &records)?;
        Ok(records.len())
    }

    fn bssids(&self, id: NodeId) -> Vec<[u8; 6]> {
        match self.get(id) {
            Some(buf) => RecordIter::new(records_of(buf), BSS_LAYOUT)
                .with_count(record_count(buf))
                .filter_map(record_bssid)
                .collect(),
            None => Vec::new(),
        }
    }

    fn remove_bssid(&mut self, bssid: &[u8; 6], skip: &[NodeId]) -> usize {
        let mut removed = 0;
        for id in self.live() {
            if skip.contains(&id) {
                continue;
            }
            let Some(buf) = self.get_mut(id) else {
                continue;
            };
            let n = strip_bssid(buf, bssid);
            if n == 0 {
                continue;
            }
            removed += n;
            if record_count(buf) == 0 {
                self.release(id);
            }
        }
        if removed > 0 {
            tracing::trace!(bssid = %format_mac(bssid), removed, "superseded scan records");
        }
        removed
    }

    /// Remove from every buffer outside `ids` the BSSIDs carried by `ids`.
    fn dedup(&mut self, ids: &[NodeId]) -> usize {
        let bssids: Vec<[u8; 6]> = ids.iter().flat_map(|&id| self.bssids(id)).collect();
        bssids.iter().map(|bssid| self.remove_bssid(bssid, ids)).sum()
    }
}

/// Record bytes one buffer can hold.
pub const NODE_RECORDS_MAX: usize = WLC_IW_ISCAN_MAXLEN - SCAN_RESULTS_HDR_LEN;

/// Status and cleanly walking records of a results reply.
fn parse_results(data: &[u8]) -> Result<(ScanStatus, Vec<&[u8]>)> {
    let (hdr, rest) = ScanResultsHeader::ref_from_prefix(data).map_err(|_| Error::Truncated {
        expected: SCAN_RESULTS_HDR_LEN,
        actual: data.len(),
    })?;
    let declared = hdr.count.get() as usize;
    let limit = hdr.records_len().min(rest.len());

    let mut iter = RecordIter::new(&rest[..limit], BSS_LAYOUT).with_count(declared);
    let records: Vec<&[u8]> = iter.by_ref().collect();
    if let Some(fault) = iter.fault() {
        tracing::warn!(?fault, declared, kept = records.len(), "malformed scan records dropped");
    }
    Ok((hdr.status(), records))
}

/// Group records into runs that each fit one buffer.
fn split_records<'a>(records: &[&'a [u8]]) -> Result<Vec<Vec<&'a [u8]>>> {
    let mut chunks = Vec::new();
    let mut current: Vec<&[u8]> = Vec::new();
    let mut used = 0;
    for &record in records {
        if record.len() > NODE_RECORDS_MAX {
            return Err(Error::BufferTooShort {
                needed: SCAN_RESULTS_HDR_LEN + record.len(),
                actual: WLC_IW_ISCAN_MAXLEN,
            });
        }
        if used + record.len() > NODE_RECORDS_MAX {
            chunks.push(std::mem::take(&mut current));
            used = 0;
        }
        used += record.len();
        current.push(record);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    Ok(chunks)
}

/// Record bytes of a node buffer.
fn records_of(buf: &[u8]) -> &[u8] {
    buf.get(SCAN_RESULTS_HDR_LEN..).unwrap_or(&[])
}

fn record_count(buf: &[u8]) -> usize {
    ScanResultsHeader::ref_from_prefix(buf)
        .map(|(h, _)| h.count.get() as usize)
        .unwrap_or(0)
}

/// Rewrite the header to describe the records currently in `buf`.
fn fix_header(buf: &mut [u8], count: usize) {
    let records_len = buf.len().saturating_sub(SCAN_RESULTS_HDR_LEN);
    if let Ok((hdr, _)) = ScanResultsHeader::mut_from_prefix(buf) {
        hdr.count = U32::new(count as u32);
        hdr.buflen = U32::new((SCAN_RESULTS_FIXED_LEN + records_len) as u32);
    }
}

/// Drop every record for `bssid` from a node buffer. Returns the number
/// removed.
fn strip_bssid(buf: &mut Vec<u8>, bssid: &[u8; 6]) -> usize {
    let count = record_count(buf);
    let mut offset = SCAN_RESULTS_HDR_LEN;
    let mut kept = 0;
    let mut removed = 0;
    for _ in 0..count {
        let Some(len) = BSS_LAYOUT.record_len(&buf[offset..]) else {
            break;
        };
        if len < BSS_LAYOUT.min_len || offset + len > buf.len() {
            break;
        }
        if record_bssid(&buf[offset..]).as_ref() == Some(bssid) {
            buf.copy_within(offset + len.., offset);
            buf.truncate(buf.len() - len);
            removed += 1;
        } else {
            offset += len;
            kept += 1;
        }
    }
    if removed > 0 {
        buf.truncate(offset);
        fix_header(buf, kept);
    }
    removed
}

/// Arrival-ordered cache of partial scan results.
#[derive(Debug)]
pub struct ScanCache {
    arena: Mutex<Arena>,
    max_nodes: usize,
}

impl Default for ScanCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NODES)
    }
}

impl ScanCache {
    /// Create a cache holding at most `max_nodes` buffers.
    pub fn new(max_nodes: usize) -> Self {
        Self {
            arena: Mutex::new(Arena::default()),
            max_nodes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Arena> {
        self.arena.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Begin a new scan, dropping anything cached.
    pub fn start_session(&self) {
        let mut arena = self.lock();
        let dropped = arena.release_all();
        arena.session = Session::Active;
        tracing::debug!(dropped, "scan session started");
    }

    /// Abort the scan: release every buffer and refuse new ones.
    pub fn abort(&self) {
        let mut arena = self.lock();
        let dropped = arena.release_all();
        arena.session = Session::Aborted;
        tracing::debug!(dropped, "scan session aborted");
    }

    pub fn session(&self) -> Session {
        self.lock().session
    }

    /// Take an empty buffer at the tail of the chain.
    pub fn reserve(&self) -> Result<NodeId> {
        self.lock().reserve(self.max_nodes)
    }

    /// Copy a results reply into a reserved buffer.
    ///
    /// Only records that walk cleanly are kept; the stored header is
    /// rewritten to match them. A reply whose records do not fit one buffer
    /// is refused. Returns the number of records kept.
    pub fn fill(&self, id: NodeId, data: &[u8]) -> Result<usize> {
        self.lock().fill(id, data)
    }

    /// Fill a reserved buffer and make it authoritative for its BSSIDs, as
    /// one step. The buffer is released if the reply is refused or empty.
    pub fn commit(&self, id: NodeId, data: &[u8]) -> Result<usize> {
        let mut arena = self.lock();
        let count = match arena.fill(id, data) {
            Ok(count) => count,
            Err(e) => {
                arena.release(id);
                return Err(e);
            }
        };
        if count == 0 {
            arena.release(id);
        } else {
            arena.dedup(&[id]);
        }
        Ok(count)
    }

    /// Store a results reply at the tail of the chain and make it
    /// authoritative for the BSSIDs it carries.
    ///
    /// A reply larger than one buffer is spread over as many as it needs;
    /// if they cannot all be had, nothing is stored. An empty reply stores
    /// nothing. Returns the new buffers, oldest first.
    pub fn append(&self, data: &[u8]) -> Result<Vec<NodeId>> {
        let mut arena = self.lock();
        arena.check_open()?;
        let (status, records) = parse_results(data)?;
        let chunks = split_records(&records)?;
        if arena.order.len() + chunks.len() > self.max_nodes {
            return Err(Error::NoMemory(format!(
                "scan cache full ({} buffers, {} more needed)",
                self.max_nodes,
                chunks.len()
            )));
        }
        let mut ids = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let id = arena.alloc();
            arena.store(id, status, chunk)?;
            ids.push(id);
        }
        arena.dedup(&ids);
        Ok(ids)
    }

    /// Remove from every other buffer the BSSIDs present in `id`.
    pub fn dedup_against_chain(&self, id: NodeId) -> usize {
        self.lock().dedup(&[id])
    }

    /// Remove every record for `bssid`, except those in `skip`. Buffers
    /// left empty are released. Returns the number of records removed.
    pub fn remove_bssid(&self, bssid: &[u8; 6], skip: Option<NodeId>) -> usize {
        self.lock().remove_bssid(bssid, skip.as_slice())
    }

    /// Release one buffer. Returns false for a stale id.
    pub fn free(&self, id: NodeId) -> bool {
        self.lock().release(id)
    }

    /// Release every buffer. The session state is unchanged.
    pub fn free_all(&self) -> usize {
        self.lock().release_all()
    }

    /// Live buffers, oldest first.
    pub fn nodes(&self) -> Vec<NodeId> {
        self.lock().live()
    }

    /// Number of live buffers.
    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().order.is_empty()
    }

    /// Records in one buffer.
    pub fn node_records(&self, id: NodeId) -> Option<Vec<Vec<u8>>> {
        let arena = self.lock();
        let buf = arena.get(id)?;
        Some(
            RecordIter::new(records_of(buf), BSS_LAYOUT)
                .with_count(record_count(buf))
                .map(<[u8]>::to_vec)
                .collect(),
        )
    }

    /// Every cached access point, oldest buffer first.
    pub fn bss_list(&self) -> Vec<ScanEntry> {
        let arena = self.lock();
        let mut out = Vec::new();
        for &slot in &arena.order {
            let node = arena.id_of(slot);
            let Some(buf) = arena.get(node) else {
                continue;
            };
            for raw in RecordIter::new(records_of(buf), BSS_LAYOUT).with_count(record_count(buf)) {
                if let Ok(bss) = BssRecord::parse(raw) {
                    out.push(ScanEntry {
                        node,
                        bssid: bss.bssid(),
                        ssid: bss.ssid(),
                        rssi: bss.rssi(),
                        chanspec: bss.chanspec(),
                    });
                }
            }
        }
        out
    }

    /// Human-readable dump of the chain.
    pub fn print_cache(&self) -> String {
        let arena = self.lock();
        let mut out = String::new();
        for (i, &slot) in arena.order.iter().enumerate() {
            let Some(buf) = arena.get(arena.id_of(slot)) else {
                continue;
            };
            let count = record_count(buf);
            out.push_str(&format!("node {i}: {count} bss, {} bytes\n", buf.len()));
            for raw in RecordIter::new(records_of(buf), BSS_LAYOUT).with_count(count) {
                if let Ok(bss) = BssRecord::parse(raw) {
                    out.push_str("  ");
                    out.push_str(&describe(&bss));
                    out.push('\n');
                }
            }
        }
        out
    }
}

// ============================================================================
// Firmware side
// ============================================================================

/// Told when a scan finishes.
pub trait ScanNotifier: Send + Sync {
    fn scan_confirm(&self, success: bool);
}

/// Size of the `iscan` request.
pub const ISCAN_PARAMS_LEN: usize = 76;

/// Encode an `iscan` request: a broadcast, any-BSS, active scan with
/// firmware default timings on all channels.
pub fn iscan_params(action: u16) -> Vec<u8> {
    let mut p = Vec::with_capacity(ISCAN_PARAMS_LEN);
    p.extend_from_slice(&ISCAN_REQ_VERSION.to_le_bytes());
    p.extend_from_slice(&action.to_le_bytes());
    p.extend_from_slice(&0u16.to_le_bytes()); // scan_duration
    p.extend_from_slice(&[0u8; 36]); // ssid: len + 32 bytes
    p.extend_from_slice(&ETHER_BCAST);
    p.push(2); // bss_type: any
    p.push(0); // scan_type: active
    for _ in 0..4 {
        // nprobes, active_time, passive_time, home_time
        p.extend_from_slice(&(-1i32).to_le_bytes());
    }
    p.extend_from_slice(&0i32.to_le_bytes()); // channel_num
    p.resize(ISCAN_PARAMS_LEN, 0);
    p
}

/// Incremental scan requester.
pub struct Iscan<T> {
    transport: T,
    cache: Arc<ScanCache>,
    notifier: Option<Arc<dyn ScanNotifier>>,
}

impl<T: Transport> Iscan<T> {
    pub fn new(transport: T, cache: Arc<ScanCache>) -> Self {
        Self {
            transport,
            cache,
            notifier: None,
        }
    }

    /// Report scan completion to `notifier`.
    pub fn with_notifier(mut self, notifier: Arc<dyn ScanNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn cache(&self) -> &Arc<ScanCache> {
        &self.cache
    }

    /// Send a raw scan action.
    pub fn request(&self, action: u16) -> Result<()> {
        self.transport.set_var("iscan", &iscan_params(action))
    }

    /// Start a fresh scan.
    pub fn start(&self) -> Result<()> {
        self.cache.start_session();
        self.request(scan_action::START)
    }

    /// Stop the scan and drop cached results.
    pub fn abort(&self) -> Result<()> {
        self.cache.abort();
        self.request(scan_action::ABORT)
    }

    fn confirm(&self, success: bool) {
        if let Some(n) = &self.notifier {
            n.scan_confirm(success);
        }
    }

    /// Pull the next batch of results into the cache.
    ///
    /// If no buffer can be reserved the scan is abandoned: the cache is
    /// aborted, the firmware is told to abort and the notifier sees a
    /// failed scan.
    pub fn get_partial_result(&self) -> Result<ScanStatus> {
        let id = match self.cache.reserve() {
            Ok(id) => id,
            Err(e @ Error::NoMemory(_)) => {
                tracing::error!(error = %e, "no buffer for scan results, aborting scan");
                self.cache.abort();
                if let Err(abort) = self.request(scan_action::ABORT) {
                    tracing::warn!(error = %abort, "scan abort failed");
                }
                self.confirm(false);
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let query = ScanResultsHeader {
            status: U32::new(0),
            buflen: U32::new(WLC_IW_ISCAN_MAXLEN as u32),
            version: U32::new(0),
            count: U32::new(0),
        };
        let mut out = vec![0u8; WLC_IW_ISCAN_MAXLEN];
        let len = match self
            .transport
            .get_var("iscanresults", query.as_bytes(), &mut out)
        {
            Ok(len) => len,
            Err(e) => {
                self.cache.free(id);
                return Err(e);
            }
        };

        let status = ScanResultsHeader::ref_from_prefix(&out[..len])
            .map(|(h, _)| h.status())
            .unwrap_or(ScanStatus::Pending);
        let count = self.cache.commit(id, &out[..len])?;
        tracing::debug!(?status, count, nodes = self.cache.len(), "scan results");

        match status {
            ScanStatus::Success => self.confirm(true),
            ScanStatus::Aborted | ScanStatus::NoMem => {
                self.cache.free_all();
                self.confirm(false);
            }
            _ => {}
        }
        Ok(status)
    }
}

impl<T> std::fmt::Debug for Iscan<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Iscan")
            .field("cache", &self.cache)
            .field("notifier", &self.notifier.is_some())
            .finish()
    }
}
