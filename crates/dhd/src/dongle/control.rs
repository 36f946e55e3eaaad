//! Async control channel.
//!
//! Requests go to the dongle as a 16-byte header followed by the argument
//! buffer. The header's flags carry the interface index and a 16-bit request
//! id; the reply echoes the id, which is how [`ControlChannel::complete`]
//! matches it to the waiting caller. A caller waits at most the context's
//! ioctl timeout; on expiry the id is retired and a late reply carrying it is
//! dropped.
//!
//! ```ignore
//! let (chan, mut outgoing) = ControlChannel::new(ctx);
//! tokio::spawn(async move {
//!     while let Some(frame) = outgoing.recv().await {
//!         bus.send(&frame).await?;
//!     }
//! });
//! // elsewhere, for every control frame read from the bus:
//! chan.complete(&reply);
//! let ver = chan.get_var("ver", &[], 64).await?;
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use zerocopy::byteorder::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::context::DriverContext;
use super::error::{Error, Result};
use super::iovar::{IovarBuilder, mkiovar};
use super::wlc::{WLC_IOCTL_MAXLEN, wlc_cmd};

/// Control message header.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct CdcHeader {
    pub cmd: U32,
    /// Argument bytes following the header.
    pub len: U32,
    pub flags: U32,
    /// Firmware status of a reply.
    pub status: U32,
}

/// Size of [`CdcHeader`].
pub const CDC_HEADER_LEN: usize = std::mem::size_of::<CdcHeader>();

/// Reply carries an error status.
pub const CDCF_IOC_ERROR: u32 = 0x01;
/// Request is a SET.
pub const CDCF_IOC_SET: u32 = 0x02;
pub const CDCF_IOC_IF_MASK: u32 = 0xf000;
pub const CDCF_IOC_IF_SHIFT: u32 = 12;
pub const CDCF_IOC_ID_SHIFT: u32 = 16;

impl CdcHeader {
    /// Header for request `id`.
    pub fn request(id: u16, ifidx: u8, cmd: u32, len: usize, set: bool) -> Self {
        let mut flags = (u32::from(id) << CDCF_IOC_ID_SHIFT)
            | ((u32::from(ifidx) << CDCF_IOC_IF_SHIFT) & CDCF_IOC_IF_MASK);
        if set {
            flags |= CDCF_IOC_SET;
        }
        Self {
            cmd: U32::new(cmd),
            len: U32::new(len as u32),
            flags: U32::new(flags),
            status: U32::new(0),
        }
    }

    pub fn id(&self) -> u16 {
        (self.flags.get() >> CDCF_IOC_ID_SHIFT) as u16
    }

    pub fn ifidx(&self) -> u8 {
        ((self.flags.get() & CDCF_IOC_IF_MASK) >> CDCF_IOC_IF_SHIFT) as u8
    }

    pub fn is_set(&self) -> bool {
        self.flags.get() & CDCF_IOC_SET != 0
    }

    pub fn is_error(&self) -> bool {
        self.flags.get() & CDCF_IOC_ERROR != 0
    }
}

/// Encode a reply frame, as the dongle would send it.
pub fn reply_frame(request: &CdcHeader, status: i32, payload: &[u8]) -> Vec<u8> {
    let mut flags = request.flags.get();
    if status != 0 {
        flags |= CDCF_IOC_ERROR;
    }
    let hdr = CdcHeader {
        cmd: request.cmd,
        len: U32::new(payload.len() as u32),
        flags: U32::new(flags),
        status: U32::new(status as u32),
    };
    let mut out = Vec::with_capacity(CDC_HEADER_LEN + payload.len());
    out.extend_from_slice(hdr.as_bytes());
    out.extend_from_slice(payload);
    out
}

#[derive(Debug, Default)]
struct Pending {
    next_id: u16,
    /// Bumped per request so a waiter only ever removes its own entry.
    next_ticket: u64,
    waiters: HashMap<u16, (u64, oneshot::Sender<Bytes>)>,
}

impl Pending {
    /// Next id not held by a waiting request.
    fn allocate(&mut self) -> Result<u16> {
        for _ in 0..=u16::MAX {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            if !self.waiters.contains_key(&id) {
                return Ok(id);
            }
        }
        Err(Error::NoMemory(format!(
            "all {} control request ids in use",
            self.waiters.len()
        )))
    }

    fn register(&mut self, done: oneshot::Sender<Bytes>) -> Result<(u16, u64)> {
        let id = self.allocate()?;
        let ticket = self.next_ticket;
        self.next_ticket = self.next_ticket.wrapping_add(1);
        self.waiters.insert(id, (ticket, done));
        Ok((id, ticket))
    }
}

/// Removes a request's waiter when the request finishes, times out or is
/// cancelled.
struct WaiterGuard<'a> {
    pending: &'a Mutex<Pending>,
    id: u16,
    ticket: u64,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.waiters.get(&self.id).is_some_and(|(t, _)| *t == self.ticket) {
            pending.waiters.remove(&self.id);
        }
    }
}

/// Sequence-numbered request/reply matching over an outgoing frame queue.
#[derive(Debug)]
pub struct ControlChannel {
    ctx: Arc<DriverContext>,
    pending: Mutex<Pending>,
    tx: mpsc::UnboundedSender<Bytes>,
}

impl ControlChannel {
    /// Create a channel. Frames to send to the dongle appear on the returned
    /// receiver.
    pub fn new(ctx: Arc<DriverContext>) -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let chan = Self {
            ctx,
            pending: Mutex::new(Pending::default()),
            tx,
        };
        (chan, rx)
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of requests waiting for a reply.
    pub fn pending(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Send `cmd` and wait for its reply payload.
    ///
    /// The reply is at most `buf.len()` bytes for GETs. A firmware error
    /// status is returned as the matching [`Error`].
    pub async fn request(&self, ifidx: u8, cmd: u32, buf: &[u8], set: bool) -> Result<Bytes> {
        if buf.len() > WLC_IOCTL_MAXLEN {
            return Err(Error::BadArg(format!(
                "control buffer {} exceeds {WLC_IOCTL_MAXLEN}",
                buf.len()
            )));
        }

        let (done, wait) = oneshot::channel();
        let (id, ticket) = self.lock().register(done)?;
        let _guard = WaiterGuard {
            pending: &self.pending,
            id,
            ticket,
        };

        let hdr = CdcHeader::request(id, ifidx, cmd, buf.len(), set);
        let mut frame = Vec::with_capacity(CDC_HEADER_LEN + buf.len());
        frame.extend_from_slice(hdr.as_bytes());
        frame.extend_from_slice(buf);
        if self.tx.send(Bytes::from(frame)).is_err() {
            self.ctx.with(|s| s.bus.tx_ctlerrs += 1);
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "control channel closed",
            )));
        }
        self.ctx.with(|s| s.bus.tx_ctlpkts += 1);
        tracing::trace!(id, cmd, set, len = buf.len(), "control request");

        let timeout = self.ctx.ioctl_timeout();
        let reply = match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionAborted,
                    "control reply dropped",
                )));
            }
            Err(_) => {
                tracing::warn!(id, cmd, ?timeout, "control request timed out");
                return Err(Error::Timeout { seq: id, timeout });
            }
        };

        let (hdr, payload) = CdcHeader::ref_from_prefix(&reply).map_err(|_| Error::Truncated {
            expected: CDC_HEADER_LEN,
            actual: reply.len(),
        })?;
        if hdr.is_error() {
            let status = hdr.status.get() as i32;
            self.ctx.record_bcmerror(status);
            return Err(Error::from_code(status));
        }
        let len = (hdr.len.get() as usize).min(payload.len()).min(buf.len());
        let start = CDC_HEADER_LEN;
        Ok(reply.slice(start..start + len))
    }

    /// Hand a reply frame from the dongle to its waiting request.
    ///
    /// Returns false for frames that match no waiting request (for example
    /// a reply to a request that already timed out).
    pub fn complete(&self, reply: &[u8]) -> bool {
        let Ok((hdr, _)) = CdcHeader::ref_from_prefix(reply) else {
            tracing::warn!(len = reply.len(), "short control reply");
            self.ctx.with(|s| s.bus.rx_ctlerrs += 1);
            return false;
        };
        let id = hdr.id();
        let Some((_, waiter)) = self.lock().waiters.remove(&id) else {
            tracing::debug!(id, "control reply with no waiter dropped");
            return false;
        };
        self.ctx.with(|s| s.bus.rx_ctlpkts += 1);
        waiter.send(Bytes::copy_from_slice(reply)).is_ok()
    }

    /// Read firmware variable `name`, reserving `out_len` reply bytes.
    pub async fn get_var(&self, name: &str, params: &[u8], out_len: usize) -> Result<Bytes> {
        let mut buf = vec![0u8; (name.len() + 1 + params.len()).max(out_len)];
        mkiovar(name, params, &mut buf)?;
        self.request(0, wlc_cmd::GET_VAR, &buf, false)
            .await
            .map_err(|e| e.with_context(format!("get {name}")))
    }

    /// Set firmware variable `name`.
    pub async fn set_var(&self, name: &str, data: &[u8]) -> Result<()> {
        let buf = IovarBuilder::new(name).append_bytes(data).build();
        self.request(0, wlc_cmd::SET_VAR, &buf, true)
            .await
            .map(|_| ())
            .map_err(|e| e.with_context(format!("set {name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dongle::config::DriverConfig;
    use crate::dongle::error::bcme;
    use std::time::Duration;

    fn channel(timeout_ms: u32) -> (Arc<ControlChannel>, mpsc::UnboundedReceiver<Bytes>) {
        let ctx = Arc::new(DriverContext::new(
            DriverConfig::new().ioctl_timeout_ms(timeout_ms),
        ));
        let (chan, rx) = ControlChannel::new(ctx);
        (Arc::new(chan), rx)
    }

    #[test]
    fn test_header_flags() {
        let hdr = CdcHeader::request(0x1234, 2, wlc_cmd::SET_VAR, 10, true);
        assert_eq!(hdr.id(), 0x1234);
        assert_eq!(hdr.ifidx(), 2);
        assert!(hdr.is_set());
        assert!(!hdr.is_error());
        assert_eq!(CDC_HEADER_LEN, 16);
    }

    #[test]
    fn test_ids_skip_pending() {
        let mut p = Pending {
            next_id: u16::MAX,
            ..Default::default()
        };
        let (tx, _rx) = oneshot::channel();
        p.waiters.insert(0, (0, tx));
        assert_eq!(p.allocate().unwrap(), u16::MAX);
        assert_eq!(p.allocate().unwrap(), 1);
    }

    #[test]
    fn test_ids_exhausted() {
        let mut p = Pending::default();
        for id in 0..=u16::MAX {
            let (tx, _rx) = oneshot::channel();
            p.waiters.insert(id, (0, tx));
        }
        let err = p.allocate().unwrap_err();
        assert!(matches!(err, Error::NoMemory(_)));

        p.waiters.remove(&7);
        assert_eq!(p.allocate().unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_request_releases_id() {
        let (chan, mut rx) = channel(1000);
        let cancelled = tokio::time::timeout(
            Duration::from_millis(10),
            chan.set_var("mpc", &[0, 0, 0, 0]),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(chan.pending(), 0);

        let frame = rx.recv().await.unwrap();
        let (hdr, _) = CdcHeader::ref_from_prefix(&frame).unwrap();
        assert!(!chan.complete(&reply_frame(hdr, 0, &[])));
    }

    #[tokio::test]
    async fn test_request_reply() {
        let (chan, mut rx) = channel(1000);
        let responder = {
            let chan = chan.clone();
            tokio::spawn(async move {
                let frame = rx.recv().await.unwrap();
                let (hdr, _) = CdcHeader::ref_from_prefix(&frame).unwrap();
                assert!(!hdr.is_set());
                assert!(chan.complete(&reply_frame(hdr, 0, b"wl0: 4.218\0")));
            })
        };
        let reply = chan.get_var("ver", &[], 64).await.unwrap();
        assert_eq!(&reply[..], b"wl0: 4.218\0");
        responder.await.unwrap();
        assert_eq!(chan.pending(), 0);
    }

    #[tokio::test]
    async fn test_error_status() {
        let (chan, mut rx) = channel(1000);
        let responder = {
            let chan = chan.clone();
            tokio::spawn(async move {
                let frame = rx.recv().await.unwrap();
                let (hdr, _) = CdcHeader::ref_from_prefix(&frame).unwrap();
                chan.complete(&reply_frame(hdr, bcme::NOTUP, &[]));
            })
        };
        let err = chan.set_var("mpc", &[0, 0, 0, 0]).await.unwrap_err();
        assert!(err.is_not_up());
        responder.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_retires_id() {
        let (chan, mut rx) = channel(50);
        let err = chan.set_var("mpc", &[0, 0, 0, 0]).await.unwrap_err();
        let Error::Timeout { seq, timeout } = err else {
            panic!("expected timeout, got {err:?}");
        };
        assert_eq!(timeout, Duration::from_millis(50));
        assert_eq!(chan.pending(), 0);

        // the late reply finds nobody waiting
        let frame = rx.recv().await.unwrap();
        let (hdr, _) = CdcHeader::ref_from_prefix(&frame).unwrap();
        assert_eq!(hdr.id(), seq);
        assert!(!chan.complete(&reply_frame(hdr, 0, &[])));
    }
}
