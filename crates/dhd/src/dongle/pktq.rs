//! Multi-precedence packet queue with policy-driven eviction.
//!
//! A [`PktQ`] holds one FIFO per precedence class, each with its own limit,
//! plus a limit on the total. Higher precedence numbers are more important:
//! [`PktQ::deq`] serves them first and [`PktQ::prec_enq`] never evicts one to
//! make room for a less important packet.
//!
//! # Example
//!
//! ```ignore
//! use dhd::dongle::pktq::{DiscardPolicy, Enqueue, PktQ};
//!
//! let mut q = PktQ::new(4, 64);
//! let policy = DiscardPolicy::all_oldest();
//! match q.prec_enq(pkt, 2, policy) {
//!     Enqueue::Accepted => {}
//!     Enqueue::AcceptedEvicting(old) => drop(old),
//!     Enqueue::Rejected(pkt) => drop(pkt),
//! }
//! ```

use std::collections::VecDeque;

/// Largest number of precedence classes.
pub const PKTQ_MAX_PREC: usize = 16;

/// Per-precedence discard policy: a set bit means "discard oldest" for that
/// precedence, a clear bit means "keep oldest, refuse the newcomer".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscardPolicy(u16);

impl DiscardPolicy {
    /// Keep the oldest packet at every precedence.
    pub const fn all_newest() -> Self {
        Self(0)
    }

    /// Discard the oldest packet at every precedence.
    pub const fn all_oldest() -> Self {
        Self(u16::MAX)
    }

    /// Build from a raw bitmap.
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Raw bitmap.
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Discard oldest at `prec`.
    pub fn with_oldest(mut self, prec: usize) -> Self {
        if prec < PKTQ_MAX_PREC {
            self.0 |= 1 << prec;
        }
        self
    }

    /// Check if `prec` discards its oldest packet when evicting.
    pub fn discard_oldest(self, prec: usize) -> bool {
        prec < PKTQ_MAX_PREC && self.0 & (1 << prec) != 0
    }
}

/// Outcome of [`PktQ::prec_enq`].
///
/// Packets that do not stay in the queue are handed back to the caller.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "evicted and rejected packets are returned to the caller"]
pub enum Enqueue<P> {
    /// Queued without displacing anything.
    Accepted,
    /// Queued after evicting the returned packet.
    AcceptedEvicting(P),
    /// Not queued.
    Rejected(P),
}

impl<P> Enqueue<P> {
    /// Check if the packet was queued.
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Enqueue::Rejected(_))
    }
}

#[derive(Debug, Clone)]
struct PrecQ<P> {
    q: VecDeque<P>,
    max: usize,
}

/// A bounded multi-precedence queue.
#[derive(Debug, Clone)]
pub struct PktQ<P> {
    precs: Vec<PrecQ<P>>,
    len: usize,
    max: usize,
}

impl<P> PktQ<P> {
    /// Create a queue with `num_prec` classes (at most [`PKTQ_MAX_PREC`])
    /// holding at most `max_len` packets. Each class may initially use the
    /// whole capacity.
    pub fn new(num_prec: usize, max_len: usize) -> Self {
        let num_prec = num_prec.clamp(1, PKTQ_MAX_PREC);
        Self {
            precs: (0..num_prec)
                .map(|_| PrecQ {
                    q: VecDeque::new(),
                    max: max_len,
                })
                .collect(),
            len: 0,
            max: max_len,
        }
    }

    /// Limit precedence `prec` to `limit` packets.
    pub fn set_prec_limit(&mut self, prec: usize, limit: usize) {
        if let Some(pq) = self.precs.get_mut(prec) {
            pq.max = limit;
        }
    }

    /// Builder form of [`set_prec_limit`](Self::set_prec_limit).
    pub fn prec_limit(mut self, prec: usize, limit: usize) -> Self {
        self.set_prec_limit(prec, limit);
        self
    }

    /// Number of precedence classes.
    pub fn num_prec(&self) -> usize {
        self.precs.len()
    }

    /// Total capacity.
    pub fn max_len(&self) -> usize {
        self.max
    }

    /// Packets queued across all precedences.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the queue holds no packets.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Check if the total capacity is used up.
    pub fn is_full(&self) -> bool {
        self.len >= self.max
    }

    /// Packets queued at `prec`.
    pub fn prec_len(&self, prec: usize) -> usize {
        self.precs.get(prec).map_or(0, |pq| pq.q.len())
    }

    /// Check if `prec` has reached its limit. Unknown precedences are full.
    pub fn prec_full(&self, prec: usize) -> bool {
        self.precs.get(prec).is_none_or(|pq| pq.q.len() >= pq.max)
    }

    /// Append `pkt` at `prec`, handing it back if either limit is reached.
    pub fn penq(&mut self, prec: usize, pkt: P) -> Result<(), P> {
        if self.is_full() || self.prec_full(prec) {
            return Err(pkt);
        }
        self.precs[prec].q.push_back(pkt);
        self.len += 1;
        Ok(())
    }

    /// Remove the oldest packet at `prec`.
    pub fn pdeq(&mut self, prec: usize) -> Option<P> {
        let pkt = self.precs.get_mut(prec)?.q.pop_front()?;
        self.len -= 1;
        Some(pkt)
    }

    /// Remove the newest packet at `prec`.
    pub fn pdeq_tail(&mut self, prec: usize) -> Option<P> {
        let pkt = self.precs.get_mut(prec)?.q.pop_back()?;
        self.len -= 1;
        Some(pkt)
    }

    /// Remove the oldest packet of the highest non-empty precedence.
    pub fn deq(&mut self) -> Option<(usize, P)> {
        let prec = self.precs.iter().rposition(|pq| !pq.q.is_empty())?;
        self.pdeq(prec).map(|pkt| (prec, pkt))
    }

    /// The packet that occupies the tail slot: the newest packet of the
    /// lowest non-empty precedence.
    pub fn peek_tail(&self) -> Option<(usize, &P)> {
        self.precs
            .iter()
            .enumerate()
            .find_map(|(prec, pq)| pq.q.back().map(|pkt| (prec, pkt)))
    }

    /// Packets at `prec`, oldest first.
    pub fn iter_prec(&self, prec: usize) -> impl Iterator<Item = &P> {
        self.precs.get(prec).into_iter().flat_map(|pq| pq.q.iter())
    }

    /// Remove every packet.
    pub fn flush(&mut self) -> Vec<P> {
        self.len = 0;
        self.precs
            .iter_mut()
            .flat_map(|pq| pq.q.drain(..))
            .collect()
    }

    /// Enqueue under congestion.
    ///
    /// When neither limit is hit the packet is simply queued. Otherwise a
    /// victim precedence is chosen: `prec` itself if its own limit is hit,
    /// else the precedence owning the tail slot. A victim precedence above
    /// `prec` means the newcomer is refused. Within the victim precedence the
    /// discard policy picks the oldest or newest packet; when the victim
    /// precedence is `prec` and the policy keeps the oldest, the newcomer is
    /// refused instead.
    pub fn prec_enq(&mut self, pkt: P, prec: usize, policy: DiscardPolicy) -> Enqueue<P> {
        if prec >= self.num_prec() {
            tracing::warn!(prec, num_prec = self.num_prec(), "enqueue to unknown precedence");
            return Enqueue::Rejected(pkt);
        }

        if !self.prec_full(prec) && !self.is_full() {
            return match self.penq(prec, pkt) {
                Ok(()) => Enqueue::Accepted,
                Err(pkt) => Enqueue::Rejected(pkt),
            };
        }

        let eprec = if self.prec_full(prec) {
            prec
        } else {
            match self.peek_tail() {
                Some((eprec, _)) if eprec <= prec => eprec,
                _ => return Enqueue::Rejected(pkt),
            }
        };

        let discard_oldest = policy.discard_oldest(eprec);
        if eprec == prec && !discard_oldest {
            return Enqueue::Rejected(pkt);
        }

        let evicted = if discard_oldest {
            self.pdeq(eprec)
        } else {
            self.pdeq_tail(eprec)
        };
        let Some(evicted) = evicted else {
            // a zero-length precedence is full and has nothing to give
            return Enqueue::Rejected(pkt);
        };
        tracing::trace!(prec, eprec, discard_oldest, "evicted packet");

        match self.penq(prec, pkt) {
            Ok(()) => Enqueue::AcceptedEvicting(evicted),
            Err(pkt) => {
                tracing::error!(prec, "enqueue failed after eviction");
                if discard_oldest {
                    self.precs[eprec].q.push_front(evicted);
                } else {
                    self.precs[eprec].q.push_back(evicted);
                }
                self.len += 1;
                Enqueue::Rejected(pkt)
            }
        }
    }
}
