//! Walking packed sequences of self-describing, variable-length records.
//!
//! Scan results (`wl_bss_info` records), 802.11 information elements and
//! event payloads are all laid out the same way: each record carries its own
//! length and the next record starts right after it. [`RecordIter`] walks such
//! a buffer without copying and stops at the first record whose length field
//! is zero, too small, or runs past the end of the buffer. Once a walk has
//! stopped on a fault the remaining bytes are treated as absent.

use super::error::{Error, Result};

/// Width of a record's length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LenWidth {
    U8,
    U16,
    U32,
}

impl LenWidth {
    fn size(self) -> usize {
        match self {
            LenWidth::U8 => 1,
            LenWidth::U16 => 2,
            LenWidth::U32 => 4,
        }
    }
}

/// Where a record keeps its length and how to interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    /// Byte offset of the length field inside the record.
    pub len_offset: usize,
    /// Width of the length field.
    pub len_width: LenWidth,
    /// Length field is big-endian (otherwise dongle order, little-endian).
    pub big_endian: bool,
    /// Bytes to add to the length value to get the full record size
    /// (for formats whose length excludes the header).
    pub len_bias: usize,
    /// Smallest valid record, header included.
    pub min_len: usize,
}

impl RecordLayout {
    /// 802.11 information element: `id: u8, len: u8, data[len]`.
    pub const IE: Self = Self {
        len_offset: 1,
        len_width: LenWidth::U8,
        big_endian: false,
        len_bias: 2,
        min_len: 2,
    };

    /// Read the full size of the record starting at `data[0]`.
    ///
    /// Returns `None` if the length field itself does not fit.
    pub fn record_len(&self, data: &[u8]) -> Option<usize> {
        let end = self.len_offset + self.len_width.size();
        let raw = data.get(self.len_offset..end)?;
        let value = match (self.len_width, self.big_endian) {
            (LenWidth::U8, _) => raw[0] as usize,
            (LenWidth::U16, false) => u16::from_le_bytes([raw[0], raw[1]]) as usize,
            (LenWidth::U16, true) => u16::from_be_bytes([raw[0], raw[1]]) as usize,
            (LenWidth::U32, false) => u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize,
            (LenWidth::U32, true) => u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize,
        };
        value.checked_add(self.len_bias)
    }
}

/// Why a walk stopped before consuming the whole buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFault {
    /// Bytes remained but not enough for a length field.
    ShortHeader { offset: usize },
    /// Self-reported length was zero.
    ZeroLength { offset: usize },
    /// Self-reported length was smaller than the record header.
    Undersized { offset: usize, len: usize },
    /// Self-reported length runs past the end of the buffer.
    Overrun { offset: usize, len: usize },
}

impl From<RecordFault> for Error {
    fn from(fault: RecordFault) -> Self {
        Error::Parse(format!("malformed record sequence: {fault:?}"))
    }
}

/// Compute the offset of the record following the one at `offset`.
///
/// Returns `Ok(None)` when the record at `offset` is the last one in `buf`,
/// and a fault when its length field cannot be trusted.
pub fn next_offset(
    buf: &[u8],
    offset: usize,
    layout: &RecordLayout,
) -> std::result::Result<Option<usize>, RecordFault> {
    let rest = buf.get(offset..).unwrap_or(&[]);
    let len = layout
        .record_len(rest)
        .ok_or(RecordFault::ShortHeader { offset })?;
    if len == 0 {
        return Err(RecordFault::ZeroLength { offset });
    }
    if len < layout.min_len {
        return Err(RecordFault::Undersized { offset, len });
    }
    if len > rest.len() {
        return Err(RecordFault::Overrun { offset, len });
    }
    let next = offset + len;
    Ok(if next >= buf.len() { None } else { Some(next) })
}

/// Iterator over the records in a packed buffer.
#[derive(Debug, Clone)]
pub struct RecordIter<'a> {
    data: &'a [u8],
    offset: usize,
    layout: RecordLayout,
    remaining: Option<usize>,
    fault: Option<RecordFault>,
}

impl<'a> RecordIter<'a> {
    /// Create a new iterator over `data`.
    pub fn new(data: &'a [u8], layout: RecordLayout) -> Self {
        Self {
            data,
            offset: 0,
            layout,
            remaining: None,
            fault: None,
        }
    }

    /// Yield at most `count` records (the sequence header's record count).
    pub fn with_count(mut self, count: usize) -> Self {
        self.remaining = Some(count);
        self
    }

    /// Offset of the next record relative to the start of the buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The fault that stopped the walk, if any.
    pub fn fault(&self) -> Option<RecordFault> {
        self.fault
    }

    /// Check if there are no more records.
    pub fn is_empty(&self) -> bool {
        self.fault.is_some() || self.remaining == Some(0) || self.offset >= self.data.len()
    }

    /// Collect every record, failing if the walk stopped on a fault.
    pub fn collect_checked(mut self) -> Result<Vec<&'a [u8]>> {
        let records: Vec<_> = self.by_ref().collect();
        match self.fault {
            Some(fault) => Err(fault.into()),
            None => Ok(records),
        }
    }
}

impl<'a> Iterator for RecordIter<'a> {
    /// The complete record, header included.
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_empty() {
            return None;
        }

        let start = self.offset;
        match next_offset(self.data, start, &self.layout) {
            Ok(next) => {
                let end = next.unwrap_or(self.data.len());
                let len = self
                    .layout
                    .record_len(&self.data[start..])
                    .unwrap_or(end - start);
                self.offset = start + len;
                if let Some(n) = self.remaining.as_mut() {
                    *n -= 1;
                }
                Some(&self.data[start..start + len])
            }
            Err(fault) => {
                tracing::debug!(?fault, "record walk stopped");
                self.fault = Some(fault);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LE32_AT4: RecordLayout = RecordLayout {
        len_offset: 4,
        len_width: LenWidth::U32,
        big_endian: false,
        len_bias: 0,
        min_len: 8,
    };

    fn record(tag: u32, len: u32) -> Vec<u8> {
        let mut r = Vec::new();
        r.extend_from_slice(&tag.to_le_bytes());
        r.extend_from_slice(&len.to_le_bytes());
        r.resize(len as usize, 0xaa);
        r
    }

    #[test]
    fn test_walks_all_records() {
        let mut buf = record(1, 8);
        buf.extend(record(2, 12));
        buf.extend(record(3, 16));

        let mut iter = RecordIter::new(&buf, LE32_AT4);
        let lens: Vec<usize> = iter.by_ref().map(|r| r.len()).collect();
        assert_eq!(lens, vec![8, 12, 16]);
        assert!(iter.fault().is_none());
    }

    #[test]
    fn test_stops_on_zero_length() {
        let mut buf = record(1, 8);
        buf.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0]);
        buf.extend(record(3, 8));

        let mut iter = RecordIter::new(&buf, LE32_AT4);
        assert_eq!(iter.by_ref().count(), 1);
        assert_eq!(iter.fault(), Some(RecordFault::ZeroLength { offset: 8 }));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_stops_on_overrun() {
        let mut buf = record(1, 8);
        let mut bad = record(2, 8);
        bad[4..8].copy_from_slice(&64u32.to_le_bytes());
        buf.extend(bad);

        let iter = RecordIter::new(&buf, LE32_AT4);
        let err = iter.collect_checked().unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_stops_on_undersized() {
        let mut buf = record(1, 8);
        buf.extend_from_slice(&2u32.to_le_bytes());
        buf.extend_from_slice(&4u32.to_le_bytes());

        let mut iter = RecordIter::new(&buf, LE32_AT4);
        assert_eq!(iter.by_ref().count(), 1);
        assert_eq!(
            iter.fault(),
            Some(RecordFault::Undersized { offset: 8, len: 4 })
        );
    }

    #[test]
    fn test_respects_count() {
        let mut buf = record(1, 8);
        buf.extend(record(2, 8));
        let iter = RecordIter::new(&buf, LE32_AT4).with_count(1);
        assert_eq!(iter.count(), 1);
    }

    #[test]
    fn test_ie_layout() {
        // an empty IE is still a two-byte record
        let buf = [0u8, 2, b'a', b'b', 0, 0, 3, 1, 6];
        let ies: Vec<_> = RecordIter::new(&buf, RecordLayout::IE).collect();
        assert_eq!(ies.len(), 3);
        assert_eq!(ies[0], &[0, 2, b'a', b'b']);
        assert_eq!(ies[1], &[0, 0]);
        assert_eq!(ies[2], &[3, 1, 6]);
    }

    #[test]
    fn test_next_offset() {
        let mut buf = record(1, 8);
        buf.extend(record(2, 8));
        assert_eq!(next_offset(&buf, 0, &LE32_AT4), Ok(Some(8)));
        assert_eq!(next_offset(&buf, 8, &LE32_AT4), Ok(None));
        assert_eq!(
            next_offset(&buf, 14, &LE32_AT4),
            Err(RecordFault::ShortHeader { offset: 14 })
        );
    }
}
