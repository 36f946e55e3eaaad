//! Parser combinators for dongle wire payloads.
//!
//! Fixed headers are cast with zerocopy; variable payloads (interface
//! events, firmware trace records, scan parameters) are parsed here with
//! winnow.

use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;

use super::error::{Error, Result};

/// Result type for winnow parsers.
pub type PResult<T> = core::result::Result<T, ErrMode<ContextError>>;

/// Types that can be parsed from a dongle payload.
pub trait FromDongle: Sized {
    /// Parse from a mutable byte slice reference.
    /// The slice is advanced past the consumed bytes.
    fn parse(input: &mut &[u8]) -> PResult<Self>;

    /// Parse from the front of `data`, ignoring trailing bytes.
    fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut input = data;
        Self::parse(&mut input).map_err(|e| Error::Parse(format!("{}", e)))
    }

    /// Parse `data`, requiring every byte to be consumed.
    fn from_bytes_exact(data: &[u8]) -> Result<Self> {
        Self::parse
            .parse(data)
            .map_err(|e| Error::Parse(format!("{}", e)))
    }
}

/// Fail the current parse without backtracking.
pub fn cut<T>() -> PResult<T> {
    Err(ErrMode::Cut(ContextError::new()))
}

/// Extract the string before the first NUL.
pub fn parse_cstr(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use winnow::binary::{be_u16, le_u8};

    #[derive(Debug, PartialEq)]
    struct Pair {
        tag: u8,
        value: u16,
    }

    impl FromDongle for Pair {
        fn parse(input: &mut &[u8]) -> PResult<Self> {
            let tag = le_u8.parse_next(input)?;
            if tag == 0 {
                return cut();
            }
            let value = be_u16.parse_next(input)?;
            Ok(Self { tag, value })
        }
    }

    #[test]
    fn test_from_bytes() {
        let pair = Pair::from_bytes(&[1, 0x01, 0x02, 0xff]).unwrap();
        assert_eq!(pair, Pair { tag: 1, value: 0x0102 });
        assert!(Pair::from_bytes_exact(&[1, 0x01, 0x02, 0xff]).is_err());
        assert!(Pair::from_bytes(&[0, 1, 2]).is_err());
        assert!(Pair::from_bytes(&[1, 2]).is_err());
    }

    #[test]
    fn test_parse_cstr() {
        assert_eq!(parse_cstr(b"wl0\0junk"), "wl0");
        assert_eq!(parse_cstr(b"abc"), "abc");
    }
}
