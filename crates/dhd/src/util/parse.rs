//! Argument parsing utilities.

/// Error type for parsing.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid number: {0}")]
    InvalidNumber(String),

    #[error("number out of range: {0}")]
    OutOfRange(String),

    #[error("invalid format: {0}")]
    InvalidFormat(String),
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// Parse a u32 from string.
pub fn get_u32(s: &str) -> Result<u32> {
    parse_int(s)
}

/// Generic integer parsing with hex and octal support (`strtoul` base 0).
fn parse_int<T: std::str::FromStr + TryFrom<u64>>(s: &str) -> Result<T>
where
    <T as std::str::FromStr>::Err: std::fmt::Display,
    <T as TryFrom<u64>>::Error: std::fmt::Display,
{
    let s = s.trim();

    // Handle hex
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        let val =
            u64::from_str_radix(hex, 16).map_err(|e| ParseError::InvalidNumber(e.to_string()))?;
        return T::try_from(val).map_err(|e| ParseError::OutOfRange(e.to_string()));
    }

    // Handle octal
    if let Some(oct) = s.strip_prefix('0').filter(|r| r.starts_with(|c: char| c.is_ascii_digit())) {
        let val =
            u64::from_str_radix(oct, 8).map_err(|e| ParseError::InvalidNumber(e.to_string()))?;
        return T::try_from(val).map_err(|e| ParseError::OutOfRange(e.to_string()));
    }

    s.parse()
        .map_err(|e| ParseError::InvalidNumber(format!("{}", e)))
}

/// Convert a `0x`-prefixed hex string into bytes (`"0xff00"` -> `[0xff, 0x00]`).
///
/// Used for packet-filter masks and patterns, which must have an even
/// number of digits.
pub fn parse_hex_pattern(s: &str) -> Result<Vec<u8>> {
    let hex = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .ok_or_else(|| ParseError::InvalidFormat(format!("{s}: needs to start with 0x")))?;
    if hex.len() % 2 != 0 {
        return Err(ParseError::InvalidFormat(format!(
            "{s}: needs to be of even length"
        )));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| ParseError::InvalidNumber(s.to_string()))
        })
        .collect()
}
