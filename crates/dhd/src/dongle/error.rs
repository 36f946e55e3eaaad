//! Error types for dongle operations.
//!
//! Every error maps onto one of the firmware's `BCME_*` status codes (see
//! [`Error::code`]) so that replies assembled for the control interface carry
//! the same numbers the dongle itself would report.

use std::io;
use std::time::Duration;

/// Result type for dongle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Firmware status codes (`BCME_*`).
pub mod bcme {
    pub const OK: i32 = 0;
    pub const ERROR: i32 = -1;
    pub const BADARG: i32 = -2;
    pub const BADOPTION: i32 = -3;
    pub const NOTUP: i32 = -4;
    pub const NOTDOWN: i32 = -5;
    pub const NOTAP: i32 = -6;
    pub const NOTSTA: i32 = -7;
    pub const BADKEYIDX: i32 = -8;
    pub const RADIOOFF: i32 = -9;
    pub const NOTBANDLOCKED: i32 = -10;
    pub const NOCLK: i32 = -11;
    pub const BADRATESET: i32 = -12;
    pub const BADBAND: i32 = -13;
    pub const BUFTOOSHORT: i32 = -14;
    pub const BUFTOOLONG: i32 = -15;
    pub const BUSY: i32 = -16;
    pub const NOTASSOCIATED: i32 = -17;
    pub const BADSSIDLEN: i32 = -18;
    pub const OUTOFRANGECHAN: i32 = -19;
    pub const BADCHAN: i32 = -20;
    pub const BADADDR: i32 = -21;
    pub const NORESOURCE: i32 = -22;
    pub const UNSUPPORTED: i32 = -23;
    pub const BADLEN: i32 = -24;
    pub const NOTREADY: i32 = -25;
    pub const EPERM: i32 = -26;
    pub const NOMEM: i32 = -27;
    pub const ASSOCIATED: i32 = -28;
    pub const RANGE: i32 = -29;
    pub const NOTFOUND: i32 = -30;
    pub const WME_NOT_ENABLED: i32 = -31;
    pub const TSPEC_NOTFOUND: i32 = -32;
    pub const ACM_NOTSUPPORTED: i32 = -33;
    pub const NOT_WME_ASSOCIATION: i32 = -34;
    pub const SDIO_ERROR: i32 = -35;
    pub const DONGLE_DOWN: i32 = -36;
    pub const VERSION: i32 = -37;
    pub const TXFAIL: i32 = -38;
    pub const RXFAIL: i32 = -39;
    pub const NODEVICE: i32 = -40;
    pub const UNFINISHED: i32 = -41;
    pub const LAST: i32 = UNFINISHED;
}

/// Maximum length of a firmware error string, including the terminator.
pub const BCME_STRLEN: usize = 64;

const BCME_STRINGS: [&str; (-bcme::LAST) as usize + 1] = [
    "OK",
    "Undefined error",
    "Bad Argument",
    "Bad Option",
    "Not up",
    "Not down",
    "Not AP",
    "Not STA",
    "Bad Key Index",
    "Radio Off",
    "Not band locked",
    "No clock",
    "Bad Rate valueset",
    "Bad Band",
    "Buffer too short",
    "Buffer too long",
    "Busy",
    "Not Associated",
    "Bad SSID len",
    "Out of Range Channel",
    "Bad Channel",
    "Bad Address",
    "Not Enough Resources",
    "Unsupported",
    "Bad length",
    "Not Ready",
    "Not Permitted",
    "No Memory",
    "Associated",
    "Not In Range",
    "Not Found",
    "WME Not Enabled",
    "TSPEC Not Found",
    "ACM Not Supported",
    "Not WME Association",
    "SDIO Bus Error",
    "Dongle Not Accessible",
    "Incorrect version",
    "TX Failure",
    "RX Failure",
    "Device Not Present",
    "Command not finished",
];

/// Canonical firmware string for a `BCME_*` code.
///
/// Positive values and codes past the end of the table render as
/// `"Unknown error"`.
pub fn bcmerrorstr(code: i32) -> &'static str {
    if code > 0 || code < bcme::LAST {
        return "Unknown error";
    }
    BCME_STRINGS[(-code) as usize]
}

fn code_str(code: &i32) -> &'static str {
    bcmerrorstr(*code)
}

/// Errors that can occur during dongle operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from a transport.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON (configuration) error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No layer implements the named variable or derived action.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Argument rejected by a handler or by request validation.
    #[error("bad argument: {0}")]
    BadArg(String),

    /// Caller buffer too small to hold the reply or the request.
    #[error("buffer too short: need {needed} bytes, got {actual}")]
    BufferTooShort {
        /// Bytes required.
        needed: usize,
        /// Bytes supplied.
        actual: usize,
    },

    /// Setting requires the logical link to be up.
    #[error("interface not up")]
    NotUp,

    /// Allocation (or a configured allocation bound) failed.
    #[error("out of memory: {0}")]
    NoMemory(String),

    /// Malformed or foreign event frame.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Fixed-size structure did not fit in the supplied bytes.
    #[error("truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Expected length.
        expected: usize,
        /// Actual bytes available.
        actual: usize,
    },

    /// Parse error.
    #[error("parse error: {0}")]
    Parse(String),

    /// Firmware returned a status code with no dedicated variant.
    #[error("firmware error: {} ({code})", code_str(.code))]
    Firmware {
        /// The `BCME_*` value.
        code: i32,
    },

    /// Firmware error with operation context.
    #[error("{operation}: {} ({code})", code_str(.code))]
    FirmwareWithContext {
        /// The operation that failed.
        operation: String,
        /// The `BCME_*` value.
        code: i32,
    },

    /// Control reply did not arrive in time.
    #[error("control request {seq} timed out after {timeout:?}")]
    Timeout {
        /// Sequence number of the abandoned request.
        seq: u16,
        /// Timeout that expired.
        timeout: Duration,
    },

    /// The scan session was aborted; partial results are no longer accepted.
    #[error("scan aborted")]
    ScanAborted,
}

impl Error {
    /// Build an error from a firmware status code.
    ///
    /// Codes with a dedicated variant map onto it so that callers can match on
    /// [`Error::NotUp`], [`Error::Unsupported`] and friends regardless of
    /// which layer produced them.
    pub fn from_code(code: i32) -> Self {
        match code {
            bcme::UNSUPPORTED => Self::Unsupported("firmware".into()),
            bcme::BADARG => Self::BadArg("firmware".into()),
            bcme::BUFTOOSHORT => Self::BufferTooShort {
                needed: 0,
                actual: 0,
            },
            bcme::NOTUP => Self::NotUp,
            bcme::NOMEM => Self::NoMemory("firmware".into()),
            code => Self::Firmware { code },
        }
    }

    /// Convert a firmware status into a `Result`.
    pub fn check(code: i32) -> Result<()> {
        if code >= 0 {
            Ok(())
        } else {
            Err(Self::from_code(code))
        }
    }

    /// Add context to this error.
    ///
    /// Wraps firmware errors with operation context. Other errors are returned unchanged.
    pub fn with_context(self, operation: impl Into<String>) -> Self {
        match self {
            Self::Firmware { code } => Self::FirmwareWithContext {
                operation: operation.into(),
                code,
            },
            other => other,
        }
    }

    /// The `BCME_*` status this error reports to the control interface.
    pub fn code(&self) -> i32 {
        match self {
            Self::Unsupported(_) => bcme::UNSUPPORTED,
            Self::BadArg(_) => bcme::BADARG,
            Self::BufferTooShort { .. } => bcme::BUFTOOSHORT,
            Self::NotUp => bcme::NOTUP,
            Self::NoMemory(_) => bcme::NOMEM,
            Self::Truncated { .. } => bcme::BADLEN,
            Self::Firmware { code } | Self::FirmwareWithContext { code, .. } => *code,
            Self::Timeout { .. } => bcme::NOTREADY,
            Self::ScanAborted => bcme::NOTREADY,
            Self::Io(_) => bcme::SDIO_ERROR,
            Self::Json(_) | Self::Parse(_) | Self::InvalidFrame(_) => bcme::ERROR,
        }
    }

    /// Host errno equivalent (positive), as returned to ioctl callers.
    pub fn errno(&self) -> i32 {
        match self {
            Self::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            Self::Timeout { .. } => libc::ETIMEDOUT,
            other => code_to_errno(other.code()),
        }
    }

    /// Check if no layer handled the request.
    pub fn is_unsupported(&self) -> bool {
        self.code() == bcme::UNSUPPORTED
    }

    /// Check if this is a "link down" error.
    pub fn is_not_up(&self) -> bool {
        self.code() == bcme::NOTUP
    }

    /// Check if this is a bad argument error.
    pub fn is_bad_arg(&self) -> bool {
        self.code() == bcme::BADARG
    }

    /// Check if the caller's buffer was too small.
    pub fn is_buffer_too_short(&self) -> bool {
        self.code() == bcme::BUFTOOSHORT
    }

    /// Check if this is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Map a `BCME_*` code to a positive host errno.
pub fn code_to_errno(code: i32) -> i32 {
    match code {
        bcme::OK => 0,
        bcme::BUSY | bcme::NOTREADY => libc::EBUSY,
        bcme::NORESOURCE => libc::ENODATA,
        bcme::UNSUPPORTED => libc::EOPNOTSUPP,
        bcme::BADLEN => libc::EMSGSIZE,
        bcme::EPERM => libc::EPERM,
        bcme::NOMEM => libc::ENOMEM,
        bcme::ASSOCIATED => libc::EISCONN,
        bcme::RANGE => libc::ERANGE,
        bcme::NOTFOUND | bcme::NODEVICE => libc::ENODEV,
        bcme::SDIO_ERROR | bcme::DONGLE_DOWN | bcme::TXFAIL | bcme::RXFAIL => libc::EIO,
        _ => libc::EINVAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_code_maps_dedicated_variants() {
        assert!(Error::from_code(bcme::UNSUPPORTED).is_unsupported());
        assert!(Error::from_code(bcme::NOTUP).is_not_up());
        assert!(Error::from_code(bcme::BADARG).is_bad_arg());
        assert!(Error::from_code(bcme::BUFTOOSHORT).is_buffer_too_short());
        assert_eq!(Error::from_code(bcme::BADCHAN).code(), bcme::BADCHAN);
    }

    #[test]
    fn test_check() {
        assert!(Error::check(0).is_ok());
        assert!(Error::check(12).is_ok());
        assert!(Error::check(bcme::NOTUP).unwrap_err().is_not_up());
    }

    #[test]
    fn test_with_context() {
        let err = Error::from_code(bcme::RADIOOFF).with_context("setting PM");
        let msg = err.to_string();
        assert!(msg.contains("setting PM"));
        assert!(msg.contains("Radio Off"));
        assert_eq!(err.code(), bcme::RADIOOFF);
    }

    #[test]
    fn test_bcmerrorstr() {
        assert_eq!(bcmerrorstr(0), "OK");
        assert_eq!(bcmerrorstr(bcme::BUFTOOSHORT), "Buffer too short");
        assert_eq!(bcmerrorstr(bcme::UNFINISHED), "Command not finished");
        assert_eq!(bcmerrorstr(-100), "Unknown error");
        assert_eq!(bcmerrorstr(3), "Unknown error");
        assert!(BCME_STRINGS.iter().all(|s| s.len() < BCME_STRLEN));
    }

    #[test]
    fn test_errno_mapping() {
        assert_eq!(Error::NotUp.errno(), libc::EINVAL);
        assert_eq!(Error::NoMemory("x".into()).errno(), libc::ENOMEM);
        assert_eq!(Error::Unsupported("x".into()).errno(), libc::EOPNOTSUPP);
        let timeout = Error::Timeout {
            seq: 3,
            timeout: Duration::from_millis(10),
        };
        assert!(timeout.is_timeout());
        assert_eq!(timeout.errno(), libc::ETIMEDOUT);
    }
}
