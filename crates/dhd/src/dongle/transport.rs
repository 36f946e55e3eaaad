//! The synchronous firmware command path.
//!
//! A [`Transport`] delivers one `WLC_*` ioctl to the dongle and waits for the
//! reply. Bus framing (SDIO, USB) lives behind this trait and is not part of
//! the core. [`TransportExt`] adds the named-variable helpers every caller
//! needs, and [`RecordingTransport`] is an in-memory transport that logs
//! each command and answers variable reads from a table.
//!
//! # Example
//!
//! ```ignore
//! use dhd::dongle::transport::{RecordingTransport, TransportExt};
//!
//! let t = RecordingTransport::new();
//! t.set_var_u32("bcn_timeout", 8)?;
//! assert_eq!(t.commands()[0].var_name(), Some("bcn_timeout"));
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::error::{Error, Result, bcme};
use super::iovar::{IovarBuilder, mkiovar};
use super::wlc::{WLC_IOCTL_MAXLEN, wlc_cmd};

// ============================================================================
// Transport trait
// ============================================================================

/// A synchronous request path to the dongle firmware.
pub trait Transport: Send + Sync {
    /// Issue `cmd` on interface `ifidx`.
    ///
    /// `buf` carries the argument and, for GETs, receives the reply. Returns
    /// the number of reply bytes.
    fn wl_ioctl(&self, ifidx: usize, cmd: u32, buf: &mut [u8], set: bool) -> Result<usize>;

    /// Write a line to the firmware console.
    fn console_in(&self, _msg: &[u8]) -> Result<()> {
        Err(Error::Unsupported("console".into()))
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn wl_ioctl(&self, ifidx: usize, cmd: u32, buf: &mut [u8], set: bool) -> Result<usize> {
        (**self).wl_ioctl(ifidx, cmd, buf, set)
    }

    fn console_in(&self, msg: &[u8]) -> Result<()> {
        (**self).console_in(msg)
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn wl_ioctl(&self, ifidx: usize, cmd: u32, buf: &mut [u8], set: bool) -> Result<usize> {
        (**self).wl_ioctl(ifidx, cmd, buf, set)
    }

    fn console_in(&self, msg: &[u8]) -> Result<()> {
        (**self).console_in(msg)
    }
}

/// Named-variable helpers on top of [`Transport::wl_ioctl`].
pub trait TransportExt: Transport {
    /// Set firmware variable `name` to `data`.
    fn set_var(&self, name: &str, data: &[u8]) -> Result<()> {
        let mut buf = IovarBuilder::new(name).append_bytes(data).build();
        self.wl_ioctl(0, wlc_cmd::SET_VAR, &mut buf, true)
            .map(|_| ())
            .map_err(|e| e.with_context(format!("set {name}")))
    }

    /// Set an integer firmware variable.
    fn set_var_u32(&self, name: &str, value: u32) -> Result<()> {
        self.set_var(name, &value.to_le_bytes())
    }

    /// Read firmware variable `name` into `out`.
    ///
    /// `params` qualify the read (for example a scan buffer length). The
    /// request buffer is sized to hold the larger of the request and `out`.
    fn get_var(&self, name: &str, params: &[u8], out: &mut [u8]) -> Result<usize> {
        let req_len = name.len() + 1 + params.len();
        let mut buf = vec![0u8; req_len.max(out.len())];
        mkiovar(name, params, &mut buf)?;
        let len = self
            .wl_ioctl(0, wlc_cmd::GET_VAR, &mut buf, false)
            .map_err(|e| e.with_context(format!("get {name}")))?;
        let len = len.min(out.len()).min(buf.len());
        out[..len].copy_from_slice(&buf[..len]);
        Ok(len)
    }

    /// Read an integer firmware variable.
    fn get_var_u32(&self, name: &str) -> Result<u32> {
        let mut out = [0u8; 4];
        let len = self.get_var(name, &[], &mut out)?;
        if len < out.len() {
            return Err(Error::Truncated {
                expected: out.len(),
                actual: len,
            });
        }
        Ok(u32::from_le_bytes(out))
    }

    /// Issue an integer-valued SET command.
    fn set_int(&self, cmd: u32, value: i32) -> Result<()> {
        let mut buf = value.to_le_bytes();
        self.wl_ioctl(0, cmd, &mut buf, true)
            .map(|_| ())
            .map_err(|e| e.with_context(format!("ioctl {cmd}")))
    }
}

impl<T: Transport + ?Sized> TransportExt for T {}

// ============================================================================
// RecordingTransport
// ============================================================================

/// One command seen by a [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub ifidx: usize,
    pub cmd: u32,
    pub set: bool,
    /// Argument bytes as passed in.
    pub buf: Vec<u8>,
}

impl Command {
    /// Variable name for `GET_VAR`/`SET_VAR` commands.
    pub fn var_name(&self) -> Option<&str> {
        if self.cmd != wlc_cmd::GET_VAR && self.cmd != wlc_cmd::SET_VAR {
            return None;
        }
        let end = self.buf.iter().position(|&b| b == 0)?;
        std::str::from_utf8(&self.buf[..end]).ok()
    }

    /// Bytes following the variable name.
    pub fn var_value(&self) -> &[u8] {
        match self.buf.iter().position(|&b| b == 0) {
            Some(end) if self.var_name().is_some() => &self.buf[end + 1..],
            _ => &self.buf,
        }
    }

    /// The first four argument bytes as an integer.
    pub fn int_value(&self) -> Option<i32> {
        let v = self.var_value();
        v.get(..4)
            .and_then(|b| b.try_into().ok())
            .map(i32::from_le_bytes)
    }
}

#[derive(Debug, Default)]
struct Recorded {
    commands: Vec<Command>,
    replies: HashMap<String, Vec<u8>>,
    failures: HashMap<String, i32>,
    console: Vec<Vec<u8>>,
}

/// An in-memory transport.
///
/// Every command is recorded. `GET_VAR` for a name registered with
/// [`reply`](Self::reply) copies that reply into the caller's buffer; other
/// reads succeed with zero bytes. Names registered with
/// [`fail`](Self::fail) return that firmware status instead.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    inner: Mutex<Recorded>,
}

impl RecordingTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer reads of `name` with `data`.
    pub fn reply(&self, name: &str, data: impl Into<Vec<u8>>) -> &Self {
        self.lock().replies.insert(name.to_string(), data.into());
        self
    }

    /// Make requests for `name` fail with firmware status `code`.
    pub fn fail(&self, name: &str, code: i32) -> &Self {
        self.lock().failures.insert(name.to_string(), code);
        self
    }

    /// Commands issued so far.
    pub fn commands(&self) -> Vec<Command> {
        self.lock().commands.clone()
    }

    /// Names of the variables written so far, in order.
    pub fn set_var_names(&self) -> Vec<String> {
        self.lock()
            .commands
            .iter()
            .filter(|c| c.set)
            .filter_map(|c| c.var_name().map(str::to_string))
            .collect()
    }

    /// Last command that wrote variable `name`.
    pub fn last_set(&self, name: &str) -> Option<Command> {
        self.lock()
            .commands
            .iter()
            .rev()
            .find(|c| c.set && c.var_name() == Some(name))
            .cloned()
    }

    /// Lines written to the console.
    pub fn console_lines(&self) -> Vec<String> {
        self.lock()
            .console
            .iter()
            .map(|l| String::from_utf8_lossy(l).into_owned())
            .collect()
    }

    /// Forget recorded commands (replies stay registered).
    pub fn clear(&self) {
        self.lock().commands.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for RecordingTransport {
    fn wl_ioctl(&self, ifidx: usize, cmd: u32, buf: &mut [u8], set: bool) -> Result<usize> {
        if buf.len() > WLC_IOCTL_MAXLEN {
            return Err(Error::from_code(bcme::BUFTOOLONG));
        }
        let command = Command {
            ifidx,
            cmd,
            set,
            buf: buf.to_vec(),
        };
        let name = command.var_name().map(str::to_string);
        tracing::trace!(cmd, set, name = ?name, len = buf.len(), "ioctl");

        let mut inner = self.lock();
        inner.commands.push(command);

        let Some(name) = name else {
            return Ok(0);
        };
        if let Some(&code) = inner.failures.get(&name) {
            return Err(Error::from_code(code));
        }
        if set {
            return Ok(0);
        }
        match inner.replies.get(&name) {
            Some(reply) => {
                let len = reply.len().min(buf.len());
                buf[..len].copy_from_slice(&reply[..len]);
                Ok(len)
            }
            None => Ok(0),
        }
    }

    fn console_in(&self, msg: &[u8]) -> Result<()> {
        self.lock().console.push(msg.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dongle::parse::parse_cstr;

    #[test]
    fn test_set_var_encoding() {
        let t = RecordingTransport::new();
        t.set_var_u32("bcn_timeout", 8).unwrap();
        let cmds = t.commands();
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].cmd, wlc_cmd::SET_VAR);
        assert!(cmds[0].set);
        assert_eq!(cmds[0].buf, b"bcn_timeout\0\x08\0\0\0");
        assert_eq!(cmds[0].var_name(), Some("bcn_timeout"));
        assert_eq!(cmds[0].int_value(), Some(8));
    }

    #[test]
    fn test_get_var_reply() {
        let t = RecordingTransport::new();
        t.reply("ver", b"wl0: 4.218\0".to_vec());
        let mut out = [0u8; 32];
        let len = t.get_var("ver", &[], &mut out).unwrap();
        assert_eq!(parse_cstr(&out[..len]), "wl0: 4.218");
        assert!(!t.commands()[0].set);
    }

    #[test]
    fn test_get_var_u32() {
        let t = RecordingTransport::new();
        t.reply("arpoe", 1u32.to_le_bytes().to_vec());
        assert_eq!(t.get_var_u32("arpoe").unwrap(), 1);
        assert!(matches!(
            t.get_var_u32("missing"),
            Err(Error::Truncated { .. })
        ));
    }

    #[test]
    fn test_failure_maps_to_error() {
        let t = RecordingTransport::new();
        t.fail("roam_off", bcme::UNSUPPORTED);
        let err = t.set_var_u32("roam_off", 1).unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_set_int() {
        let t = RecordingTransport::new();
        t.set_int(wlc_cmd::SET_PM, 2).unwrap();
        let cmd = &t.commands()[0];
        assert_eq!(cmd.cmd, wlc_cmd::SET_PM);
        assert_eq!(cmd.var_name(), None);
        assert_eq!(cmd.int_value(), Some(2));
    }

    #[test]
    fn test_through_arc() {
        let t = Arc::new(RecordingTransport::new());
        let dynt: Arc<dyn Transport> = t.clone();
        dynt.set_var("mpc", &[0, 0, 0, 0]).unwrap();
        dynt.console_in(b"help").unwrap();
        assert_eq!(t.set_var_names(), vec!["mpc".to_string()]);
        assert_eq!(t.console_lines(), vec!["help".to_string()]);
        assert_eq!(parse_cstr(&t.commands()[0].buf), "mpc");
    }
}
