//! The driver's generic variables: the first layer of the dispatch chain.
//!
//! | name            | kind    | get                        | set                       |
//! |-----------------|---------|----------------------------|---------------------------|
//! | `version`       | buffer  | driver version string      |                           |
//! | `msglevel`      | uint32  | message level              | message level             |
//! | `bcmerrorstr`   | buffer  | text of the last status    |                           |
//! | `bcmerror`      | int8    | last control status        |                           |
//! | `wdtick`        | uint32  | watchdog interval (ms)     | interval; link must be up |
//! | `dump`          | buffer  | driver and bus statistics  |                           |
//! | `dconpoll`      | uint32  | console poll interval (ms) | interval                  |
//! | `cons`          | buffer  |                            | line to firmware console  |
//! | `clearcounts`   | void    |                            | zero traffic counters     |
//! | `ioctl_timeout` | uint32  | reply timeout (ms)         | timeout, must be > 0      |
//!
//! `gpioob` is registered here but handled by the transport layer.

use std::sync::Arc;

use super::context::{DHD_VERSION, DriverContext};
use super::dispatch::{IovarHandler, IovarRequest};
use super::error::{BCME_STRLEN, Error, Result, bcmerrorstr};
use super::iovar::{ActionId, Registry, int_arg, iov, length_check, put_int, put_str};
use super::msglevel::MsgLevel;
use super::transport::Transport;

const GET_VERSION: ActionId = ActionId::get(iov::VERSION);
const GET_MSGLEVEL: ActionId = ActionId::get(iov::MSGLEVEL);
const SET_MSGLEVEL: ActionId = ActionId::set(iov::MSGLEVEL);
const GET_BCMERRORSTR: ActionId = ActionId::get(iov::BCMERRORSTR);
const GET_BCMERROR: ActionId = ActionId::get(iov::BCMERROR);
const GET_WDTICK: ActionId = ActionId::get(iov::WDTICK);
const SET_WDTICK: ActionId = ActionId::set(iov::WDTICK);
const GET_DUMP: ActionId = ActionId::get(iov::DUMP);
const GET_DCONSOLE_POLL: ActionId = ActionId::get(iov::DCONSOLE_POLL);
const SET_DCONSOLE_POLL: ActionId = ActionId::set(iov::DCONSOLE_POLL);
const SET_CONS: ActionId = ActionId::set(iov::CONS);
const SET_CLEARCOUNTS: ActionId = ActionId::set(iov::CLEARCOUNTS);
const GET_IOCTLTIMEOUT: ActionId = ActionId::get(iov::IOCTLTIMEOUT);
const SET_IOCTLTIMEOUT: ActionId = ActionId::set(iov::IOCTLTIMEOUT);

/// Handler for the generic variable table.
pub struct CoreIovars {
    ctx: Arc<DriverContext>,
    registry: Registry,
    console: Option<Arc<dyn Transport>>,
}

impl CoreIovars {
    /// Serve the generic table from `ctx`.
    pub fn new(ctx: Arc<DriverContext>) -> Self {
        Self {
            ctx,
            registry: Registry::generic(),
            console: None,
        }
    }

    /// Route `cons` writes to `transport`.
    pub fn with_console(mut self, transport: Arc<dyn Transport>) -> Self {
        self.console = Some(transport);
        self
    }

    /// The descriptor table.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl IovarHandler for CoreIovars {
    fn layer(&self) -> &'static str {
        "generic"
    }

    fn try_handle(&self, req: &IovarRequest<'_>, buf: &mut [u8]) -> Result<usize> {
        let vi = self.registry.lookup(req.name)?;
        let is_set = req.action.is_set();
        length_check(vi, buf.len(), is_set)?;

        let int_val = int_arg(req.params.unwrap_or(buf));
        let action = ActionId::new(req.action, vi.id);
        tracing::trace!(name = req.name, action = action.as_u32(), int_val, "generic iovar");

        match action {
            GET_VERSION => put_str(buf, DHD_VERSION),

            GET_MSGLEVEL => put_int(buf, self.ctx.msg_level().bits() as i32),
            SET_MSGLEVEL => {
                let level = MsgLevel::from_bits(int_val as u32);
                tracing::debug!(%level, "msglevel");
                self.ctx.with(|s| s.msg_level = level);
                Ok(0)
            }

            GET_BCMERRORSTR => {
                let code = self.ctx.lock().bcmerror;
                let text = bcmerrorstr(code);
                let end = text.len().min(BCME_STRLEN - 1);
                put_str(buf, &text[..end])
            }

            GET_BCMERROR => put_int(buf, self.ctx.lock().bcmerror),

            GET_WDTICK => put_int(buf, self.ctx.lock().watchdog_ms as i32),
            SET_WDTICK => self.ctx.with(|s| {
                if !s.up {
                    return Err(Error::NotUp);
                }
                s.watchdog_ms = int_val as u32;
                Ok(0)
            }),

            GET_DUMP => {
                let text = self.ctx.snapshot().dump();
                put_str(buf, &text)
            }

            GET_DCONSOLE_POLL => put_int(buf, self.ctx.lock().console_ms as i32),
            SET_DCONSOLE_POLL => {
                self.ctx.with(|s| s.console_ms = int_val as u32);
                Ok(0)
            }

            SET_CONS => {
                let console = self
                    .console
                    .as_ref()
                    .ok_or_else(|| Error::Unsupported("cons".into()))?;
                if let Some((_, line)) = buf.split_last() {
                    console.console_in(line)?;
                }
                Ok(0)
            }

            SET_CLEARCOUNTS => {
                self.ctx.reset_counters();
                Ok(0)
            }

            GET_IOCTLTIMEOUT => put_int(buf, self.ctx.lock().ioctl_timeout_ms as i32),
            SET_IOCTLTIMEOUT => {
                if int_val <= 0 {
                    return Err(Error::BadArg(format!("ioctl_timeout {int_val}")));
                }
                self.ctx.with(|s| s.ioctl_timeout_ms = int_val as u32);
                Ok(0)
            }

            _ => Err(Error::Unsupported(req.name.to_string())),
        }
    }
}

impl std::fmt::Debug for CoreIovars {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreIovars")
            .field("registry", &self.registry)
            .field("console", &self.console.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dongle::error::bcme;
    use crate::dongle::iovar::Action;
    use crate::dongle::transport::RecordingTransport;
    use std::time::Duration;

    fn core() -> CoreIovars {
        CoreIovars::new(Arc::new(DriverContext::default()))
    }

    fn get(h: &CoreIovars, name: &str, buf: &mut [u8]) -> Result<usize> {
        let req = IovarRequest {
            name,
            params: None,
            action: Action::Get,
        };
        h.try_handle(&req, buf)
    }

    fn set(h: &CoreIovars, name: &str, value: &[u8]) -> Result<usize> {
        let req = IovarRequest {
            name,
            params: None,
            action: Action::Set,
        };
        h.try_handle(&req, &mut value.to_vec())
    }

    #[test]
    fn test_version() {
        let h = core();
        let mut buf = [0u8; 128];
        let len = get(&h, "version", &mut buf).unwrap();
        assert_eq!(&buf[..len - 1], DHD_VERSION.as_bytes());
        assert_eq!(buf[len - 1], 0);

        let mut small = [0u8; 8];
        assert!(get(&h, "version", &mut small).unwrap_err().is_buffer_too_short());
    }

    #[test]
    fn test_msglevel() {
        let h = core();
        set(&h, "msglevel", &0x11i32.to_le_bytes()).unwrap();
        let mut buf = [0u8; 4];
        get(&h, "msglevel", &mut buf).unwrap();
        assert_eq!(u32::from_le_bytes(buf), 0x11);
        assert!(h.ctx.msg_level().contains(MsgLevel::CTL));
    }

    #[test]
    fn test_bcmerror_and_string() {
        let h = core();
        h.ctx.record_bcmerror(bcme::NOTUP);
        let mut buf = [0u8; 4];
        get(&h, "bcmerror", &mut buf).unwrap();
        assert_eq!(i32::from_le_bytes(buf), bcme::NOTUP);

        let mut text = [0u8; BCME_STRLEN];
        let len = get(&h, "bcmerrorstr", &mut text).unwrap();
        assert_eq!(&text[..len - 1], b"Not up");
    }

    #[test]
    fn test_wdtick_requires_up() {
        let h = core();
        let five = 5i32.to_le_bytes();
        assert!(matches!(set(&h, "wdtick", &five), Err(Error::NotUp)));
        h.ctx.set_up(true);
        set(&h, "wdtick", &five).unwrap();
        let mut buf = [0u8; 4];
        get(&h, "wdtick", &mut buf).unwrap();
        assert_eq!(i32::from_le_bytes(buf), 5);
    }

    #[test]
    fn test_ioctl_timeout() {
        let h = core();
        assert!(set(&h, "ioctl_timeout", &0i32.to_le_bytes()).unwrap_err().is_bad_arg());
        assert!(set(&h, "ioctl_timeout", &(-3i32).to_le_bytes()).unwrap_err().is_bad_arg());
        set(&h, "ioctl_timeout", &750i32.to_le_bytes()).unwrap();
        assert_eq!(h.ctx.ioctl_timeout(), Duration::from_millis(750));
    }

    #[test]
    fn test_clearcounts_is_void() {
        let h = core();
        h.ctx.with(|s| s.bus.rx_packets = 3);
        set(&h, "clearcounts", &[]).unwrap();
        assert_eq!(h.ctx.snapshot().bus.rx_packets, 0);
        // no GET handler
        let mut buf = [0u8; 4];
        assert!(get(&h, "clearcounts", &mut buf).unwrap_err().is_unsupported());
    }

    #[test]
    fn test_dump() {
        let h = core();
        let mut buf = vec![0u8; 8192];
        let len = get(&h, "dump", &mut buf).unwrap();
        let text = std::str::from_utf8(&buf[..len - 1]).unwrap();
        assert!(text.contains("bus stats:"));
        let mut small = vec![0u8; 100];
        assert!(get(&h, "dump", &mut small).unwrap_err().is_buffer_too_short());
    }

    #[test]
    fn test_cons() {
        let t = Arc::new(RecordingTransport::new());
        let h = core().with_console(t.clone());
        set(&h, "cons", b"mw 0x1000 1\0").unwrap();
        assert_eq!(t.console_lines(), vec!["mw 0x1000 1".to_string()]);
        // no console attached: left to later layers
        assert!(set(&core(), "cons", b"x\0").unwrap_err().is_unsupported());
    }

    #[test]
    fn test_gpioob_falls_through() {
        let h = core();
        let mut buf = [0u8; 4];
        assert!(get(&h, "gpioob", &mut buf).unwrap_err().is_unsupported());
    }

    #[test]
    fn test_int_param_qualifier() {
        // a GET qualifier is read as the integer argument but does not
        // change the reply of a pure read
        let h = core();
        let req = IovarRequest {
            name: "dconpoll",
            params: Some(&[9u8, 0, 0, 0][..]),
            action: Action::Get,
        };
        let mut buf = [0u8; 4];
        h.try_handle(&req, &mut buf).unwrap();
        assert_eq!(i32::from_le_bytes(buf), 0);
    }
}
