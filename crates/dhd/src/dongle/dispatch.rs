//! Named-variable command dispatch.
//!
//! A request for variable `name` is offered to an ordered list of layers:
//! the driver's generic variables first, then whatever protocol and
//! transport layers were registered. A layer that does not know the name
//! answers [`Error::Unsupported`] and the next layer is tried; the first
//! other answer (success or error) is final.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use dhd::dongle::{DriverContext, Dispatcher, FirmwareIovars};
//!
//! let ctx = Arc::new(DriverContext::default());
//! let dhd = Dispatcher::new(ctx.clone()).with_layer(FirmwareIovars::new(transport));
//!
//! let mut out = [0u8; 4];
//! dhd.get("msglevel", &[], &mut out)?;
//! dhd.set("ioctl_timeout", &2000i32.to_le_bytes())?;
//! ```

use std::sync::Arc;

use super::context::DriverContext;
use super::core_iovars::CoreIovars;
use super::error::{Error, Result};
use super::iovar::{Action, INT_SIZE};
use super::transport::{Transport, TransportExt};
use super::wlc::{DHD_IOCTL_MAGIC, DHD_IOCTL_VERSION, dhd_cmd};

/// A named get/set request as seen by a layer.
#[derive(Debug, Clone, Copy)]
pub struct IovarRequest<'a> {
    /// Variable name.
    pub name: &'a str,
    /// Qualifier parameters (GET only).
    pub params: Option<&'a [u8]>,
    pub action: Action,
}

/// One layer of the fallback chain.
pub trait IovarHandler: Send + Sync {
    /// Layer name, for logging.
    fn layer(&self) -> &'static str;

    /// Handle `req` using `buf` as the argument (SET) or reply (GET) buffer.
    ///
    /// Returns the reply length. [`Error::Unsupported`] passes the request
    /// on to the next layer.
    fn try_handle(&self, req: &IovarRequest<'_>, buf: &mut [u8]) -> Result<usize>;
}

/// Routes named requests through the layer chain.
pub struct Dispatcher {
    ctx: Arc<DriverContext>,
    layers: Vec<Box<dyn IovarHandler>>,
}

impl Dispatcher {
    /// Create a dispatcher whose only layer is the generic variable table.
    pub fn new(ctx: Arc<DriverContext>) -> Self {
        let core = CoreIovars::new(ctx.clone());
        Self::with_core(ctx, core)
    }

    /// Create a dispatcher with a preconfigured generic layer.
    pub fn with_core(ctx: Arc<DriverContext>, core: CoreIovars) -> Self {
        Self {
            ctx,
            layers: vec![Box::new(core)],
        }
    }

    /// Append a fallback layer (protocol first, then transport).
    pub fn with_layer(mut self, layer: impl IovarHandler + 'static) -> Self {
        self.layers.push(Box::new(layer));
        self
    }

    /// The shared driver context.
    pub fn context(&self) -> &Arc<DriverContext> {
        &self.ctx
    }

    /// Names of the registered layers, in order.
    pub fn layer_names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|l| l.layer()).collect()
    }

    /// Offer a request to each layer in turn.
    ///
    /// SET requests may not carry qualifier parameters and GET requests must
    /// supply a reply buffer; both are checked before any layer runs.
    pub fn request(
        &self,
        name: &str,
        params: Option<&[u8]>,
        buf: &mut [u8],
        action: Action,
    ) -> Result<usize> {
        if action.is_set() && params.is_some_and(|p| !p.is_empty()) {
            return Err(Error::BadArg(format!("{name}: set takes no parameters")));
        }
        if !action.is_set() && buf.is_empty() {
            return Err(Error::BufferTooShort {
                needed: 1,
                actual: 0,
            });
        }

        let req = IovarRequest {
            name,
            params,
            action,
        };
        tracing::debug!(name, ?action, len = buf.len(), "iovar request");

        let mut last = Error::Unsupported(name.to_string());
        for layer in &self.layers {
            match layer.try_handle(&req, buf) {
                Err(e) if e.is_unsupported() => {
                    tracing::trace!(name, layer = layer.layer(), "not handled");
                    last = e;
                }
                other => return other,
            }
        }
        Err(last)
    }

    /// Read variable `name` into `out`, returning the bytes written.
    pub fn get(&self, name: &str, qualifiers: &[u8], out: &mut [u8]) -> Result<usize> {
        let params = (!qualifiers.is_empty()).then_some(qualifiers);
        self.request(name, params, out, Action::Get)
    }

    /// Write variable `name`.
    pub fn set(&self, name: &str, input: &[u8]) -> Result<()> {
        let mut arg = input.to_vec();
        self.request(name, None, &mut arg, Action::Set).map(|_| ())
    }

    /// Execute a control-interface command.
    ///
    /// `GET_VAR`/`SET_VAR` buffers hold a NUL-terminated name followed by
    /// the argument; a GET reply overwrites the whole buffer. The status of
    /// every command is remembered for the `bcmerror` variable.
    pub fn ioctl(&self, cmd: u32, buf: &mut [u8]) -> Result<usize> {
        let result = self.do_ioctl(cmd, buf);
        let code = match &result {
            Ok(_) => 0,
            Err(e) => e.code(),
        };
        self.ctx.record_bcmerror(code);
        result
    }

    fn do_ioctl(&self, cmd: u32, buf: &mut [u8]) -> Result<usize> {
        match cmd {
            dhd_cmd::GET_MAGIC => put_u32(buf, DHD_IOCTL_MAGIC),
            dhd_cmd::GET_VERSION => put_u32(buf, DHD_IOCTL_VERSION),
            dhd_cmd::GET_VAR | dhd_cmd::SET_VAR => {
                let nul = buf
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or(Error::BufferTooShort {
                        needed: buf.len() + 1,
                        actual: buf.len(),
                    })?;
                let name = std::str::from_utf8(&buf[..nul])
                    .map_err(|_| Error::BadArg("variable name is not UTF-8".into()))?
                    .to_string();

                if cmd == dhd_cmd::GET_VAR {
                    let params = buf[nul + 1..].to_vec();
                    self.request(&name, Some(params.as_slice()), buf, Action::Get)
                } else {
                    self.request(&name, None, &mut buf[nul + 1..], Action::Set)
                }
            }
            other => Err(Error::Unsupported(format!("control command {other}"))),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("layers", &self.layer_names())
            .finish()
    }
}

fn put_u32(buf: &mut [u8], value: u32) -> Result<usize> {
    let actual = buf.len();
    let dst = buf.get_mut(..INT_SIZE).ok_or(Error::BufferTooShort {
        needed: INT_SIZE,
        actual,
    })?;
    dst.copy_from_slice(&value.to_le_bytes());
    Ok(INT_SIZE)
}

/// Transport layer that forwards unknown variables to the firmware.
#[derive(Debug)]
pub struct FirmwareIovars<T> {
    transport: T,
}

impl<T: Transport> FirmwareIovars<T> {
    /// Forward through `transport`.
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

impl<T: Transport> IovarHandler for FirmwareIovars<T> {
    fn layer(&self) -> &'static str {
        "firmware"
    }

    fn try_handle(&self, req: &IovarRequest<'_>, buf: &mut [u8]) -> Result<usize> {
        match req.action {
            Action::Get => self
                .transport
                .get_var(req.name, req.params.unwrap_or(&[]), buf),
            Action::Set => self.transport.set_var(req.name, buf).map(|_| 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dongle::error::bcme;
    use crate::dongle::transport::RecordingTransport;
    use std::sync::Mutex;

    /// Layer that knows one name and records what it saw.
    struct Fixed {
        name: &'static str,
        reply: i32,
        seen: Mutex<Vec<String>>,
    }

    impl Fixed {
        fn new(name: &'static str, reply: i32) -> Self {
            Self {
                name,
                reply,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl IovarHandler for Arc<Fixed> {
        fn layer(&self) -> &'static str {
            "fixed"
        }

        fn try_handle(&self, req: &IovarRequest<'_>, buf: &mut [u8]) -> Result<usize> {
            self.seen.lock().unwrap().push(req.name.to_string());
            if req.name != self.name {
                return Err(Error::Unsupported(req.name.into()));
            }
            buf[..4].copy_from_slice(&self.reply.to_le_bytes());
            Ok(4)
        }
    }

    fn dispatcher() -> (Dispatcher, Arc<Fixed>, Arc<Fixed>) {
        let proto = Arc::new(Fixed::new("proto_var", 11));
        let bus = Arc::new(Fixed::new("bus_var", 22));
        let d = Dispatcher::new(Arc::new(DriverContext::default()))
            .with_layer(proto.clone())
            .with_layer(bus.clone());
        (d, proto, bus)
    }

    #[test]
    fn test_fallback_order() {
        let (d, proto, bus) = dispatcher();
        let mut out = [0u8; 4];

        d.get("bus_var", &[], &mut out).unwrap();
        assert_eq!(i32::from_le_bytes(out), 22);
        assert_eq!(proto.seen.lock().unwrap().as_slice(), ["bus_var"]);

        d.get("proto_var", &[], &mut out).unwrap();
        assert_eq!(i32::from_le_bytes(out), 11);
        // the transport layer never saw a request the protocol layer took
        assert_eq!(bus.seen.lock().unwrap().as_slice(), ["bus_var"]);
    }

    #[test]
    fn test_generic_wins() {
        let (d, proto, _) = dispatcher();
        let mut out = [0u8; 4];
        d.get("msglevel", &[], &mut out).unwrap();
        assert!(proto.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_after_all_layers() {
        let (d, proto, bus) = dispatcher();
        let mut out = [0u8; 4];
        let err = d.get("nosuchvar", &[], &mut out).unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(proto.seen.lock().unwrap().len(), 1);
        assert_eq!(bus.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_set_with_params_rejected() {
        let (d, proto, _) = dispatcher();
        let mut arg = [0u8; 4];
        let err = d
            .request("msglevel", Some(&[1u8][..]), &mut arg, Action::Set)
            .unwrap_err();
        assert!(err.is_bad_arg());
        assert!(proto.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_get_needs_buffer() {
        let (d, _, _) = dispatcher();
        let err = d.get("msglevel", &[], &mut []).unwrap_err();
        assert!(err.is_buffer_too_short());
    }

    #[test]
    fn test_ioctl_magic_and_version() {
        let (d, _, _) = dispatcher();
        let mut buf = [0u8; 4];
        assert_eq!(d.ioctl(dhd_cmd::GET_MAGIC, &mut buf).unwrap(), 4);
        assert_eq!(u32::from_le_bytes(buf), 0x0044_4944);
        d.ioctl(dhd_cmd::GET_VERSION, &mut buf).unwrap();
        assert_eq!(u32::from_le_bytes(buf), 1);
        assert!(
            d.ioctl(dhd_cmd::GET_MAGIC, &mut [0u8; 2])
                .unwrap_err()
                .is_buffer_too_short()
        );
        assert!(d.ioctl(99, &mut buf).unwrap_err().is_unsupported());
        assert_eq!(d.context().snapshot().bcmerror, bcme::UNSUPPORTED);
    }

    #[test]
    fn test_ioctl_get_var_reuses_buffer() {
        let (d, _, _) = dispatcher();
        let mut buf = [0u8; 16];
        buf[..9].copy_from_slice(b"msglevel\0");
        assert_eq!(d.ioctl(dhd_cmd::GET_VAR, &mut buf).unwrap(), 4);
        assert_eq!(u32::from_le_bytes(buf[..4].try_into().unwrap()), 0x0803);
        assert_eq!(d.context().snapshot().bcmerror, 0);
    }

    #[test]
    fn test_ioctl_set_var() {
        let (d, _, _) = dispatcher();
        let mut buf = b"msglevel\0\x01\0\0\0".to_vec();
        d.ioctl(dhd_cmd::SET_VAR, &mut buf).unwrap();
        assert_eq!(d.context().msg_level().bits(), 1);
    }

    #[test]
    fn test_ioctl_unterminated_name() {
        let (d, _, _) = dispatcher();
        let mut buf = *b"msglevel";
        let err = d.ioctl(dhd_cmd::GET_VAR, &mut buf).unwrap_err();
        assert!(err.is_buffer_too_short());
        assert_eq!(d.context().snapshot().bcmerror, bcme::BUFTOOSHORT);
    }

    #[test]
    fn test_firmware_layer() {
        let t = Arc::new(RecordingTransport::new());
        t.reply("mpc", 1i32.to_le_bytes().to_vec());
        let d = Dispatcher::new(Arc::new(DriverContext::default()))
            .with_layer(FirmwareIovars::new(t.clone()));

        let mut out = [0u8; 8];
        assert_eq!(d.get("mpc", &[], &mut out).unwrap(), 4);
        assert_eq!(out[0], 1);

        d.set("roam_off", &1i32.to_le_bytes()).unwrap();
        assert_eq!(t.last_set("roam_off").unwrap().int_value(), Some(1));
        assert_eq!(d.layer_names(), vec!["generic", "firmware"]);
    }
}
