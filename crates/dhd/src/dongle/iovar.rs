//! Named, typed configuration variables.
//!
//! An [`IoVar`] describes one variable: its name, numeric id, and the kind
//! of value it carries. Descriptors live in static tables; a [`Registry`]
//! wraps one table and answers lookups and length checks. Integer values
//! always travel as a 4-byte little-endian `int` (dongle order).

use super::error::{Error, Result};

/// Size of an integer value at the control interface.
pub const INT_SIZE: usize = 4;

/// Value kind of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoVarKind {
    /// Action without a value.
    Void,
    Bool,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    /// Opaque bytes.
    Buffer,
}

impl IoVarKind {
    /// Check if values of this kind travel as an `int`.
    pub fn is_int(self) -> bool {
        !matches!(self, IoVarKind::Void | IoVarKind::Buffer)
    }

    /// Short name, as printed by tools.
    pub fn name(self) -> &'static str {
        match self {
            IoVarKind::Void => "void",
            IoVarKind::Bool => "bool",
            IoVarKind::Int8 => "int8",
            IoVarKind::Uint8 => "uint8",
            IoVarKind::Int16 => "int16",
            IoVarKind::Uint16 => "uint16",
            IoVarKind::Int32 => "int32",
            IoVarKind::Uint32 => "uint32",
            IoVarKind::Buffer => "buffer",
        }
    }
}

/// Variable descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoVar {
    /// Unique name.
    pub name: &'static str,
    /// Numeric id, unique within its table.
    pub id: u16,
    /// Handler-specific flags.
    pub flags: u16,
    pub kind: IoVarKind,
    /// For [`IoVarKind::Buffer`], the smallest reply buffer a GET must
    /// supply (0 = the caller's length is authoritative).
    pub min_len: usize,
}

impl IoVar {
    /// Create a descriptor.
    pub const fn new(name: &'static str, id: u16, kind: IoVarKind, min_len: usize) -> Self {
        Self {
            name,
            id,
            flags: 0,
            kind,
            min_len,
        }
    }

    /// Bytes a buffer must hold for this request to be accepted.
    pub fn required_len(&self, is_set: bool) -> usize {
        match self.kind {
            IoVarKind::Void => 0,
            IoVarKind::Buffer if is_set => 0,
            IoVarKind::Buffer => self.min_len,
            _ => INT_SIZE,
        }
    }

    /// Bytes of value a handler reads or writes for a buffer of `len` bytes.
    pub fn value_size(&self, len: usize) -> usize {
        match self.kind {
            IoVarKind::Void => 0,
            IoVarKind::Buffer => len,
            _ => INT_SIZE,
        }
    }
}

/// Direction of a variable access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Get,
    Set,
}

impl Action {
    /// Check if this is a SET.
    pub fn is_set(self) -> bool {
        self == Action::Set
    }
}

/// A (direction, variable id) pair; what a handler switches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionId(u32);

impl ActionId {
    /// GET of variable `id`.
    pub const fn get(id: u16) -> Self {
        Self((id as u32) << 1)
    }

    /// SET of variable `id`.
    pub const fn set(id: u16) -> Self {
        Self(((id as u32) << 1) | 1)
    }

    /// Build from a direction and id.
    pub fn new(action: Action, id: u16) -> Self {
        match action {
            Action::Get => Self::get(id),
            Action::Set => Self::set(id),
        }
    }

    /// The variable id.
    pub fn id(self) -> u16 {
        (self.0 >> 1) as u16
    }

    /// Check if this is a SET.
    pub fn is_set(self) -> bool {
        self.0 & 1 == 1
    }

    /// Raw encoded value.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

/// Validate a buffer length against a descriptor.
///
/// Integer kinds need room for an `int` in either direction. A buffer GET
/// needs at least the descriptor's minimum; a buffer SET takes any length.
/// Void variables accept anything and copy nothing.
pub fn length_check(vi: &IoVar, len: usize, is_set: bool) -> Result<()> {
    let needed = vi.required_len(is_set);
    if len < needed {
        return Err(Error::BufferTooShort {
            needed,
            actual: len,
        });
    }
    Ok(())
}

/// Look a name up in a descriptor table.
pub fn lookup<'a>(table: &'a [IoVar], name: &str) -> Option<&'a IoVar> {
    table.iter().find(|vi| vi.name == name)
}

/// A static descriptor table.
#[derive(Debug, Clone, Copy)]
pub struct Registry {
    table: &'static [IoVar],
}

impl Registry {
    /// Wrap a table.
    pub const fn new(table: &'static [IoVar]) -> Self {
        Self { table }
    }

    /// The driver's generic variables.
    pub const fn generic() -> Self {
        Self::new(DHD_IOVARS)
    }

    /// Find a descriptor by name.
    pub fn lookup(&self, name: &str) -> Result<&'static IoVar> {
        lookup(self.table, name).ok_or_else(|| Error::Unsupported(name.to_string()))
    }

    /// Iterate over the descriptors.
    pub fn iter(&self) -> impl Iterator<Item = &'static IoVar> {
        self.table.iter()
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Generic variable ids.
pub mod iov {
    pub const VERSION: u16 = 1;
    pub const MSGLEVEL: u16 = 2;
    pub const BCMERRORSTR: u16 = 3;
    pub const BCMERROR: u16 = 4;
    pub const WDTICK: u16 = 5;
    pub const DUMP: u16 = 6;
    pub const CONS: u16 = 7;
    pub const DCONSOLE_POLL: u16 = 8;
    pub const CLEARCOUNTS: u16 = 9;
    pub const GPIOOB: u16 = 13;
    pub const IOCTLTIMEOUT: u16 = 14;
}

/// The driver's generic variables.
pub const DHD_IOVARS: &[IoVar] = &[
    IoVar::new(
        "version",
        iov::VERSION,
        IoVarKind::Buffer,
        super::context::DHD_VERSION.len() + 1,
    ),
    IoVar::new("msglevel", iov::MSGLEVEL, IoVarKind::Uint32, 0),
    IoVar::new(
        "bcmerrorstr",
        iov::BCMERRORSTR,
        IoVarKind::Buffer,
        super::error::BCME_STRLEN,
    ),
    IoVar::new("bcmerror", iov::BCMERROR, IoVarKind::Int8, 0),
    IoVar::new("wdtick", iov::WDTICK, IoVarKind::Uint32, 0),
    IoVar::new(
        "dump",
        iov::DUMP,
        IoVarKind::Buffer,
        super::wlc::DHD_IOCTL_MAXLEN,
    ),
    IoVar::new("dconpoll", iov::DCONSOLE_POLL, IoVarKind::Uint32, 0),
    IoVar::new("cons", iov::CONS, IoVarKind::Buffer, 0),
    IoVar::new("clearcounts", iov::CLEARCOUNTS, IoVarKind::Void, 0),
    IoVar::new("gpioob", iov::GPIOOB, IoVarKind::Uint32, 0),
    IoVar::new("ioctl_timeout", iov::IOCTLTIMEOUT, IoVarKind::Uint32, 0),
];

/// Read the integer argument at the front of `buf` (0 if it is too short).
pub fn int_arg(buf: &[u8]) -> i32 {
    buf.get(..INT_SIZE)
        .and_then(|b| b.try_into().ok())
        .map(i32::from_le_bytes)
        .unwrap_or(0)
}

/// Write an integer reply, returning its size.
pub fn put_int(out: &mut [u8], value: i32) -> Result<usize> {
    let actual = out.len();
    let dst = out.get_mut(..INT_SIZE).ok_or(Error::BufferTooShort {
        needed: INT_SIZE,
        actual,
    })?;
    dst.copy_from_slice(&value.to_le_bytes());
    Ok(INT_SIZE)
}

/// Write a NUL-terminated string reply, returning the bytes written.
pub fn put_str(out: &mut [u8], s: &str) -> Result<usize> {
    let needed = s.len() + 1;
    if out.len() < needed {
        return Err(Error::BufferTooShort {
            needed,
            actual: out.len(),
        });
    }
    out[..s.len()].copy_from_slice(s.as_bytes());
    out[s.len()] = 0;
    Ok(needed)
}

/// Encode `name\0data` into `buf`, returning the encoded length.
pub fn mkiovar(name: &str, data: &[u8], buf: &mut [u8]) -> Result<usize> {
    let len = name.len() + 1 + data.len();
    if len > buf.len() {
        return Err(Error::BufferTooShort {
            needed: len,
            actual: buf.len(),
        });
    }
    buf[..name.len()].copy_from_slice(name.as_bytes());
    buf[name.len()] = 0;
    buf[name.len() + 1..len].copy_from_slice(data);
    Ok(len)
}

/// Builder for firmware `GET_VAR`/`SET_VAR` buffers.
///
/// ```ignore
/// let buf = IovarBuilder::new("bcn_timeout").append_u32(8).build();
/// transport.wl_ioctl(0, wlc_cmd::SET_VAR, &mut buf.clone(), true)?;
/// ```
#[derive(Debug, Clone)]
pub struct IovarBuilder {
    buf: Vec<u8>,
    header_len: usize,
}

impl IovarBuilder {
    /// Start a buffer for variable `name`.
    pub fn new(name: &str) -> Self {
        let mut buf = Vec::with_capacity(name.len() + 1 + INT_SIZE);
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
        let header_len = buf.len();
        Self { buf, header_len }
    }

    /// Current length.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if only the name has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.len() == self.header_len
    }

    /// Append raw bytes.
    pub fn append_bytes(mut self, data: &[u8]) -> Self {
        self.buf.extend_from_slice(data);
        self
    }

    /// Append a u16 (dongle order).
    pub fn append_u16(self, value: u16) -> Self {
        self.append_bytes(&value.to_le_bytes())
    }

    /// Append a u32 (dongle order).
    pub fn append_u32(self, value: u32) -> Self {
        self.append_bytes(&value.to_le_bytes())
    }

    /// Append an i32 (dongle order).
    pub fn append_i32(self, value: i32) -> Self {
        self.append_bytes(&value.to_le_bytes())
    }

    /// Zero-pad to at least `len` bytes, for requests whose reply reuses
    /// the buffer.
    pub fn pad_to(mut self, len: usize) -> Self {
        if self.buf.len() < len {
            self.buf.resize(len, 0);
        }
        self
    }

    /// Finish the buffer.
    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}
