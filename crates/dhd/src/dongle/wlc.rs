//! Firmware command numbers and protocol constants.
//!
//! These values are fixed by the dongle firmware and by the control
//! interface that user space talks to; they are not configurable.

/// Control interface commands (the `cmd` field of a host ioctl).
pub mod dhd_cmd {
    pub const GET_MAGIC: u32 = 0;
    pub const GET_VERSION: u32 = 1;
    pub const GET_VAR: u32 = 2;
    pub const SET_VAR: u32 = 3;
}

/// Reply to [`dhd_cmd::GET_MAGIC`] (`"DHD"` in little-endian ASCII).
pub const DHD_IOCTL_MAGIC: u32 = 0x0044_4944;
/// Reply to [`dhd_cmd::GET_VERSION`].
pub const DHD_IOCTL_VERSION: u32 = 1;
/// Largest control buffer the host side accepts.
pub const DHD_IOCTL_MAXLEN: usize = 8192;

/// Firmware ioctl numbers (`WLC_*`).
pub mod wlc_cmd {
    pub const UP: u32 = 2;
    pub const DOWN: u32 = 3;
    pub const SET_ROAM_DELTA: u32 = 57;
    pub const SET_ROAM_SCAN_PERIOD: u32 = 59;
    pub const SET_COUNTRY: u32 = 84;
    pub const SET_PM: u32 = 86;
    pub const SET_ASSOC_PREFER: u32 = 205;
    pub const GET_VAR: u32 = 262;
    pub const SET_VAR: u32 = 263;
}

/// Small firmware ioctl buffer.
pub const WLC_IOCTL_SMLEN: usize = 256;
/// Largest firmware ioctl buffer.
pub const WLC_IOCTL_MAXLEN: usize = 8192;

/// Length of the firmware event-enable bit vector.
pub const WL_EVENTING_MASK_LEN: usize = 16;

/// Host/dongle receive alignment for the SDIO bus.
pub const DHD_SDALIGN: u32 = 32;

/// Band identifiers.
pub mod band {
    pub const AUTO: i32 = 0;
    pub const BAND_5G: i32 = 1;
    pub const BAND_2G: i32 = 2;
    pub const ALL: i32 = 3;
}

/// 802.11 authentication algorithms reported in `auth_type`.
pub mod dot11_auth {
    pub const OPEN_SYSTEM: u32 = 0;
    pub const SHARED_KEY: u32 = 1;
}

/// Incremental scan request actions.
pub mod scan_action {
    pub const START: u16 = 1;
    pub const CONTINUE: u16 = 2;
    pub const ABORT: u16 = 3;
}

/// `iscan` request structure version.
pub const ISCAN_REQ_VERSION: u32 = 1;
/// Size of one incremental scan result buffer.
pub const WLC_IW_ISCAN_MAXLEN: usize = 2048;
/// BSS record format version understood by the scan cache.
pub const WL_BSS_INFO_VERSION: u32 = 109;
