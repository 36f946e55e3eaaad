//! Shared utilities for dhd.

pub mod addr;
pub mod ifname;
pub mod parse;

pub use addr::format_mac;
pub use parse::{get_u32, parse_hex_pattern};
