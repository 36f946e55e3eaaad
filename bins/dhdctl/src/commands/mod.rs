//! Subcommand implementations.

pub mod config;
pub mod event;
pub mod iovars;
pub mod pktfilter;
pub mod preinit;

use dhd::dongle::DriverConfig;

/// Load `path`, or the defaults when no file is given.
pub fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<DriverConfig> {
    match path {
        Some(path) => DriverConfig::from_file(path)
            .map_err(|e| anyhow::anyhow!("{}: {e}", path.display())),
        None => Ok(DriverConfig::default()),
    }
}

/// Hex string, with or without `0x`, to bytes. Whitespace and `:` are ignored.
pub fn parse_hex(s: &str) -> anyhow::Result<Vec<u8>> {
    let digits: String = s
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    let bytes = dhd::util::parse_hex_pattern(&format!("0x{digits}"))?;
    Ok(bytes)
}
