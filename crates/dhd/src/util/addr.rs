//! Address formatting utilities.

/// Length of an Ethernet (BSSID) address.
pub const ETHER_ADDR_LEN: usize = 6;

/// Broadcast address.
pub const ETHER_BCAST: [u8; ETHER_ADDR_LEN] = [0xff; ETHER_ADDR_LEN];

/// Format a MAC address.
pub fn format_mac(bytes: &[u8]) -> String {
    if bytes.len() >= ETHER_ADDR_LEN {
        format!(
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]
        )
    } else {
        bytes
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(":")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mac() {
        assert_eq!(format_mac(&ETHER_BCAST), "ff:ff:ff:ff:ff:ff");
        assert_eq!(format_mac(&[0x00, 0x10, 0x18, 0xaa, 0xbb, 0xcc]), "00:10:18:aa:bb:cc");
        assert_eq!(format_mac(&[1, 2]), "01:02");
    }
}
