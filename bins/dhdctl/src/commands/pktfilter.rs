//! dhdctl pktfilter command implementation.

use clap::Args;
use dhd::dongle::PktFilter;
use dhd::dongle::preinit::pkt_filter_enable_bytes;

#[derive(Args)]
pub struct PktFilterCmd {
    /// Filter: "<id> <polarity> <type> <offset> <bitmask> <pattern>".
    #[arg(required = true, num_args = 1..)]
    spec: Vec<String>,
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl PktFilterCmd {
    pub fn run(&self, json: bool) -> anyhow::Result<()> {
        let spec = self.spec.join(" ");
        let filter: PktFilter = spec.parse()?;
        let add = filter.to_bytes();
        let enable = pkt_filter_enable_bytes(filter.id, true);

        if json {
            let out = serde_json::json!({
                "id": filter.id,
                "negate_match": filter.negate_match,
                "type": filter.filter_type,
                "offset": filter.offset,
                "mask": hex(&filter.mask),
                "pattern": hex(&filter.pattern),
                "pkt_filter_add": hex(&add),
                "pkt_filter_enable": hex(&enable),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        } else {
            println!("pkt_filter_add    {}", hex(&add));
            println!("pkt_filter_enable {}", hex(&enable));
        }
        Ok(())
    }
}
