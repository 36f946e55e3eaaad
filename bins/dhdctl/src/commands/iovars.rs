//! dhdctl iovars command implementation.

use clap::Args;
use dhd::dongle::Registry;

#[derive(Args)]
pub struct IovarsCmd {
    /// Show only this variable.
    name: Option<String>,
}

impl IovarsCmd {
    pub fn run(&self, json: bool) -> anyhow::Result<()> {
        let registry = Registry::generic();
        let vars: Vec<_> = match &self.name {
            Some(name) => vec![registry.lookup(name)?],
            None => registry.iter().collect(),
        };

        if json {
            let out: Vec<_> = vars
                .iter()
                .map(|vi| {
                    serde_json::json!({
                        "name": vi.name,
                        "id": vi.id,
                        "kind": vi.kind.name(),
                        "get_len": vi.required_len(false),
                        "set_len": vi.required_len(true),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
            return Ok(());
        }

        println!("{:<14} {:>3}  {:<7} {:>7}", "NAME", "ID", "KIND", "GET-LEN");
        for vi in vars {
            println!(
                "{:<14} {:>3}  {:<7} {:>7}",
                vi.name,
                vi.id,
                vi.kind.name(),
                vi.required_len(false)
            );
        }
        Ok(())
    }
}
