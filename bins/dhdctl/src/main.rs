//! dhdctl - inspect and exercise the dongle host driver core.
//!
//! Everything runs against in-memory collaborators, so no adapter is needed:
//! decode captured event frames, list the generic variables, validate a
//! driver configuration or dry-run the firmware pre-initialization.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "dhdctl", version, about = "Dongle host driver tool")]
struct Cli {
    /// Output JSON.
    #[arg(short = 'j', long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the driver's generic variables.
    #[command(visible_alias = "iov")]
    Iovars(commands::iovars::IovarsCmd),

    /// Decode firmware event frames.
    #[command(visible_alias = "ev")]
    Event(commands::event::EventCmd),

    /// Show or validate a driver configuration.
    Config(commands::config::ConfigCmd),

    /// Encode a packet filter.
    #[command(name = "pktfilter")]
    PktFilter(commands::pktfilter::PktFilterCmd),

    /// Dry-run the firmware pre-initialization sequence.
    Preinit(commands::preinit::PreinitCmd),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Iovars(cmd) => cmd.run(cli.json),
        Command::Event(cmd) => cmd.run(cli.json).await,
        Command::Config(cmd) => cmd.run(cli.json),
        Command::PktFilter(cmd) => cmd.run(cli.json),
        Command::Preinit(cmd) => cmd.run(cli.json),
    }
}
