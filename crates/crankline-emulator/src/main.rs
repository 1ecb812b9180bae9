//! Emulator binary.
//!
//! # Usage
//!
//! ```bash
//! # Split protocol (control on 6000, data on 5999)
//! crankline-emulator
//!
//! # Legacy poll protocol on the control port only
//! crankline-emulator --legacy
//!
//! # Custom ports and cadence
//! crankline-emulator --control 0.0.0.0:7000 --data 0.0.0.0:7001 --frequency 100
//! ```
//!
//! Exits cleanly on SIGINT: both listeners close and all workers join.

use std::net::SocketAddr;

use clap::Parser;
use crankline_emulator::{
    DEFAULT_CONTROL_PORT, DEFAULT_DATA_PORT, Emulator, EmulatorConfig, LegacyEmulator,
};
use crankline_proto::ChannelSet;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Crankline pedal device emulator
#[derive(Parser, Debug)]
#[command(name = "crankline-emulator")]
#[command(about = "Serves synthetic pedal telemetry over the crankline wire protocols")]
#[command(version)]
struct Args {
    /// Address to bind the control listener to
    #[arg(long, default_value_t = SocketAddr::from(([0, 0, 0, 0], DEFAULT_CONTROL_PORT)))]
    control: SocketAddr,

    /// Address to bind the datagram data socket to
    #[arg(long, default_value_t = SocketAddr::from(([0, 0, 0, 0], DEFAULT_DATA_PORT)))]
    data: SocketAddr,

    /// Default sampling frequency in Hz
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u32).range(1..))]
    frequency: u32,

    /// Default samples per emitted block
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u16).range(1..))]
    samples_per_block: u16,

    /// Serve the legacy poll protocol instead of the split protocol
    #[arg(long)]
    legacy: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config = EmulatorConfig {
        control_addr: args.control,
        data_addr: args.data,
        frequency: args.frequency,
        samples_per_block: args.samples_per_block,
        channels: ChannelSet::all(),
    };

    if args.legacy {
        let emulator = LegacyEmulator::bind(config)?;
        let shutdown = emulator.shutdown_handle();
        ctrlc::set_handler(move || shutdown.shutdown())?;
        emulator.run()?;
    } else {
        let emulator = Emulator::bind(config)?;
        let shutdown = emulator.shutdown_handle();
        ctrlc::set_handler(move || shutdown.shutdown())?;
        emulator.run()?;
    }

    tracing::info!("emulator exited");
    Ok(())
}
