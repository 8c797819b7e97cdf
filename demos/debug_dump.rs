// Raw-debug dump
//
// Switches the module into raw-debug mode and prints the SPI register
// snapshot and converted ADC value of the first few samples.

use clap::Parser;
use pmod_ad1_rs::{Acquisition, AcquisitionConfig, ChannelConfig, ConsoleSink, PmodConnector, SessionSink};

#[derive(Parser)]
#[command(name = "debug_dump")]
#[command(about = "Print raw SPI and ADC values from the PmodAD1 debug mode")]
struct Args {
    /// Serial port (e.g. /dev/ttyUSB0 or COM13). Defaults to the first USB port
    #[arg(short, long)]
    port: Option<String>,

    /// Number of samples to read
    #[arg(short = 'n', long, default_value_t = 10)]
    samples: usize,

    /// Show debug information and detailed logs
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let channel_config = ChannelConfig {
        port: args.port,
        ..ChannelConfig::default()
    };
    let channel = PmodConnector::open(&channel_config)?;
    println!("Connected to {}", channel.name());

    let config = AcquisitionConfig {
        debug_sample_count: args.samples,
        ..AcquisitionConfig::default()
    };
    let report = Acquisition::new(config).raw_debug(channel)?;

    ConsoleSink::stdout().emit(&report.session)?;
    if report.session.len() < args.samples {
        println!(
            "Only {} of {} samples received ({})",
            report.session.len(),
            args.samples,
            report.session.termination()
        );
    }
    if let Some(e) = &report.failure {
        eprintln!("Transport error: {}", e);
    }
    if let Some(e) = report.release_error {
        eprintln!("Warning: could not close port cleanly: {}", e);
    }
    Ok(())
}
