// Filtered stream capture
//
// Switches the module into FIR streaming mode, captures until the stream
// goes quiet (or Ctrl+C), and stores one decimal value per line.

use clap::Parser;
use pmod_ad1_rs::{
    Acquisition, AcquisitionConfig, CancellationToken, ChannelConfig, DecimalLineSink,
    PmodConnector, SessionSink, Termination,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "fir_capture")]
#[command(about = "Capture the FIR-filtered ADC stream to a text file")]
struct Args {
    /// Serial port (e.g. /dev/ttyUSB0 or COM13). Defaults to the first USB port
    #[arg(short, long)]
    port: Option<String>,

    /// Output file, one value per line
    #[arg(short, long, default_value = "raw_ad_fir.txt")]
    output: PathBuf,

    /// Maximum number of samples to capture
    #[arg(short, long, default_value_t = 10_000)]
    max_samples: usize,

    /// Read timeout in milliseconds after which the stream is considered ended
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,

    /// Delay in milliseconds after the mode command before reading
    #[arg(long, default_value_t = 100)]
    settle_ms: u64,

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

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    ctrlc::set_handler(move || {
        cancel_clone.cancel();
    })?;

    let channel_config = ChannelConfig {
        port: args.port,
        read_timeout: Duration::from_millis(args.timeout_ms),
        ..ChannelConfig::default()
    };
    let channel = PmodConnector::open(&channel_config)?;
    println!("Connected to {}. Press Ctrl+C to stop", channel.name());

    let config = AcquisitionConfig {
        stream_max_samples: args.max_samples,
        stream_settle: Duration::from_millis(args.settle_ms),
        ..AcquisitionConfig::default()
    };
    let report = Acquisition::new(config)
        .with_cancellation(cancel)
        .streaming(channel)?;

    match report.session.termination() {
        Termination::Cancelled => println!("Interrupted by user"),
        Termination::EndOfStream => println!("Stream ended: {} samples received", report.session.len()),
        other => println!("Stopped: {}", other),
    }
    if let Some(e) = &report.failure {
        eprintln!("Transport error: {}. Saving what was captured", e);
    }

    let mut sink = DecimalLineSink::create(&args.output)?;
    let saved = sink.emit(&report.session)?;
    println!("Capture complete: {} samples saved to {}", saved, args.output.display());

    if let Some(e) = report.release_error {
        eprintln!("Warning: could not close port cleanly: {}", e);
    }
    Ok(())
}
