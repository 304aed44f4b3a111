//! recorder: market data session capture binary
//!
//! Records one SoupBinTCP or MoldUDP64 session into a BinaryFILE.

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mdrec_metadata::RecorderConfig;
use mdrec_recorder_lib::{shutdown, BinaryFileWriter, Liveness, Runner, Writer};

#[derive(Parser, Debug)]
#[command(name = "recorder")]
#[command(about = "Record a market data session into a BinaryFILE")]
struct Args {
    /// Path to the session configuration file
    config: PathBuf,

    /// Output BinaryFILE, truncated if it exists
    output: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // Everything that can fail on configuration runs before the output is touched
    let config = RecorderConfig::load(&args.config)
        .and_then(|config| config.resolve())
        .map_err(|e| {
            error!(config = %args.config.display(), error = %e, "Invalid configuration");
            e
        })?;
    info!(transport = %config.kind(), "Loaded session configuration");

    let liveness = Liveness::new();
    let signals = shutdown::spawn(liveness.clone())?;

    let mut writer = BinaryFileWriter::create(&args.output).map_err(|e| {
        error!(output = %args.output.display(), error = %e, "Failed to create output file");
        e
    })?;

    let result = Runner::new(liveness).record(&config, &mut writer).await;
    let closed = writer.close().await;
    signals.abort();

    info!(
        output = %args.output.display(),
        messages = writer.messages(),
        "Recording finished"
    );

    if let Err(e) = result {
        error!(error = %e, "Recording failed");
        return Err(e.into());
    }
    if let Err(e) = closed {
        error!(error = %e, "Failed to close output file");
        return Err(e.into());
    }
    Ok(())
}
