//! Drowsiness Monitor - Main Entry Point

use anyhow::Context;
use clap::Parser;
use monitor::{init_logging, resolve_config, run, Args};
use pipeline::StopHandle;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    info!("=== Drowsiness Monitor v{} ===", env!("CARGO_PKG_VERSION"));

    let config = resolve_config(&args)?;

    let stop = StopHandle::default();
    let on_signal = stop.clone();
    ctrlc::set_handler(move || {
        info!("Interrupt received, finishing current frame and flushing results...");
        on_signal.stop();
    })
    .context("Failed to set Ctrl-C handler")?;

    let summary = run(&args, config, stop).await?;

    info!(
        "Processed {} frames, results saved to {}",
        summary.frames_processed,
        summary.output_path.display()
    );
    info!("Summary: {}", serde_json::to_string(&summary)?);

    Ok(())
}
