//! FM Capture - wideband FM receiver on a native RTL-SDR
//!
//! Captures raw IQ samples from RTL-SDR, demodulates mono broadcast FM,
//! plays the audio live and optionally records it to a WAV file on exit.

mod audio;
mod config;
mod device;
mod receiver;
mod sdr;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use audio::{AudioOutput, AudioSink, NullOutput, PipeOutput};
use config::{Args, CaptureConfig, AUDIO_RATE};
use device::ShutdownController;
use receiver::FmReceiver;
use sdr::{DemodulationEngine, DeviceHandle};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    info!("===========================================");
    info!("   FM Capture - Native RTL-SDR");
    info!("   mono broadcast FM receiver");
    info!("===========================================");

    let config = CaptureConfig::from(args);

    // Reject bad rate chains before touching any hardware
    let plan = match config.validate() {
        Ok(plan) => plan,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Configuration:");
    info!("  Frequency: {} Hz", config.center_frequency_hz);
    info!("  Capture rate: {} Hz", plan.capture_rate);
    info!(
        "  Decimation: {} -> {} -> {} Hz (x{}, x{})",
        plan.capture_rate, plan.intermediate_rate, plan.audio_rate, plan.stage1_factor, plan.stage2_factor
    );
    info!("  Block length: {} samples", config.block_length());
    info!("  Recording: {}", if config.record_to_file { "on" } else { "off" });

    let output: Box<dyn AudioOutput> = if config.audio_enabled {
        match PipeOutput::open(&config.player) {
            Ok(output) => Box::new(output),
            Err(e) => {
                error!("Failed to open audio output: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        info!("Audio output disabled (--no-audio)");
        Box::new(NullOutput)
    };

    let device = match DeviceHandle::open(&config.sdr_config()) {
        Ok(device) => device,
        Err(e) => {
            error!("Failed to open RTL-SDR: {}", e);
            error!("Make sure RTL-SDR device is connected and rtl_sdr is installed.");
            std::process::exit(1);
        }
    };

    let controller = Arc::new(ShutdownController::new());
    let sink = AudioSink::new(output, config.record_to_file, config.output_dir.clone(), AUDIO_RATE);
    let receiver = FmReceiver::new(DemodulationEngine::new(plan), sink, controller.stats());

    controller
        .start(device, config.block_length(), receiver)
        .context("Failed to start capture")?;

    info!("===========================================");
    info!("  Listening on {:.1} MHz", config.center_frequency_hz as f64 / 1_000_000.0);
    info!("  Press Ctrl+C to stop.");
    info!("===========================================");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut poll = tokio::time::interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result.context("Failed to listen for Ctrl+C")?;
                info!("Ctrl+C detected. Releasing resources...");
                break;
            }
            _ = poll.tick() => {
                if controller.capture_finished() {
                    warn!("SDR capture stopped unexpectedly");
                    break;
                }
            }
        }
    }

    // Further interrupts while stopping are absorbed here
    let watcher = {
        let controller = controller.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if controller.is_shutting_down() {
                    warn!("Shutdown already in progress");
                }
            }
        })
    };

    let stopping = controller.clone();
    let result = tokio::task::spawn_blocking(move || stopping.request_shutdown())
        .await
        .context("Shutdown task panicked")?;
    watcher.abort();

    match result {
        Ok(_) => {
            info!("Shutdown complete.");
            Ok(())
        }
        Err(e) => {
            error!("Shutdown failed: {:#}", e);
            std::process::exit(1);
        }
    }
}
