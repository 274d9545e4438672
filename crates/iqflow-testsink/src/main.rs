//! iqflow test sink - headless output device exerciser
//!
//! Wires a tone producer into the multi-stream FIFO, runs the output driver
//! on its own message pump and drives it through an [`OutputController`]
//! exactly as a GUI would: debounced settings, start/stop requests and
//! periodic stream timing polls.
//!
//! ## Usage
//!
//! ```text
//! iqflow-testsink [CONFIG]
//! ```
//!
//! `CONFIG` defaults to `~/.config/iqflow/testsink.yaml`; a default file is
//! written there on first run. Set `RUST_LOG=debug` for verbose output.

mod config;
mod tone;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam::channel;
use iqflow_core::config::{load_config, save_config};
use iqflow_core::output::{Message, MessagePump, OutputController};

use config::TestSinkConfig;
use tone::ToneProducer;

/// How long to wait for the driver to confirm shutdown
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(config::default_config_file);

    if !config_path.exists() {
        save_config(&TestSinkConfig::default(), &config_path)
            .context("Failed to write default config")?;
    }
    let config: TestSinkConfig = load_config(&config_path);
    log::info!("iqflow-testsink starting with {:?}", config_path);

    run(&config)
}

fn run(config: &TestSinkConfig) -> Result<()> {
    let pipeline = &config.pipeline;
    let fifo = pipeline.build_fifo();
    let driver = Arc::new(pipeline.build_driver(fifo.clone())?);
    log::info!("Output device: {}", driver.description());

    let _pump = MessagePump::spawn(driver.clone()).context("Failed to spawn driver thread")?;
    let producer = ToneProducer::spawn(fifo.clone(), &config.tone, pipeline.output.baseband_rate())
        .context("Failed to spawn tone producer")?;

    let mut controller = OutputController::for_driver(&driver)
        .with_status_interval(config.run.timing_interval_ticks);
    controller.set_settings(pipeline.output);
    controller.update_hardware();
    controller.start_stop(true);

    let status = channel::tick(Duration::from_millis(config.run.status_ms.max(1)));
    let update = channel::tick(Duration::from_millis(config.run.update_ms.max(1)));
    let deadline = config
        .run
        .duration_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut last_count = 0;

    while deadline.map_or(true, |d| Instant::now() < d) {
        channel::select! {
            recv(status) -> _ => {
                controller.tick();
                if controller.samples_count() != last_count {
                    last_count = controller.samples_count();
                    log::info!(
                        "Streaming: {} samples consumed, {} produced, fifo {}/{}",
                        last_count,
                        producer.written(),
                        fifo.readable(0),
                        fifo.capacity()
                    );
                }
            }
            recv(update) -> _ => {
                controller.update_hardware();
            }
        }

        for message in driver.downstream_queue().drain() {
            if let Message::SignalChanged(signal) = message {
                log::info!(
                    "Signal: {} S/s at {} Hz",
                    signal.sample_rate,
                    signal.center_frequency
                );
            }
            controller.handle_message(&message);
        }
    }

    controller.start_stop(false);
    let stop_deadline = Instant::now() + STOP_TIMEOUT;
    while controller.generation() && Instant::now() < stop_deadline {
        std::thread::sleep(Duration::from_millis(10));
        controller.handle_input_messages();
    }
    if controller.generation() {
        log::warn!("Driver did not confirm stop, stopping directly");
        driver.stop();
    }

    log::info!(
        "Done: {} samples consumed, {} produced, {} overwritten in fifo",
        driver.samples_count().unwrap_or(last_count),
        producer.written(),
        fifo.dropped(0)
    );
    Ok(())
}
