//! Tone producer
//!
//! Writes one complex tone per stream into the FIFO with `write_sync`, paced
//! to the baseband rate so the FIFO neither drains nor overflows.

use std::f32::consts::TAU;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel;
use iqflow_core::dsp::SampleMiFifo;
use iqflow_core::output::Throttle;
use iqflow_core::IqSample;

use crate::config::ToneConfig;

/// Per-stream oscillators
pub struct ToneGenerator {
    phases: Vec<f32>,
    steps: Vec<f32>,
    amplitude: f32,
    blocks: Vec<Vec<IqSample>>,
}

impl ToneGenerator {
    pub fn new(config: &ToneConfig, streams: usize, rate: u32) -> Self {
        let rate = rate.max(1) as f32;
        Self {
            phases: vec![0.0; streams],
            steps: (0..streams)
                .map(|s| TAU * config.offset_for(s) / rate)
                .collect(),
            amplitude: config.amplitude,
            blocks: vec![Vec::new(); streams],
        }
    }

    /// Produce the next `count` samples of every stream
    pub fn next_blocks(&mut self, count: usize) -> &[Vec<IqSample>] {
        for ((block, phase), step) in self.blocks.iter_mut().zip(&mut self.phases).zip(&self.steps) {
            block.clear();
            for _ in 0..count {
                block.push(IqSample::from_phase(*phase).scale(self.amplitude));
                *phase = (*phase + step).rem_euclid(TAU);
            }
        }
        &self.blocks
    }
}

/// Background thread feeding the FIFO
pub struct ToneProducer {
    shutdown: Arc<AtomicBool>,
    written: Arc<AtomicU64>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ToneProducer {
    pub fn spawn(
        fifo: Arc<SampleMiFifo<IqSample>>,
        config: &ToneConfig,
        rate: u32,
    ) -> io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let written = Arc::new(AtomicU64::new(0));
        let thread_shutdown = shutdown.clone();
        let thread_written = written.clone();
        let mut generator = ToneGenerator::new(config, fifo.stream_count(), rate);
        let period = Duration::from_millis(config.period_ms.max(1));

        let handle = thread::Builder::new()
            .name("tone-producer".to_string())
            .spawn(move || {
                log::info!("[Tone] Producing {} streams at {} S/s", fifo.stream_count(), rate);
                let ticker = channel::tick(period);
                let mut throttle = Throttle::new();
                let mut last = Instant::now();

                while !thread_shutdown.load(Ordering::Acquire) {
                    let Ok(now) = ticker.recv() else {
                        break;
                    };
                    let count = throttle.due(rate, now.saturating_duration_since(last), fifo.capacity());
                    last = now;
                    if count == 0 {
                        continue;
                    }
                    let blocks = generator.next_blocks(count);
                    if fifo.write_sync(blocks, count) {
                        thread_written.fetch_add(count as u64, Ordering::Relaxed);
                    } else {
                        log::debug!("[Tone] FIFO layout changed, block dropped");
                    }
                }
                log::info!("[Tone] Stopped");
            })?;

        Ok(Self {
            shutdown,
            written,
            handle: Some(handle),
        })
    }

    /// Samples per stream written so far
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }
}

impl Drop for ToneProducer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("[Tone] Producer thread panicked");
            }
        }
    }
}
