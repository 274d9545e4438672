//! Output worker thread
//!
//! The worker consumes the FIFO at the configured baseband rate and feeds the
//! sink. Control follows the engine pattern used elsewhere in the crate:
//!
//! - **Commands** travel from the driver over a lock-free `rtrb` ring and are
//!   applied at tick boundaries.
//! - **Status** (`samples_count`, `underrun_count`, `working`) lives in
//!   [`WorkerAtomics`] so the driver reads it without locks.
//! - **Shutdown** is an `AtomicBool` checked every tick, followed by a join.
//!
//! ```text
//!  tick ──► apply commands ──► Throttle::due ──► drain FIFO into staging
//!                                                        │
//!   sink ◄── filter chain ◄── interpolate x2^n ◄── take `chunk` per stream
//! ```
//!
//! The per-tick processing is in [`WorkerCore`], which has no thread of its
//! own and can be driven directly.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel;
use serde::{Deserialize, Serialize};

use super::sink::{NullSink, SampleSink};
use crate::dsp::{FilterKind, IqFilterChain, Interpolator, SampleMiFifo};
use crate::types::{IqSample, MAX_LOG2_INTERP};

/// Capacity of the driver → worker command ring
pub const WORKER_COMMAND_CAPACITY: usize = 64;

/// Parking place for the sink while no worker thread holds it
///
/// The worker takes the sink when its thread starts and puts it back on exit,
/// so a failed spawn or a finished run never loses it.
pub type SinkSlot = Arc<Mutex<Option<Box<dyn SampleSink>>>>;

/// Worker timing parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Pacing tick in milliseconds
    pub tick_ms: u64,
    /// Stack size for the worker thread (platform default when unset)
    pub stack_size: Option<usize>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick_ms: 20,
            stack_size: None,
        }
    }
}

impl WorkerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

/// Commands sent from the driver to the worker thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerCommand {
    SetSampleRate(u32),
    SetLog2Interp(u32),
    StartWork,
    StopWork,
}

/// Lock-free worker status
#[derive(Debug, Default)]
pub struct WorkerAtomics {
    /// Baseband samples per stream consumed since the worker was created
    pub samples_count: AtomicU64,
    /// Ticks on which at least one stream had to be zero-padded
    pub underrun_count: AtomicU64,
    /// Whether the worker is consuming
    pub working: AtomicBool,
    /// Sample rate last applied on the worker thread
    pub sample_rate: AtomicU32,
    /// Interpolation exponent last applied on the worker thread
    pub log2_interp: AtomicU32,
}

impl WorkerAtomics {
    pub fn samples_count(&self) -> u64 {
        self.samples_count.load(Ordering::Acquire)
    }

    pub fn underrun_count(&self) -> u64 {
        self.underrun_count.load(Ordering::Relaxed)
    }

    pub fn is_working(&self) -> bool {
        self.working.load(Ordering::Acquire)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    pub fn log2_interp(&self) -> u32 {
        self.log2_interp.load(Ordering::Relaxed)
    }
}

/// Converts elapsed time into a whole number of due samples
///
/// The fractional remainder carries to the next call so the long-run count
/// matches the rate exactly.
#[derive(Debug, Default, Clone)]
pub struct Throttle {
    carry: f64,
}

impl Throttle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples due after `elapsed` at `rate`, capped at `limit`
    ///
    /// Time beyond the cap is discarded rather than carried.
    pub fn due(&mut self, rate: u32, elapsed: Duration, limit: usize) -> usize {
        let exact = self.carry + rate as f64 * elapsed.as_secs_f64();
        let whole = exact.floor();
        if whole >= limit as f64 {
            self.carry = 0.0;
            return limit;
        }
        self.carry = exact - whole;
        whole as usize
    }

    /// Forget any carried fraction
    pub fn reset(&mut self) {
        self.carry = 0.0;
    }
}

/// Per-tick processing state of the worker
pub struct WorkerCore {
    fifo: Arc<SampleMiFifo<IqSample>>,
    filter_kinds: Vec<FilterKind>,
    sample_rate: u32,
    log2_interp: u32,
    working: bool,
    throttle: Throttle,
    staging: Vec<VecDeque<IqSample>>,
    interpolators: Vec<Interpolator<IqSample>>,
    filters: Vec<IqFilterChain>,
    baseband: Vec<IqSample>,
    blocks: Vec<Vec<IqSample>>,
    sink: Box<dyn SampleSink>,
    atomics: Arc<WorkerAtomics>,
}

impl WorkerCore {
    /// Create an idle core; it consumes nothing until `StartWork`
    pub fn new(
        fifo: Arc<SampleMiFifo<IqSample>>,
        filter_kinds: Vec<FilterKind>,
        sink: Box<dyn SampleSink>,
        atomics: Arc<WorkerAtomics>,
    ) -> Self {
        let mut core = Self {
            fifo,
            filter_kinds,
            sample_rate: 0,
            log2_interp: 0,
            working: false,
            throttle: Throttle::new(),
            staging: Vec::new(),
            interpolators: Vec::new(),
            filters: Vec::new(),
            baseband: Vec::new(),
            blocks: Vec::new(),
            sink,
            atomics,
        };
        core.match_stream_count();
        core
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn log2_interp(&self) -> u32 {
        self.log2_interp
    }

    pub fn is_working(&self) -> bool {
        self.working
    }

    /// Rate at which samples leave the FIFO
    pub fn baseband_rate(&self) -> u32 {
        self.sample_rate >> self.log2_interp
    }

    pub fn apply_command(&mut self, command: WorkerCommand) {
        match command {
            WorkerCommand::SetSampleRate(rate) => {
                log::debug!("[Worker] Sample rate {} -> {}", self.sample_rate, rate);
                self.sample_rate = rate;
                self.throttle.reset();
                self.atomics.sample_rate.store(rate, Ordering::Relaxed);
            }
            WorkerCommand::SetLog2Interp(log2) => {
                let log2 = log2.min(MAX_LOG2_INTERP);
                if log2 != self.log2_interp {
                    log::debug!("[Worker] Interpolation x{} -> x{}", 1 << self.log2_interp, 1 << log2);
                    self.log2_interp = log2;
                    for interp in &mut self.interpolators {
                        interp.set_log2(log2);
                    }
                    self.throttle.reset();
                    self.atomics.log2_interp.store(log2, Ordering::Relaxed);
                }
            }
            WorkerCommand::StartWork => {
                self.working = true;
                self.atomics.working.store(true, Ordering::Release);
            }
            WorkerCommand::StopWork => {
                self.working = false;
                self.throttle.reset();
                self.atomics.working.store(false, Ordering::Release);
            }
        }
    }

    /// Advance by `elapsed`; returns the chunk size processed
    pub fn tick(&mut self, elapsed: Duration) -> usize {
        if !self.working {
            return 0;
        }
        let limit = self.fifo.capacity().max(1);
        let chunk = self.throttle.due(self.baseband_rate(), elapsed, limit);
        if chunk > 0 {
            self.run_chunk(chunk);
        }
        chunk
    }

    /// Consume exactly `chunk` baseband samples per stream and deliver them
    pub fn run_chunk(&mut self, chunk: usize) {
        self.match_stream_count();
        self.drain_fifo();

        let mut underrun = false;
        for stream in 0..self.staging.len() {
            let staged = &mut self.staging[stream];
            let available = staged.len().min(chunk);
            underrun |= available < chunk;

            self.baseband.clear();
            self.baseband.extend(staged.drain(..available));
            self.baseband.resize(chunk, IqSample::zero());

            let block = &mut self.blocks[stream];
            self.interpolators[stream].process(&self.baseband, block);
            self.filters[stream].process_in_place(block);
        }

        if underrun {
            let total = self.atomics.underrun_count.fetch_add(1, Ordering::Relaxed) + 1;
            if total.is_power_of_two() {
                log::warn!("[Worker] FIFO underrun ({} so far), padding with silence", total);
            }
        }

        self.sink.consume(&self.blocks);
        self.atomics.samples_count.fetch_add(chunk as u64, Ordering::AcqRel);
        log::trace!("[Worker] Delivered {} samples x{} streams", chunk, self.blocks.len());
    }

    /// Hand the sink back, flushing it first
    pub fn into_sink(mut self) -> Box<dyn SampleSink> {
        if let Err(e) = self.sink.flush() {
            log::warn!("[Worker] Flushing sink '{}' failed: {}", self.sink.name(), e);
        }
        self.sink
    }

    /// Move everything readable from the FIFO into staging
    ///
    /// Staging is bounded by the FIFO capacity; the oldest samples go first.
    fn drain_fifo(&mut self) {
        let limit = self.fifo.capacity();
        let read = self.fifo.read_sync();
        for (stream, staged) in self.staging.iter_mut().enumerate() {
            if let Some((part1, part2)) = read.parts(stream) {
                staged.extend(part1.iter().chain(part2.iter()).copied());
            }
            if staged.len() > limit {
                let excess = staged.len() - limit;
                staged.drain(..excess);
                log::debug!("[Worker] Stream {} staging overrun, dropped {}", stream, excess);
            }
        }
    }

    /// Keep per-stream state in line with the FIFO's current layout
    fn match_stream_count(&mut self) {
        let streams = self.fifo.stream_count();
        if streams == self.staging.len() {
            return;
        }
        log::debug!("[Worker] Stream count {} -> {}", self.staging.len(), streams);
        self.staging.resize_with(streams, VecDeque::new);
        self.blocks.resize_with(streams, Vec::new);
        self.interpolators.truncate(streams);
        self.filters.truncate(streams);
        while self.interpolators.len() < streams {
            self.interpolators.push(Interpolator::new(self.log2_interp));
            self.filters.push(IqFilterChain::from_kinds(&self.filter_kinds));
        }
    }
}

/// Handle to a running worker thread
///
/// Dropping the handle stops the thread and waits for it.
pub struct OutputWorker {
    commands: rtrb::Producer<WorkerCommand>,
    atomics: Arc<WorkerAtomics>,
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl OutputWorker {
    /// Spawn the worker thread, bound to `fifo`
    ///
    /// The thread takes the sink out of `sink_slot` and returns it there when
    /// it exits. On spawn failure the slot is left untouched.
    pub fn spawn(
        fifo: Arc<SampleMiFifo<IqSample>>,
        filter_kinds: Vec<FilterKind>,
        sink_slot: SinkSlot,
        config: &WorkerConfig,
    ) -> io::Result<Self> {
        let (commands, consumer) = rtrb::RingBuffer::new(WORKER_COMMAND_CAPACITY);
        let atomics = Arc::new(WorkerAtomics::default());
        let shutdown = Arc::new(AtomicBool::new(false));
        let tick = config.tick_interval();

        let thread_atomics = atomics.clone();
        let thread_shutdown = shutdown.clone();

        let mut builder = thread::Builder::new().name("output-worker".to_string());
        if let Some(size) = config.stack_size {
            builder = builder.stack_size(size);
        }
        let handle = builder.spawn(move || {
            let sink = sink_slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
                .unwrap_or_else(|| Box::new(NullSink::new()));
            let core = WorkerCore::new(fifo, filter_kinds, sink, thread_atomics);
            let core = Self::run_loop(core, consumer, thread_shutdown, tick);
            *sink_slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(core.into_sink());
        })?;

        Ok(Self {
            commands,
            atomics,
            shutdown,
            handle: Some(handle),
        })
    }

    /// Queue a command for the next tick
    ///
    /// Returns the command back if the ring is full.
    pub fn send(&mut self, command: WorkerCommand) -> Result<(), WorkerCommand> {
        self.commands.push(command).map_err(|e| match e {
            rtrb::PushError::Full(value) => value,
        })
    }

    pub fn atomics(&self) -> &Arc<WorkerAtomics> {
        &self.atomics
    }

    pub fn samples_count(&self) -> u64 {
        self.atomics.samples_count()
    }

    pub fn is_working(&self) -> bool {
        self.atomics.is_working()
    }

    /// Signal the thread and wait for it; the sink is back in its slot afterwards
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            log::debug!("[Worker] Waiting for worker thread to stop...");
            if handle.join().is_err() {
                log::error!("[Worker] Worker thread panicked");
            }
        }
    }

    fn run_loop(
        mut core: WorkerCore,
        mut commands: rtrb::Consumer<WorkerCommand>,
        shutdown: Arc<AtomicBool>,
        tick: Duration,
    ) -> WorkerCore {
        log::info!("[Worker] Started (tick {:?})", tick);
        let ticker = channel::tick(tick);
        let mut last = Instant::now();

        while !shutdown.load(Ordering::Acquire) {
            let Ok(now) = ticker.recv() else {
                break;
            };
            let elapsed = now.saturating_duration_since(last);
            last = now;

            while let Ok(command) = commands.pop() {
                core.apply_command(command);
            }
            core.tick(elapsed);
        }

        log::info!(
            "[Worker] Stopped after {} samples ({} underruns)",
            core.atomics.samples_count(),
            core.atomics.underrun_count()
        );
        core
    }
}

impl Drop for OutputWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::sink::ChannelSink;

    fn ramp(len: usize, offset: f32) -> Vec<IqSample> {
        (0..len).map(|n| IqSample::new(offset + n as f32, 0.0)).collect()
    }

    fn core_with_channel(
        fifo: &Arc<SampleMiFifo<IqSample>>,
    ) -> (WorkerCore, channel::Receiver<Vec<Vec<IqSample>>>, Arc<WorkerAtomics>) {
        let (sink, rx) = ChannelSink::new(16);
        let atomics = Arc::new(WorkerAtomics::default());
        let core = WorkerCore::new(fifo.clone(), Vec::new(), Box::new(sink), atomics.clone());
        (core, rx, atomics)
    }

    #[test]
    fn test_throttle_carries_fraction() {
        let mut throttle = Throttle::new();
        // 2 S/s for 750 ms = 1.5 samples per call
        let step = Duration::from_millis(750);
        let total: usize = (0..4).map(|_| throttle.due(2, step, 100)).sum();
        assert_eq!(total, 6);
    }

    #[test]
    fn test_throttle_caps_and_discards() {
        let mut throttle = Throttle::new();
        assert_eq!(throttle.due(48_000, Duration::from_secs(1), 1000), 1000);
        assert_eq!(throttle.due(48_000, Duration::ZERO, 1000), 0);
    }

    #[test]
    fn test_run_chunk_passes_samples_in_order() {
        let fifo = Arc::new(SampleMiFifo::with_streams(2, 64));
        let (mut core, rx, atomics) = core_with_channel(&fifo);

        assert!(fifo.write_sync(&[ramp(8, 0.0), ramp(8, 100.0)], 8));
        core.run_chunk(5);
        core.run_chunk(3);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0], ramp(5, 0.0));
        assert_eq!(first[1], ramp(5, 100.0));
        let second = rx.try_recv().unwrap();
        assert_eq!(second[0], ramp(3, 5.0));

        assert_eq!(atomics.samples_count(), 8);
        assert_eq!(atomics.underrun_count(), 0);
    }

    #[test]
    fn test_run_chunk_pads_underrun_with_silence() {
        let fifo = Arc::new(SampleMiFifo::with_streams(1, 64));
        let (mut core, rx, atomics) = core_with_channel(&fifo);

        assert!(fifo.write_async(0, &ramp(2, 1.0)));
        core.run_chunk(4);

        let blocks = rx.try_recv().unwrap();
        assert_eq!(
            blocks[0],
            vec![
                IqSample::new(1.0, 0.0),
                IqSample::new(2.0, 0.0),
                IqSample::zero(),
                IqSample::zero()
            ]
        );
        assert_eq!(atomics.underrun_count(), 1);
        assert_eq!(atomics.samples_count(), 4);
    }

    #[test]
    fn test_interpolation_multiplies_block_length() {
        let fifo = Arc::new(SampleMiFifo::with_streams(1, 64));
        let (mut core, rx, atomics) = core_with_channel(&fifo);
        core.apply_command(WorkerCommand::SetLog2Interp(2));

        core.run_chunk(10);
        assert_eq!(rx.try_recv().unwrap()[0].len(), 40);
        // Timing counts baseband samples
        assert_eq!(atomics.samples_count(), 10);
    }

    #[test]
    fn test_tick_respects_working_flag() {
        let fifo = Arc::new(SampleMiFifo::with_streams(1, 4096));
        let (mut core, _rx, atomics) = core_with_channel(&fifo);
        core.apply_command(WorkerCommand::SetSampleRate(1000));

        assert_eq!(core.tick(Duration::from_millis(100)), 0);
        assert!(!atomics.is_working());

        core.apply_command(WorkerCommand::StartWork);
        assert!(atomics.is_working());
        assert_eq!(core.tick(Duration::from_millis(100)), 100);

        core.apply_command(WorkerCommand::StopWork);
        assert_eq!(core.tick(Duration::from_millis(100)), 0);
        assert_eq!(atomics.samples_count(), 100);
    }

    #[test]
    fn test_baseband_rate_follows_interpolation() {
        let fifo = Arc::new(SampleMiFifo::with_streams(1, 4096));
        let (mut core, _rx, _atomics) = core_with_channel(&fifo);
        core.apply_command(WorkerCommand::SetSampleRate(8000));
        core.apply_command(WorkerCommand::SetLog2Interp(3));
        core.apply_command(WorkerCommand::StartWork);

        assert_eq!(core.baseband_rate(), 1000);
        assert_eq!(core.tick(Duration::from_millis(50)), 50);
    }

    #[test]
    fn test_staging_follows_fifo_reinitialize() {
        let fifo = Arc::new(SampleMiFifo::with_streams(1, 16));
        let (mut core, rx, _atomics) = core_with_channel(&fifo);
        core.run_chunk(2);
        assert_eq!(rx.try_recv().unwrap().len(), 1);

        fifo.initialize(3, 16);
        core.run_chunk(2);
        assert_eq!(rx.try_recv().unwrap().len(), 3);
    }

    #[test]
    fn test_spawned_worker_consumes_and_returns_sink() {
        let fifo = Arc::new(SampleMiFifo::with_streams(1, 4096));
        let sink: Box<dyn SampleSink> = Box::new(NullSink::new());
        let slot: SinkSlot = Arc::new(Mutex::new(Some(sink)));
        let config = WorkerConfig {
            tick_ms: 2,
            ..Default::default()
        };

        let mut worker = OutputWorker::spawn(fifo, Vec::new(), slot.clone(), &config).unwrap();
        worker.send(WorkerCommand::SetSampleRate(10_000)).unwrap();
        worker.send(WorkerCommand::StartWork).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while worker.samples_count() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert!(worker.samples_count() > 0);
        assert!(worker.is_working());

        worker.stop();
        assert!(slot.lock().unwrap().is_some());
    }

    #[test]
    fn test_command_ring_reports_full() {
        let fifo = Arc::new(SampleMiFifo::with_streams(1, 16));
        let slot: SinkSlot = Arc::new(Mutex::new(None));
        let config = WorkerConfig {
            tick_ms: 1000,
            ..Default::default()
        };
        let mut worker = OutputWorker::spawn(fifo, Vec::new(), slot, &config).unwrap();

        let mut rejected = None;
        for _ in 0..=WORKER_COMMAND_CAPACITY {
            if let Err(command) = worker.send(WorkerCommand::StopWork) {
                rejected = Some(command);
            }
        }
        assert_eq!(rejected, Some(WorkerCommand::StopWork));
    }
}
