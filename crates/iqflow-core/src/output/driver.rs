//! Streaming output driver
//!
//! Owns the settings, the start/stop lifecycle and the worker thread. All
//! mutable state sits behind one mutex. Reports and notifications are queued
//! while that lock is held, so observers see them in lock order; queueing
//! never blocks.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local};

use super::error::{OutputError, OutputResult};
use super::message::{Message, MessageQueue, SignalNotification};
use super::settings::{OutputSettings, SettingsChanges};
use super::sink::SampleSink;
use super::worker::{OutputWorker, SinkSlot, WorkerCommand, WorkerConfig};
use crate::dsp::{FilterKind, SampleMiFifo};
use crate::types::IqSample;

/// Lifecycle state of an [`OutputDriver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Stopped,
    Starting,
    Streaming,
}

struct DriverInner {
    state: DriverState,
    settings: OutputSettings,
    worker: Option<OutputWorker>,
    starting_timestamp: Option<DateTime<Local>>,
}

/// Streaming output device driver
///
/// Share it as `Arc<OutputDriver>`; every method takes `&self`.
pub struct OutputDriver {
    inner: Mutex<DriverInner>,
    fifo: Arc<SampleMiFifo<IqSample>>,
    sink_slot: SinkSlot,
    worker_config: WorkerConfig,
    filter_kinds: Vec<FilterKind>,
    description: String,
    /// Requests for this driver
    input: MessageQueue,
    /// Reports for the GUI side
    gui: MessageQueue,
    /// Signal notifications for downstream DSP
    downstream: MessageQueue,
}

impl OutputDriver {
    /// Create a stopped driver reading from `fifo` and writing to `sink`
    pub fn new(fifo: Arc<SampleMiFifo<IqSample>>, sink: Box<dyn SampleSink>) -> Self {
        let description = format!("iqflow output ({})", sink.name());
        Self {
            inner: Mutex::new(DriverInner {
                state: DriverState::Stopped,
                settings: OutputSettings::default(),
                worker: None,
                starting_timestamp: None,
            }),
            fifo,
            sink_slot: Arc::new(Mutex::new(Some(sink))),
            worker_config: WorkerConfig::default(),
            filter_kinds: Vec::new(),
            description,
            input: MessageQueue::new(),
            gui: MessageQueue::new(),
            downstream: MessageQueue::new(),
        }
    }

    pub fn with_worker_config(mut self, config: WorkerConfig) -> Self {
        self.worker_config = config;
        self
    }

    /// Filters applied to every stream after interpolation
    pub fn with_filters(mut self, kinds: Vec<FilterKind>) -> Self {
        self.filter_kinds = kinds;
        self
    }

    /// Settings in effect before the first `apply_settings`
    pub fn with_settings(self, settings: OutputSettings) -> OutputResult<Self> {
        settings.validate()?;
        self.lock().settings = settings;
        Ok(self)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    // ─────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────

    /// Spawn the worker and begin consuming the FIFO
    ///
    /// Only valid while stopped. If the thread cannot be created the driver
    /// stays stopped and a generation-off report is sent.
    pub fn start(&self) -> OutputResult<()> {
        let mut inner = self.lock();
        if inner.state != DriverState::Stopped {
            return Err(OutputError::AlreadyStarted(inner.state));
        }
        inner.state = DriverState::Starting;

        let spawned = OutputWorker::spawn(
            self.fifo.clone(),
            self.filter_kinds.clone(),
            self.sink_slot.clone(),
            &self.worker_config,
        );
        let mut worker = match spawned {
            Ok(worker) => worker,
            Err(e) => {
                inner.state = DriverState::Stopped;
                self.gui.push(Message::ReportGeneration(false));
                drop(inner);
                log::error!("[Output] Failed to start: {}", e);
                return Err(OutputError::ResourceExhausted(e));
            }
        };

        let settings = inner.settings;
        for command in [
            WorkerCommand::SetSampleRate(settings.sample_rate),
            WorkerCommand::SetLog2Interp(settings.log2_interp),
            WorkerCommand::StartWork,
        ] {
            Self::send_to_worker(&mut worker, command);
        }

        inner.worker = Some(worker);
        inner.state = DriverState::Streaming;
        inner.starting_timestamp = Some(Local::now());
        self.gui.push(Message::ReportGeneration(true));
        drop(inner);

        log::info!(
            "[Output] Started: {} S/s, x{} interpolation, {} Hz",
            settings.sample_rate,
            1u32 << settings.log2_interp,
            settings.center_frequency
        );
        Ok(())
    }

    /// Stop and join the worker; safe to call in any state
    pub fn stop(&self) {
        let mut inner = self.lock();
        if let Some(mut worker) = inner.worker.take() {
            // The worker never takes the driver lock, so joining here is safe
            worker.stop();
            log::info!("[Output] Stopped after {} samples", worker.samples_count());
        }
        inner.state = DriverState::Stopped;
        inner.starting_timestamp = None;
        self.gui.push(Message::ReportGeneration(false));
    }

    // ─────────────────────────────────────────────────────────────
    // Settings
    // ─────────────────────────────────────────────────────────────

    /// Apply a settings snapshot
    ///
    /// Only fields that differ are applied, or all of them when `force`.
    /// Rate and interpolation changes reach a running worker immediately;
    /// otherwise they take effect at the next `start()`. Any change sends one
    /// [`SignalNotification`] downstream.
    pub fn apply_settings(
        &self,
        new: &OutputSettings,
        force: bool,
    ) -> OutputResult<SettingsChanges> {
        new.validate()?;

        let mut inner = self.lock();
        let changes = inner.settings.diff(new, force);
        if !changes.any() {
            return Ok(changes);
        }
        inner.settings = *new;

        let worker = inner.worker.as_mut().filter(|_| changes.affects_worker());
        if let Some(worker) = worker {
            if changes.sample_rate {
                Self::send_to_worker(worker, WorkerCommand::SetSampleRate(new.sample_rate));
            }
            if changes.log2_interp {
                Self::send_to_worker(worker, WorkerCommand::SetLog2Interp(new.log2_interp));
            }
        }
        self.downstream.push(Message::SignalChanged(SignalNotification {
            sample_rate: new.sample_rate,
            center_frequency: new.center_frequency,
        }));
        drop(inner);

        log::debug!("[Output] Applied settings {:?} (changed: {:?})", new, changes);
        Ok(changes)
    }

    // ─────────────────────────────────────────────────────────────
    // Messages
    // ─────────────────────────────────────────────────────────────

    /// Act on one control message; `false` if it is not a driver request
    pub fn handle_message(&self, message: &Message) -> bool {
        match message {
            Message::ConfigureSettings { settings, force } => {
                if let Err(e) = self.apply_settings(settings, *force) {
                    log::warn!("[Output] Rejected settings: {}", e);
                }
                true
            }
            Message::ConfigureWork(working) => {
                let mut inner = self.lock();
                match inner.worker.as_mut() {
                    Some(worker) => {
                        let command = if *working {
                            WorkerCommand::StartWork
                        } else {
                            WorkerCommand::StopWork
                        };
                        Self::send_to_worker(worker, command);
                    }
                    None => log::debug!("[Output] ConfigureWork({}) with no worker", working),
                }
                true
            }
            Message::ConfigureStreamTiming => {
                let inner = self.lock();
                if let Some(worker) = inner.worker.as_ref() {
                    self.gui.push(Message::ReportStreamTiming(worker.samples_count()));
                }
                true
            }
            Message::StartStop(true) => {
                match self.start() {
                    Ok(()) => {}
                    Err(e @ OutputError::AlreadyStarted(_)) => log::debug!("[Output] {}", e),
                    Err(e) => log::error!("[Output] {}", e),
                }
                true
            }
            Message::StartStop(false) => {
                self.stop();
                true
            }
            Message::ReportGeneration(_)
            | Message::ReportStreamTiming(_)
            | Message::SignalChanged(_) => false,
        }
    }

    /// Handle every message waiting on the input queue, in order
    ///
    /// Returns the number of messages taken.
    pub fn handle_input_messages(&self) -> usize {
        let mut handled = 0;
        while let Some(message) = self.input.pop() {
            if message.is_driver_request() {
                self.handle_message(&message);
            } else {
                log::debug!("[Output] Ignoring unrecognized message {:?}", message);
            }
            handled += 1;
        }
        handled
    }

    // ─────────────────────────────────────────────────────────────
    // Queues
    // ─────────────────────────────────────────────────────────────

    pub fn input_queue(&self) -> &MessageQueue {
        &self.input
    }

    pub fn gui_queue(&self) -> &MessageQueue {
        &self.gui
    }

    pub fn downstream_queue(&self) -> &MessageQueue {
        &self.downstream
    }

    // ─────────────────────────────────────────────────────────────
    // Status
    // ─────────────────────────────────────────────────────────────

    pub fn state(&self) -> DriverState {
        self.lock().state
    }

    pub fn is_streaming(&self) -> bool {
        self.state() == DriverState::Streaming
    }

    pub fn has_worker(&self) -> bool {
        self.lock().worker.is_some()
    }

    pub fn settings(&self) -> OutputSettings {
        self.lock().settings
    }

    pub fn sample_rate(&self) -> u32 {
        self.lock().settings.sample_rate
    }

    pub fn center_frequency(&self) -> u64 {
        self.lock().settings.center_frequency
    }

    /// Wall-clock time of the last successful `start()`, while streaming
    pub fn starting_timestamp(&self) -> Option<DateTime<Local>> {
        self.lock().starting_timestamp
    }

    /// Samples consumed by the current worker, if one is running
    pub fn samples_count(&self) -> Option<u64> {
        self.lock().worker.as_ref().map(OutputWorker::samples_count)
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn fifo(&self) -> &Arc<SampleMiFifo<IqSample>> {
        &self.fifo
    }

    /// Take the sink back while stopped (`None` while a worker holds it)
    pub fn take_sink(&self) -> Option<Box<dyn SampleSink>> {
        let _inner = self.lock();
        self.sink_slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn lock(&self) -> MutexGuard<'_, DriverInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send_to_worker(worker: &mut OutputWorker, command: WorkerCommand) {
        if let Err(command) = worker.send(command) {
            log::warn!("[Output] Worker command queue full, dropped {:?}", command);
        }
    }
}

impl Drop for OutputDriver {
    fn drop(&mut self) {
        if self.lock().worker.is_some() {
            self.stop();
        }
    }
}
