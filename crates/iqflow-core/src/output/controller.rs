//! Output controller
//!
//! The GUI-side half of the control plane, with no toolkit attached. It holds
//! the settings being edited, debounces edits into one `ConfigureSettings`
//! request per hardware update, polls stream timing every few ticks and keeps
//! the latest reports for display.
//!
//! Two timers are expected to drive it:
//! - a debounce timer calling [`OutputController::update_hardware`]
//! - a status timer calling [`OutputController::tick`]

use super::driver::OutputDriver;
use super::message::{Message, MessageQueue};
use super::settings::OutputSettings;
use crate::types::MAX_LOG2_INTERP;

/// Status ticks between stream timing requests
pub const DEFAULT_STATUS_INTERVAL_TICKS: u64 = 20;

pub struct OutputController {
    /// Settings being edited
    settings: OutputSettings,
    /// Cleared while incoming values are displayed so they are not echoed back
    do_apply_settings: bool,
    /// Next update applies every field
    force_settings: bool,
    update_pending: bool,

    /// Generation state last reported by the driver
    generation: bool,
    /// Sample count last reported by the driver
    samples_count: u64,
    /// Device rate/frequency from the last signal notification
    device_sample_rate: u32,
    device_center_frequency: u64,

    tick_count: u64,
    status_interval_ticks: u64,

    /// Requests to the driver
    requests: MessageQueue,
    /// Reports from the driver
    reports: MessageQueue,
}

impl OutputController {
    pub fn new(requests: MessageQueue, reports: MessageQueue) -> Self {
        let settings = OutputSettings::default();
        Self {
            settings,
            do_apply_settings: true,
            force_settings: true,
            update_pending: false,
            generation: false,
            samples_count: 0,
            device_sample_rate: settings.sample_rate,
            device_center_frequency: settings.center_frequency,
            tick_count: 0,
            status_interval_ticks: DEFAULT_STATUS_INTERVAL_TICKS,
            requests,
            reports,
        }
    }

    /// Controller wired to a driver's input and report queues
    pub fn for_driver(driver: &OutputDriver) -> Self {
        let mut controller = Self::new(driver.input_queue().clone(), driver.gui_queue().clone());
        controller.display_settings(driver.settings());
        controller
    }

    pub fn with_status_interval(mut self, ticks: u64) -> Self {
        self.status_interval_ticks = ticks.max(1);
        self
    }

    // ─────────────────────────────────────────────────────────────
    // Editing
    // ─────────────────────────────────────────────────────────────

    pub fn set_center_frequency(&mut self, hz: u64) {
        self.settings.center_frequency = hz;
        self.send_settings();
    }

    pub fn set_sample_rate(&mut self, rate: u32) {
        self.settings.sample_rate = rate;
        self.send_settings();
    }

    pub fn set_log2_interp(&mut self, log2: u32) {
        self.settings.log2_interp = log2.min(MAX_LOG2_INTERP);
        self.send_settings();
    }

    /// Replace every field, e.g. after loading a preset; the next update is forced
    pub fn set_settings(&mut self, settings: OutputSettings) {
        self.settings = settings;
        self.force_settings = true;
        self.send_settings();
    }

    pub fn reset_to_defaults(&mut self) {
        self.set_settings(OutputSettings::default());
    }

    /// Show settings without sending them back to the driver
    pub fn display_settings(&mut self, settings: OutputSettings) {
        self.block_apply_settings(true);
        self.settings = settings;
        self.block_apply_settings(false);
    }

    pub fn block_apply_settings(&mut self, block: bool) {
        self.do_apply_settings = !block;
    }

    /// Mark an update pending; the debounce timer sends it
    fn send_settings(&mut self) {
        if self.do_apply_settings {
            self.update_pending = true;
        }
    }

    /// Send the pending snapshot as one `ConfigureSettings`
    ///
    /// Returns whether anything was sent.
    pub fn update_hardware(&mut self) -> bool {
        if !self.update_pending {
            return false;
        }
        log::debug!(
            "[Controller] Sending settings {:?} (force: {})",
            self.settings,
            self.force_settings
        );
        self.requests.push(Message::ConfigureSettings {
            settings: self.settings,
            force: self.force_settings,
        });
        self.force_settings = false;
        self.update_pending = false;
        true
    }

    /// Ask the driver to start or stop generation
    pub fn start_stop(&mut self, start: bool) {
        if self.do_apply_settings {
            self.requests.push(Message::StartStop(start));
        }
    }

    /// Pause or resume the worker without restarting
    pub fn set_working(&mut self, working: bool) {
        self.requests.push(Message::ConfigureWork(working));
    }

    // ─────────────────────────────────────────────────────────────
    // Status
    // ─────────────────────────────────────────────────────────────

    /// Status timer tick: periodic timing request, then drain reports
    pub fn tick(&mut self) {
        self.tick_count += 1;
        if self.tick_count % self.status_interval_ticks == 0 {
            self.requests.push(Message::ConfigureStreamTiming);
        }
        self.handle_input_messages();
    }

    /// Handle every waiting report; returns how many were recognized
    pub fn handle_input_messages(&mut self) -> usize {
        let mut recognized = 0;
        while let Some(message) = self.reports.pop() {
            if self.handle_message(&message) {
                recognized += 1;
            } else {
                log::debug!("[Controller] Ignoring {:?}", message);
            }
        }
        recognized
    }

    /// Apply one report; `false` for kinds the controller does not handle
    pub fn handle_message(&mut self, message: &Message) -> bool {
        match message {
            Message::ReportGeneration(generation) => {
                self.generation = *generation;
                if !generation {
                    self.samples_count = 0;
                }
                true
            }
            Message::ReportStreamTiming(count) => {
                self.samples_count = *count;
                true
            }
            Message::SignalChanged(notification) => {
                self.device_sample_rate = notification.sample_rate;
                self.device_center_frequency = notification.center_frequency;
                true
            }
            _ => false,
        }
    }

    pub fn settings(&self) -> &OutputSettings {
        &self.settings
    }

    pub fn is_update_pending(&self) -> bool {
        self.update_pending
    }

    pub fn generation(&self) -> bool {
        self.generation
    }

    pub fn samples_count(&self) -> u64 {
        self.samples_count
    }

    pub fn device_sample_rate(&self) -> u32 {
        self.device_sample_rate
    }

    pub fn device_center_frequency(&self) -> u64 {
        self.device_center_frequency
    }

    /// Rate at which baseband samples are consumed, for display
    pub fn baseband_rate(&self) -> u32 {
        self.settings.baseband_rate()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }
}
