//! Streaming output
//!
//! A driver consumes the multi-stream FIFO at the device rate and hands the
//! processed samples to a sink. Everything else talks to it through messages.
//!
//! # Architecture
//!
//! ```text
//!  producer ──write_sync──► SampleMiFifo ──read_sync──► OutputWorker ──► SampleSink
//!                                                           ▲
//!                                     rtrb WorkerCommand    │  WorkerAtomics
//!                                                           │
//!  OutputController ──input queue──► OutputDriver ──────────┘
//!         ▲                              │
//!         └───────── gui queue ──────────┤ ReportGeneration / ReportStreamTiming
//!                                        └──► downstream queue: SignalChanged
//! ```
//!
//! - [`OutputDriver`] owns settings and lifecycle under a single lock and
//!   queues reports while holding it, so they arrive in lock order.
//! - [`OutputWorker`] is the only thread that reads the FIFO on behalf of the
//!   driver. It never takes the driver lock.
//! - [`MessagePump`] gives the driver its own thread for handling requests.
//! - [`OutputController`] is the GUI-side logic with no toolkit attached.

pub mod controller;
pub mod driver;
pub mod error;
pub mod message;
pub mod pump;
pub mod settings;
pub mod sink;
pub mod worker;

pub use controller::{OutputController, DEFAULT_STATUS_INTERVAL_TICKS};
pub use driver::{DriverState, OutputDriver};
pub use error::{OutputError, OutputResult};
pub use message::{Message, MessageQueue, SignalNotification};
pub use pump::MessagePump;
pub use settings::{OutputSettings, SettingsChanges};
pub use sink::{ChannelSink, NullSink, RawFileSink, SampleSink, SinkKind};
pub use worker::{
    OutputWorker, SinkSlot, Throttle, WorkerAtomics, WorkerCommand, WorkerConfig, WorkerCore,
    WORKER_COMMAND_CAPACITY,
};
