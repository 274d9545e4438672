//! Driver message pump
//!
//! Runs [`OutputDriver::handle_message`] for everything arriving on the
//! driver's input queue, on a dedicated thread. This is the driver's own
//! execution context: requests from the GUI side are handled here, in order,
//! never on the sender's thread.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::driver::OutputDriver;

/// How long the pump waits for a message before rechecking shutdown
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Handle to the pump thread; dropping it stops the thread
pub struct MessagePump {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl MessagePump {
    pub fn spawn(driver: Arc<OutputDriver>) -> io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = shutdown.clone();

        let handle = thread::Builder::new()
            .name("output-driver".to_string())
            .spawn(move || {
                log::debug!("[Pump] Started for {}", driver.description());
                while !thread_shutdown.load(Ordering::Acquire) {
                    let Some(message) = driver.input_queue().pop_timeout(POLL_INTERVAL) else {
                        continue;
                    };
                    if message.is_driver_request() {
                        driver.handle_message(&message);
                    } else {
                        log::debug!("[Pump] Ignoring unrecognized message {:?}", message);
                    }
                }
                log::debug!("[Pump] Stopped");
            })?;

        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for MessagePump {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("[Pump] Driver thread panicked");
            }
        }
    }
}
