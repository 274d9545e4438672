//! Sample sinks
//!
//! The worker hands every processed chunk to a [`SampleSink`]: one block per
//! FIFO stream, all blocks the same length. Sinks run on the worker thread
//! and must not block for long.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use crate::types::{as_interleaved, IqSample};

/// Destination for processed sample blocks
pub trait SampleSink: Send {
    /// Take one chunk: `blocks[stream]` holds that stream's samples
    fn consume(&mut self, blocks: &[Vec<IqSample>]);

    /// Human-readable name for logging
    fn name(&self) -> &str;

    /// Push out anything buffered
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Discards samples, keeping a count
#[derive(Debug, Default)]
pub struct NullSink {
    consumed: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples per stream seen so far
    pub fn consumed(&self) -> u64 {
        self.consumed
    }
}

impl SampleSink for NullSink {
    fn consume(&mut self, blocks: &[Vec<IqSample>]) {
        if let Some(first) = blocks.first() {
            self.consumed += first.len() as u64;
        }
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// Forwards chunks to another thread over a bounded channel
///
/// A lagging consumer loses chunks rather than stalling the worker.
pub struct ChannelSink {
    tx: Sender<Vec<Vec<IqSample>>>,
    dropped: u64,
}

impl ChannelSink {
    /// Create the sink and the receiving end
    pub fn new(capacity: usize) -> (Self, Receiver<Vec<Vec<IqSample>>>) {
        let (tx, rx) = channel::bounded(capacity.max(1));
        (Self { tx, dropped: 0 }, rx)
    }

    /// Chunks lost to a full or closed channel
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl SampleSink for ChannelSink {
    fn consume(&mut self, blocks: &[Vec<IqSample>]) {
        match self.tx.try_send(blocks.to_vec()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
                if self.dropped.is_power_of_two() {
                    log::warn!("[ChannelSink] Consumer lagging, {} chunks dropped", self.dropped);
                }
            }
        }
    }

    fn name(&self) -> &str {
        "channel"
    }
}

/// Writes stream 0 to a file as interleaved little-endian f32 I/Q
///
/// The first write error is logged and the sink stops writing.
pub struct RawFileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    written: u64,
}

impl RawFileSink {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        log::info!("[RawFileSink] Writing I/Q to {:?}", path);
        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
            written: 0,
        })
    }

    /// Samples written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SampleSink for RawFileSink {
    fn consume(&mut self, blocks: &[Vec<IqSample>]) {
        let (Some(writer), Some(block)) = (self.writer.as_mut(), blocks.first()) else {
            return;
        };
        // f32 is stored in native order; only little-endian hosts match the format
        let bytes: &[u8] = bytemuck::cast_slice(as_interleaved(block));
        if let Err(e) = writer.write_all(bytes) {
            log::error!("[RawFileSink] Write to {:?} failed, sink disabled: {}", self.path, e);
            self.writer = None;
            return;
        }
        self.written += block.len() as u64;
    }

    fn name(&self) -> &str {
        "raw-file"
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for RawFileSink {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            log::warn!("[RawFileSink] Final flush of {:?} failed: {}", self.path, e);
        }
    }
}

/// Sink selection in config files
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkKind {
    #[default]
    Null,
    RawFile { path: PathBuf },
}

impl SinkKind {
    pub fn build(&self) -> io::Result<Box<dyn SampleSink>> {
        Ok(match self {
            SinkKind::Null => Box::new(NullSink::new()),
            SinkKind::RawFile { path } => Box::new(RawFileSink::create(path)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(len: usize) -> Vec<Vec<IqSample>> {
        vec![(0..len).map(|n| IqSample::new(n as f32, -(n as f32))).collect()]
    }

    #[test]
    fn test_null_sink_counts() {
        let mut sink = NullSink::new();
        sink.consume(&chunk(10));
        sink.consume(&chunk(5));
        sink.consume(&[]);
        assert_eq!(sink.consumed(), 15);
    }

    #[test]
    fn test_channel_sink_drops_when_full() {
        let (mut sink, rx) = ChannelSink::new(2);
        for _ in 0..5 {
            sink.consume(&chunk(4));
        }
        assert_eq!(sink.dropped(), 3);
        assert_eq!(rx.try_iter().count(), 2);

        sink.consume(&chunk(4));
        assert_eq!(rx.recv().unwrap()[0].len(), 4);
    }

    #[test]
    fn test_raw_file_sink_writes_interleaved_f32() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.iq");
        {
            let mut sink = RawFileSink::create(&path).unwrap();
            sink.consume(&chunk(3));
            assert_eq!(sink.written(), 3);
        }

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 3 * 2 * 4);
        let values: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!(values, vec![0.0, -0.0, 1.0, -1.0, 2.0, -2.0]);
    }

    #[test]
    fn test_sink_kind_from_yaml() {
        let kind: SinkKind = serde_yaml::from_str("kind: raw_file\npath: /tmp/x.iq\n").unwrap();
        assert_eq!(
            kind,
            SinkKind::RawFile {
                path: PathBuf::from("/tmp/x.iq")
            }
        );
        assert_eq!(SinkKind::default().build().unwrap().name(), "null");
    }
}
