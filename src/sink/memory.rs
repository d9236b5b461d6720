//! In-memory sink
//!
//! Keeps every call it receives in a shared log so the caller can inspect
//! what reached the container after the sink has been handed to a
//! coordinator.

use super::traits::{ContainerSink, SampleInfo, TrackFormat};
use crate::utils::error::{MuxError, MuxResult};
use parking_lot::Mutex;
use std::sync::Arc;

/// One call observed by a [`MemorySink`]
#[derive(Debug, Clone, PartialEq)]
pub enum SinkOp {
    AddTrack(TrackFormat),
    Start,
    Write {
        track_index: usize,
        data: Vec<u8>,
        info: SampleInfo,
    },
    Stop,
    Release,
}

/// Shared, inspectable record of sink calls
#[derive(Debug, Default)]
pub struct MemorySinkLog {
    ops: Mutex<Vec<SinkOp>>,
}

impl MemorySinkLog {
    pub fn ops(&self) -> Vec<SinkOp> {
        self.ops.lock().clone()
    }

    fn push(&self, op: SinkOp) {
        self.ops.lock().push(op);
    }

    fn count(&self, pred: impl Fn(&SinkOp) -> bool) -> usize {
        self.ops.lock().iter().filter(|op| pred(op)).count()
    }

    pub fn start_count(&self) -> usize {
        self.count(|op| matches!(op, SinkOp::Start))
    }

    pub fn stop_count(&self) -> usize {
        self.count(|op| matches!(op, SinkOp::Stop))
    }

    pub fn release_count(&self) -> usize {
        self.count(|op| matches!(op, SinkOp::Release))
    }

    /// Number of samples written to `track_index`
    pub fn samples_for(&self, track_index: usize) -> usize {
        self.count(|op| matches!(op, SinkOp::Write { track_index: t, .. } if *t == track_index))
    }

    pub fn write_count(&self) -> usize {
        self.count(|op| matches!(op, SinkOp::Write { .. }))
    }
}

/// Sink that stores everything in memory
#[derive(Debug)]
pub struct MemorySink {
    log: Arc<MemorySinkLog>,
    track_count: usize,
    started: bool,
    stopped: bool,
}

impl MemorySink {
    /// Create a sink and the log handle that observes it
    pub fn new() -> (Self, Arc<MemorySinkLog>) {
        let log = Arc::new(MemorySinkLog::default());
        let sink = Self {
            log: log.clone(),
            track_count: 0,
            started: false,
            stopped: false,
        };
        (sink, log)
    }
}

impl ContainerSink for MemorySink {
    fn add_track(&mut self, format: &TrackFormat) -> MuxResult<usize> {
        if self.started {
            return Err(MuxError::Sink("track added after start".to_string()));
        }
        self.log.push(SinkOp::AddTrack(format.clone()));
        self.track_count += 1;
        Ok(self.track_count - 1)
    }

    fn start(&mut self) -> MuxResult<()> {
        if self.started {
            return Err(MuxError::Sink("started twice".to_string()));
        }
        self.started = true;
        self.log.push(SinkOp::Start);
        Ok(())
    }

    fn write_sample(&mut self, track_index: usize, data: &[u8], info: &SampleInfo) -> MuxResult<()> {
        if !self.started || self.stopped {
            return Err(MuxError::Sink("write outside start/stop".to_string()));
        }
        if track_index >= self.track_count {
            return Err(MuxError::UnknownTrack(track_index));
        }
        self.log.push(SinkOp::Write {
            track_index,
            data: data.to_vec(),
            info: *info,
        });
        Ok(())
    }

    fn stop(&mut self) -> MuxResult<()> {
        if self.stopped {
            return Err(MuxError::Sink("stopped twice".to_string()));
        }
        self.stopped = true;
        self.log.push(SinkOp::Stop);
        Ok(())
    }

    fn release(&mut self) -> MuxResult<()> {
        self.log.push(SinkOp::Release);
        Ok(())
    }
}
