//! Muxer state management
//!
//! Defines the muxer state machine, its configuration, the observable
//! snapshot and the events broadcast to subscribers.

use crate::recorder::producer::ProducerKind;
use crate::utils::error::MuxResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Current state of the shared writer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MuxState {
    /// No producer has asked to start
    #[default]
    Idle,
    /// Some, but not all, registered producers have asked to start
    Waiting,
    /// Barrier open, samples are being written
    Writing,
    /// Sink finalized and released
    Finalized,
}

fn default_barrier_poll_ms() -> u64 {
    100
}

fn default_event_capacity() -> usize {
    100
}

/// Configuration for a mux session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MuxerConfig {
    /// Output file for the interleaved stream
    pub output_path: PathBuf,

    /// Replace an existing file at `output_path`
    #[serde(default)]
    pub overwrite: bool,

    /// How often a producer waiting on the barrier re-checks its capturing flag
    #[serde(default = "default_barrier_poll_ms")]
    pub barrier_poll_ms: u64,

    /// Capacity of the event broadcast channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl MuxerConfig {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            overwrite: false,
            barrier_poll_ms: default_barrier_poll_ms(),
            event_capacity: default_event_capacity(),
        }
    }

    pub fn from_json(json: &str) -> MuxResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn barrier_poll(&self) -> Duration {
        Duration::from_millis(self.barrier_poll_ms.max(1))
    }
}

/// Per-track counters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackStats {
    pub index: usize,
    pub kind: ProducerKind,
    pub mime: String,
    pub samples_written: u64,
    pub bytes_written: u64,
}

/// Point-in-time view of a coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MuxSnapshot {
    pub session_id: Uuid,
    pub output_path: String,
    pub state: MuxState,
    pub registered_count: usize,
    pub active_count: usize,
    pub tracks: Vec<TrackStats>,
    pub dropped_samples: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl MuxSnapshot {
    /// Milliseconds between barrier opening and finalize, if both happened
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finalized_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

/// Events emitted by the coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum MuxEvent {
    /// A track was registered with the sink
    TrackAdded { index: usize, kind: ProducerKind },
    /// Barrier opened, sink started
    Started,
    /// Sink finalized and released
    Finalized { samples_written: u64 },
    /// A late sample arrived after shutdown and was discarded
    SampleDropped { track_index: usize },
}
