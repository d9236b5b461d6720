//! Producer abstraction
//!
//! A producer is an independent capture/encode unit that feeds one track of
//! the muxed output. The coordinator only needs its kind tag, its capturing
//! flag and the lifecycle hooks below.

use crate::utils::error::MuxResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of media a producer emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProducerKind {
    /// Encoded video frames
    Video,
    /// Encoded audio frames
    Audio,
    /// Timed text
    Subtitle,
    /// Timed metadata (cursor positions, markers, ...)
    Metadata,
}

impl fmt::Display for ProducerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProducerKind::Video => "Video",
            ProducerKind::Audio => "Audio",
            ProducerKind::Subtitle => "Subtitle",
            ProducerKind::Metadata => "Metadata",
        };
        f.write_str(name)
    }
}

/// Lifecycle hooks the coordinator forwards to each attached producer.
///
/// Implementations run their capture loop on their own thread and talk back
/// to the coordinator through `request_start`, `add_track`, `append_sample`
/// and `request_stop`.
pub trait Producer: Send {
    /// Kind tag, fixed for the producer's lifetime
    fn kind(&self) -> ProducerKind;

    /// Prepare encoder resources. Called before any capture starts.
    fn prepare(&mut self) -> MuxResult<()>;

    /// Start the capture loop. Must return without waiting on the barrier.
    fn start_capturing(&mut self) -> MuxResult<()>;

    /// Signal the capture loop to finish. Must be safe to call more than once.
    fn stop_capturing(&mut self);

    /// Whether the capture loop is currently running
    fn is_capturing(&self) -> bool;
}
