//! Encoded sample sources
//!
//! A [`SampleSource`] is what an [`EncoderProducer`](super::EncoderProducer)
//! drains: it reports the track format once, then hands out encoded samples
//! until it is finished.

use crate::sink::{SampleInfo, TrackFormat};
use crate::utils::error::MuxResult;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// One encoded access unit
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedSample {
    pub data: Vec<u8>,
    pub info: SampleInfo,
}

impl EncodedSample {
    pub fn new(data: Vec<u8>, presentation_time_us: i64, key_frame: bool) -> Self {
        let info = SampleInfo::whole(data.len(), presentation_time_us, key_frame);
        Self { data, info }
    }
}

/// Result of polling a source
#[derive(Debug)]
pub enum SamplePull {
    /// Next sample in decode order
    Sample(EncodedSample),
    /// Nothing available yet; poll again
    Pending,
    /// End of stream
    Finished,
}

/// Producer-side supply of encoded samples.
///
/// `next_sample` may block, but should return `Pending` within a short
/// interval so the capture loop can observe a stop request.
pub trait SampleSource: Send {
    fn track_format(&mut self) -> MuxResult<TrackFormat>;

    fn next_sample(&mut self) -> MuxResult<SamplePull>;
}

/// Source replaying a fixed list of samples, optionally paced
pub struct QueuedSource {
    format: TrackFormat,
    samples: VecDeque<EncodedSample>,
    interval: Option<Duration>,
}

impl QueuedSource {
    pub fn new(format: TrackFormat, samples: impl IntoIterator<Item = EncodedSample>) -> Self {
        Self {
            format,
            samples: samples.into_iter().collect(),
            interval: None,
        }
    }

    /// Sleep `interval` before handing out each sample
    pub fn paced(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn remaining(&self) -> usize {
        self.samples.len()
    }
}

impl SampleSource for QueuedSource {
    fn track_format(&mut self) -> MuxResult<TrackFormat> {
        Ok(self.format.clone())
    }

    fn next_sample(&mut self) -> MuxResult<SamplePull> {
        let Some(sample) = self.samples.pop_front() else {
            return Ok(SamplePull::Finished);
        };
        if let Some(interval) = self.interval {
            std::thread::sleep(interval);
        }
        Ok(SamplePull::Sample(sample))
    }
}

/// Source fed from another thread through a channel.
///
/// Finishes once every sender has been dropped.
pub struct ChannelSource {
    format: TrackFormat,
    rx: Receiver<EncodedSample>,
    poll: Duration,
}

impl ChannelSource {
    /// Create a source and the sender that feeds it
    pub fn channel(format: TrackFormat, poll: Duration) -> (Sender<EncodedSample>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self { format, rx, poll })
    }
}

impl SampleSource for ChannelSource {
    fn track_format(&mut self) -> MuxResult<TrackFormat> {
        Ok(self.format.clone())
    }

    fn next_sample(&mut self) -> MuxResult<SamplePull> {
        match self.rx.recv_timeout(self.poll) {
            Ok(sample) => Ok(SamplePull::Sample(sample)),
            Err(RecvTimeoutError::Timeout) => Ok(SamplePull::Pending),
            Err(RecvTimeoutError::Disconnected) => Ok(SamplePull::Finished),
        }
    }
}
