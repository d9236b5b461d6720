//! Capture-side producers
//!
//! A reference producer that drains encoded samples on its own thread and
//! speaks the coordinator's call contract. Codecs and devices stay outside
//! this crate; they plug in through [`SampleSource`].

pub mod encoder;
pub mod source;

pub use encoder::EncoderProducer;
pub use source::{ChannelSource, EncodedSample, QueuedSource, SamplePull, SampleSource};
