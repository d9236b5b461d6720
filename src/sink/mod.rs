//! Container sinks
//!
//! The coordinator writes through the [`ContainerSink`] trait; this module
//! ships a file-backed sink and an in-memory one.

pub mod file;
pub mod memory;
pub mod traits;

pub use file::FileSink;
pub use memory::{MemorySink, MemorySinkLog, SinkOp};
pub use traits::{ContainerSink, SampleInfo, TrackFormat, TrackKind};
