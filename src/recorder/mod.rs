//! Mux coordination module
//!
//! This module implements the two-producer muxing barrier:
//! - Producer trait for the video and audio capture units
//! - MuxCoordinator to gate the shared sink on every producer's start/stop
//! - Muxer state, configuration and events

pub mod coordinator;
pub mod producer;
pub mod state;

pub use coordinator::MuxCoordinator;
pub use producer::{Producer, ProducerKind};
pub use state::{MuxEvent, MuxSnapshot, MuxState, MuxerConfig, TrackStats};
