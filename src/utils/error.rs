//! Error types and handling
//!
//! Common error types used across the coordinator, sinks and producers.

use crate::recorder::producer::ProducerKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coordinator-wide error type
#[derive(Error, Debug)]
pub enum MuxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0} producer already added")]
    DuplicateProducer(ProducerKind),

    #[error("Unsupported producer: {0}")]
    UnsupportedProducer(ProducerKind),

    #[error("Muxer already started")]
    WriterAlreadyStarted,

    #[error("Muxer not started yet")]
    WriterNotStarted,

    #[error("Muxer already finalized and released")]
    SinkReleased,

    #[error("Unknown track index: {0}")]
    UnknownTrack(usize),

    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    #[error("Producer not prepared")]
    NotPrepared,

    #[error("Sample source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Failed to open sink at {path}: {reason}")]
    SinkOpen { path: String, reason: String },

    #[error("Sink error: {0}")]
    Sink(String),
}

/// Coarse classification of a [`MuxError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorClass {
    /// Wiring or call-order mistake; must be fixed by the caller, never retried
    StructuralPrecondition,
    /// Sink could not be created; fatal at construction
    ResourceOpenFailure,
    /// Runtime failure reported by the sink itself
    Sink,
}

impl MuxError {
    pub fn class(&self) -> ErrorClass {
        match self {
            MuxError::DuplicateProducer(_)
            | MuxError::UnsupportedProducer(_)
            | MuxError::WriterAlreadyStarted
            | MuxError::WriterNotStarted
            | MuxError::SinkReleased
            | MuxError::UnknownTrack(_)
            | MuxError::InvalidSample(_)
            | MuxError::NotPrepared
            | MuxError::SourceUnavailable(_) => ErrorClass::StructuralPrecondition,
            MuxError::SinkOpen { .. } => ErrorClass::ResourceOpenFailure,
            MuxError::Io(_) | MuxError::Serialization(_) | MuxError::Sink(_) => ErrorClass::Sink,
        }
    }

    /// Shorthand used by sink openers
    pub fn sink_open(path: impl Into<String>, reason: impl ToString) -> Self {
        MuxError::SinkOpen {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Serializable error for orchestrators
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub class: ErrorClass,
    pub message: String,
}

impl From<MuxError> for ErrorResponse {
    fn from(error: MuxError) -> Self {
        let code = match &error {
            MuxError::Io(_) => "IO_ERROR",
            MuxError::Serialization(_) => "SERIALIZATION_ERROR",
            MuxError::DuplicateProducer(_) => "DUPLICATE_PRODUCER",
            MuxError::UnsupportedProducer(_) => "UNSUPPORTED_PRODUCER",
            MuxError::WriterAlreadyStarted => "WRITER_ALREADY_STARTED",
            MuxError::WriterNotStarted => "WRITER_NOT_STARTED",
            MuxError::SinkReleased => "SINK_RELEASED",
            MuxError::UnknownTrack(_) => "UNKNOWN_TRACK",
            MuxError::InvalidSample(_) => "INVALID_SAMPLE",
            MuxError::NotPrepared => "NOT_PREPARED",
            MuxError::SourceUnavailable(_) => "SOURCE_UNAVAILABLE",
            MuxError::SinkOpen { .. } => "SINK_OPEN_FAILED",
            MuxError::Sink(_) => "SINK_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            class: error.class(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using MuxError
pub type MuxResult<T> = Result<T, MuxError>;
