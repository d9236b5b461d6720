//! Shared helpers

pub mod error;

pub use error::{ErrorClass, ErrorResponse, MuxError, MuxResult};
