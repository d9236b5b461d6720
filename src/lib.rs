//! mux-coordinator - join independent audio and video producers into one file.
//!
//! The [`MuxCoordinator`] owns the container sink and gates it on a
//! start/stop barrier: the sink starts once every registered producer is
//! ready, finalizes once every active producer has finished, and all writes
//! from the producer threads are serialized.

pub mod capture;
pub mod recorder;
pub mod sink;
pub mod utils;

pub use capture::{EncoderProducer, SampleSource};
pub use recorder::{MuxCoordinator, MuxEvent, MuxSnapshot, MuxState, MuxerConfig, Producer, ProducerKind};
pub use sink::{ContainerSink, SampleInfo, TrackFormat};
pub use utils::error::{MuxError, MuxResult};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging. Later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mux_coordinator=debug,mux_demo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
