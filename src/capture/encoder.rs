//! Threaded encoder producer
//!
//! Drains a [`SampleSource`] on its own thread and drives the coordinator
//! protocol: register the track, join the start barrier, append samples,
//! then leave the barrier exactly once.

use super::source::{SamplePull, SampleSource};
use crate::recorder::coordinator::MuxCoordinator;
use crate::recorder::producer::{Producer, ProducerKind};
use crate::recorder::state::MuxState;
use crate::utils::error::{MuxError, MuxResult};
use parking_lot::Mutex as ParkingMutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

/// Producer that feeds one track from a sample source
pub struct EncoderProducer {
    kind: ProducerKind,
    coordinator: Weak<MuxCoordinator>,
    source: Option<Box<dyn SampleSource>>,
    prepared: bool,
    is_capturing: Arc<AtomicBool>,
    samples_sent: Arc<AtomicU64>,
    last_error: Arc<ParkingMutex<Option<String>>>,
    handle: Option<JoinHandle<()>>,
}

impl EncoderProducer {
    /// Create a producer bound to `coordinator`. Register it afterwards.
    pub fn new(
        kind: ProducerKind,
        coordinator: &Arc<MuxCoordinator>,
        source: Box<dyn SampleSource>,
    ) -> Self {
        Self {
            kind,
            coordinator: Arc::downgrade(coordinator),
            source: Some(source),
            prepared: false,
            is_capturing: Arc::new(AtomicBool::new(false)),
            samples_sent: Arc::new(AtomicU64::new(0)),
            last_error: Arc::new(ParkingMutex::new(None)),
            handle: None,
        }
    }

    /// Samples handed to the coordinator so far
    pub fn samples_sent(&self) -> u64 {
        self.samples_sent.load(Ordering::SeqCst)
    }

    /// Error that ended the last capture loop, if any
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }
}

impl Producer for EncoderProducer {
    fn kind(&self) -> ProducerKind {
        self.kind
    }

    fn prepare(&mut self) -> MuxResult<()> {
        if self.source.is_none() {
            return Err(MuxError::SourceUnavailable(format!(
                "{} source already consumed",
                self.kind
            )));
        }
        self.prepared = true;
        tracing::debug!("{} encoder prepared", self.kind);
        Ok(())
    }

    fn start_capturing(&mut self) -> MuxResult<()> {
        if self.is_capturing.load(Ordering::SeqCst) {
            return Ok(());
        }
        if !self.prepared {
            return Err(MuxError::NotPrepared);
        }

        let coordinator = self.coordinator.upgrade().ok_or(MuxError::SinkReleased)?;
        let source = self.source.take().ok_or_else(|| {
            MuxError::SourceUnavailable(format!("{} source already consumed", self.kind))
        })?;
        self.prepared = false;

        let session = CaptureSession {
            kind: self.kind,
            coordinator,
            is_capturing: self.is_capturing.clone(),
            samples_sent: self.samples_sent.clone(),
            last_error: self.last_error.clone(),
        };

        self.is_capturing.store(true, Ordering::SeqCst);
        let spawned = std::thread::Builder::new()
            .name(format!("{}-encoder", self.kind).to_lowercase())
            .spawn(move || session.run(source));

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("{} capture started", self.kind);
                Ok(())
            }
            Err(e) => {
                self.is_capturing.store(false, Ordering::SeqCst);
                Err(MuxError::Io(e))
            }
        }
    }

    fn stop_capturing(&mut self) {
        self.is_capturing.store(false, Ordering::SeqCst);

        if let Some(handle) = self.handle.take() {
            // The capture thread can hold the last coordinator reference and drop us itself.
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tracing::error!("{} capture thread panicked", self.kind);
            }
        }
    }

    fn is_capturing(&self) -> bool {
        self.is_capturing.load(Ordering::SeqCst)
    }
}

impl Drop for EncoderProducer {
    fn drop(&mut self) {
        self.stop_capturing();
    }
}

/// State moved into the capture thread
struct CaptureSession {
    kind: ProducerKind,
    coordinator: Arc<MuxCoordinator>,
    is_capturing: Arc<AtomicBool>,
    samples_sent: Arc<AtomicU64>,
    last_error: Arc<ParkingMutex<Option<String>>>,
}

impl CaptureSession {
    fn run(self, mut source: Box<dyn SampleSource>) {
        let mut joined = false;

        if let Err(e) = self.drain(source.as_mut(), &mut joined) {
            tracing::error!("{} capture failed: {}", self.kind, e);
            *self.last_error.lock() = Some(e.to_string());
        }

        // Leave the barrier exactly once, and only if we entered it.
        if joined {
            if let Err(e) = self.coordinator.request_stop() {
                tracing::error!("{} failed to finalize muxer: {}", self.kind, e);
                *self.last_error.lock() = Some(e.to_string());
            }
        }

        self.is_capturing.store(false, Ordering::SeqCst);
        tracing::info!(
            "{} capture finished ({} samples)",
            self.kind,
            self.samples_sent.load(Ordering::SeqCst)
        );
    }

    fn drain(&self, source: &mut dyn SampleSource, joined: &mut bool) -> MuxResult<()> {
        let format = source.track_format()?;
        let track = self.coordinator.add_track(&format)?;

        *joined = true;
        let mut started = self.coordinator.request_start()?;

        let poll = self.coordinator.config().barrier_poll();
        while !started {
            if !self.is_capturing.load(Ordering::SeqCst)
                || self.coordinator.state() == MuxState::Finalized
            {
                tracing::debug!("{} left before the muxer started", self.kind);
                return Ok(());
            }
            started = self.coordinator.wait_started(Some(poll));
        }

        while self.is_capturing.load(Ordering::SeqCst) {
            match source.next_sample()? {
                SamplePull::Sample(sample) => {
                    self.coordinator
                        .append_sample(track, &sample.data, &sample.info)?;
                    self.samples_sent.fetch_add(1, Ordering::SeqCst);
                }
                SamplePull::Pending => continue,
                SamplePull::Finished => break,
            }
        }
        Ok(())
    }
}
