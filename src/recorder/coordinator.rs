//! Mux coordinator
//!
//! Joins one video and one audio producer into a single container sink.
//! The sink starts only once every registered producer has asked to start,
//! finalizes only once every active producer has asked to stop, and all
//! sink calls are serialized behind a single lock.

use super::producer::{Producer, ProducerKind};
use super::state::{MuxEvent, MuxSnapshot, MuxState, MuxerConfig, TrackStats};
use crate::sink::{ContainerSink, FileSink, SampleInfo, TrackFormat};
use crate::utils::error::{MuxError, MuxResult};
use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use uuid::Uuid;

/// One slot per muxable producer kind
#[derive(Default)]
struct ProducerSlots {
    video: Option<Box<dyn Producer>>,
    audio: Option<Box<dyn Producer>>,
}

impl ProducerSlots {
    fn slot_mut(&mut self, kind: ProducerKind) -> MuxResult<&mut Option<Box<dyn Producer>>> {
        match kind {
            ProducerKind::Video => Ok(&mut self.video),
            ProducerKind::Audio => Ok(&mut self.audio),
            other => Err(MuxError::UnsupportedProducer(other)),
        }
    }

    fn attached_count(&self) -> usize {
        usize::from(self.video.is_some()) + usize::from(self.audio.is_some())
    }

    /// Attached producers, video first
    fn attached_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Producer>> {
        self.video.iter_mut().chain(self.audio.iter_mut())
    }
}

struct TrackRecord {
    index: usize,
    kind: ProducerKind,
    mime: String,
    samples_written: u64,
    bytes_written: u64,
}

/// Everything the sink-visible critical section guards
struct MuxShared {
    /// `None` once finalized
    sink: Option<Box<dyn ContainerSink>>,
    registered_count: usize,
    active_count: usize,
    started: bool,
    tracks: Vec<TrackRecord>,
    dropped_samples: u64,
    started_at: Option<DateTime<Utc>>,
    finalized_at: Option<DateTime<Utc>>,
}

impl MuxShared {
    fn state(&self) -> MuxState {
        if self.sink.is_none() {
            MuxState::Finalized
        } else if self.started {
            MuxState::Writing
        } else if self.active_count > 0 {
            MuxState::Waiting
        } else {
            MuxState::Idle
        }
    }

    fn samples_written(&self) -> u64 {
        self.tracks.iter().map(|t| t.samples_written).sum()
    }
}

/// Start/stop barrier and serialized writer shared by the producers
pub struct MuxCoordinator {
    session_id: Uuid,

    config: MuxerConfig,

    /// Attached producers. Locked before `shared` when both are needed.
    producers: Mutex<ProducerSlots>,

    /// Counters, flags and the sink itself
    shared: Mutex<MuxShared>,

    /// Signalled when the barrier opens or the sink is finalized
    started_cv: Condvar,

    event_tx: broadcast::Sender<MuxEvent>,
}

impl MuxCoordinator {
    /// Create a coordinator around an already opened sink
    pub fn new(config: MuxerConfig, sink: Box<dyn ContainerSink>) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let session_id = Uuid::new_v4();

        tracing::info!(
            "Mux session {} created for {:?}",
            session_id,
            config.output_path
        );

        Self {
            session_id,
            config,
            producers: Mutex::new(ProducerSlots::default()),
            shared: Mutex::new(MuxShared {
                sink: Some(sink),
                registered_count: 0,
                active_count: 0,
                started: false,
                tracks: Vec::new(),
                dropped_samples: 0,
                started_at: None,
                finalized_at: None,
            }),
            started_cv: Condvar::new(),
            event_tx,
        }
    }

    /// Open a [`FileSink`] at `config.output_path`
    pub fn create(config: MuxerConfig) -> MuxResult<Self> {
        Self::open_with(config, |config| {
            let sink = FileSink::create(&config.output_path, config.overwrite)?;
            Ok(Box::new(sink) as Box<dyn ContainerSink>)
        })
    }

    /// Open the sink with a custom opener. Any failure is returned as-is.
    pub fn open_with<F>(config: MuxerConfig, opener: F) -> MuxResult<Self>
    where
        F: FnOnce(&MuxerConfig) -> MuxResult<Box<dyn ContainerSink>>,
    {
        let sink = opener(&config).map_err(|e| {
            tracing::error!("Failed to open sink at {:?}: {}", config.output_path, e);
            e
        })?;
        Ok(Self::new(config, sink))
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn config(&self) -> &MuxerConfig {
        &self.config
    }

    pub fn output_path(&self) -> &Path {
        &self.config.output_path
    }

    /// Subscribe to coordinator events
    pub fn subscribe(&self) -> broadcast::Receiver<MuxEvent> {
        self.event_tx.subscribe()
    }

    /// Attach a producer. At most one video and one audio producer.
    pub fn register(&self, producer: Box<dyn Producer>) -> MuxResult<()> {
        let kind = producer.kind();
        let mut slots = self.producers.lock();

        let slot = slots.slot_mut(kind)?;
        if slot.is_some() {
            return Err(MuxError::DuplicateProducer(kind));
        }
        *slot = Some(producer);

        let count = slots.attached_count();
        self.shared.lock().registered_count = count;

        tracing::info!("Registered {} producer ({} attached)", kind, count);
        Ok(())
    }

    /// Prepare every attached producer, video first
    pub fn prepare(&self) -> MuxResult<()> {
        let mut slots = self.producers.lock();
        for producer in slots.attached_mut() {
            producer.prepare()?;
        }
        Ok(())
    }

    /// Signal every attached producer to start capturing. Does not wait on the barrier.
    pub fn start_recording(&self) -> MuxResult<()> {
        let mut slots = self.producers.lock();
        for producer in slots.attached_mut() {
            producer.start_capturing()?;
        }
        tracing::info!("Recording started");
        Ok(())
    }

    /// Signal every attached producer to stop and drop the coordinator's ownership of it
    pub fn stop_recording(&self) {
        // Taken out first: a producer's stop may join a thread that calls back in.
        let (video, audio) = {
            let mut slots = self.producers.lock();
            (slots.video.take(), slots.audio.take())
        };

        for mut producer in [video, audio].into_iter().flatten() {
            producer.stop_capturing();
            tracing::debug!("{} producer stopped and detached", producer.kind());
        }
    }

    /// True when every attached producer is capturing. A kind that was never
    /// attached counts as capturing; with no producer attached at all (fresh
    /// or after `stop_recording`) nothing is recording.
    pub fn is_recording(&self) -> bool {
        let slots = self.producers.lock();
        if slots.attached_count() == 0 {
            return false;
        }
        let video = slots.video.as_ref().map_or(true, |p| p.is_capturing());
        let audio = slots.audio.as_ref().map_or(true, |p| p.is_capturing());
        video && audio
    }

    pub fn is_started(&self) -> bool {
        self.shared.lock().started
    }

    pub fn state(&self) -> MuxState {
        self.shared.lock().state()
    }

    /// Called once per producer when it has data ready.
    ///
    /// Opens the sink when the last registered producer arrives and returns
    /// whether the sink is started after this call.
    pub fn request_start(&self) -> MuxResult<bool> {
        let mut shared = self.shared.lock();
        shared.active_count += 1;

        let barrier_reached =
            shared.registered_count > 0 && shared.active_count == shared.registered_count;

        if barrier_reached && !shared.started {
            let start_result = match shared.sink.as_mut() {
                Some(sink) => sink.start(),
                None => {
                    tracing::warn!("Start requested after the sink was finalized");
                    return Ok(false);
                }
            };
            if let Err(e) = start_result {
                // Undo this arrival; the caller may request again.
                shared.active_count -= 1;
                tracing::error!("Failed to start sink: {}", e);
                return Err(e);
            }
            shared.started = true;
            shared.started_at = Some(Utc::now());
            self.started_cv.notify_all();

            tracing::info!(
                "Muxer started with {} producer(s), {} track(s)",
                shared.registered_count,
                shared.tracks.len()
            );
            let _ = self.event_tx.send(MuxEvent::Started);
        } else {
            tracing::debug!(
                "Start requested ({}/{} producers active)",
                shared.active_count,
                shared.registered_count
            );
        }

        Ok(shared.started)
    }

    /// Called once per producer when it is finishing.
    ///
    /// The last active producer to leave stops and releases the sink.
    pub fn request_stop(&self) -> MuxResult<()> {
        let mut shared = self.shared.lock();
        shared.active_count = shared.active_count.saturating_sub(1);

        if shared.registered_count == 0 || shared.active_count > 0 {
            tracing::debug!("Stop requested ({} producers still active)", shared.active_count);
            return Ok(());
        }

        let Some(mut sink) = shared.sink.take() else {
            return Ok(());
        };

        let stop_result = sink.stop();
        let release_result = sink.release();
        drop(sink);

        shared.started = false;
        shared.finalized_at = Some(Utc::now());
        self.started_cv.notify_all();

        let samples_written = shared.samples_written();
        tracing::info!(
            "Muxer finalized: {} samples written, {} dropped",
            samples_written,
            shared.dropped_samples
        );
        let _ = self.event_tx.send(MuxEvent::Finalized { samples_written });

        stop_result.and(release_result)
    }

    /// Block until the barrier opens, the sink is finalized, or `timeout` elapses.
    ///
    /// Returns whether the sink is started.
    pub fn wait_started(&self, timeout: Option<Duration>) -> bool {
        let mut shared = self.shared.lock();
        match timeout {
            None => {
                while !shared.started && shared.sink.is_some() {
                    self.started_cv.wait(&mut shared);
                }
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while !shared.started && shared.sink.is_some() {
                    if self.started_cv.wait_until(&mut shared, deadline).timed_out() {
                        break;
                    }
                }
            }
        }
        shared.started
    }

    /// Register a track with the sink. Must happen before the barrier opens.
    pub fn add_track(&self, format: &TrackFormat) -> MuxResult<usize> {
        let mut shared = self.shared.lock();
        if shared.started {
            return Err(MuxError::WriterAlreadyStarted);
        }

        let sink = shared.sink.as_mut().ok_or(MuxError::SinkReleased)?;
        let index = sink.add_track(format)?;

        let kind = format.producer_kind();
        shared.tracks.push(TrackRecord {
            index,
            kind,
            mime: format.mime.clone(),
            samples_written: 0,
            bytes_written: 0,
        });

        tracing::debug!("Added {} track {} ({})", kind, index, format.mime);
        let _ = self.event_tx.send(MuxEvent::TrackAdded { index, kind });
        Ok(index)
    }

    /// Write one sample. Late samples after shutdown are dropped without error.
    pub fn append_sample(&self, track_index: usize, buffer: &[u8], info: &SampleInfo) -> MuxResult<()> {
        let mut guard = self.shared.lock();
        let shared = &mut *guard;

        let sink = match shared.sink.as_mut() {
            Some(sink) if shared.active_count > 0 => sink,
            _ => {
                shared.dropped_samples += 1;
                tracing::trace!("Dropped late sample for track {}", track_index);
                let _ = self.event_tx.send(MuxEvent::SampleDropped { track_index });
                return Ok(());
            }
        };

        if !shared.started {
            return Err(MuxError::WriterNotStarted);
        }

        let track = shared
            .tracks
            .iter_mut()
            .find(|t| t.index == track_index)
            .ok_or(MuxError::UnknownTrack(track_index))?;

        let data = info.slice(buffer)?;
        sink.write_sample(track_index, data, info)?;

        track.samples_written += 1;
        track.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Point-in-time view for logging or an orchestrator UI
    pub fn snapshot(&self) -> MuxSnapshot {
        let shared = self.shared.lock();
        MuxSnapshot {
            session_id: self.session_id,
            output_path: self.config.output_path.to_string_lossy().to_string(),
            state: shared.state(),
            registered_count: shared.registered_count,
            active_count: shared.active_count,
            tracks: shared
                .tracks
                .iter()
                .map(|t| TrackStats {
                    index: t.index,
                    kind: t.kind,
                    mime: t.mime.clone(),
                    samples_written: t.samples_written,
                    bytes_written: t.bytes_written,
                })
                .collect(),
            dropped_samples: shared.dropped_samples,
            started_at: shared.started_at,
            finalized_at: shared.finalized_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{MemorySink, MemorySinkLog};
    use crate::utils::error::ErrorClass;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Producer that only flips its capturing flag
    struct StubProducer {
        kind: ProducerKind,
        capturing: Arc<AtomicBool>,
        prepared: Arc<AtomicUsize>,
    }

    impl StubProducer {
        fn new(kind: ProducerKind) -> (Box<Self>, Arc<AtomicBool>) {
            let capturing = Arc::new(AtomicBool::new(false));
            let producer = Box::new(Self {
                kind,
                capturing: capturing.clone(),
                prepared: Arc::new(AtomicUsize::new(0)),
            });
            (producer, capturing)
        }
    }

    impl Producer for StubProducer {
        fn kind(&self) -> ProducerKind {
            self.kind
        }

        fn prepare(&mut self) -> MuxResult<()> {
            self.prepared.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn start_capturing(&mut self) -> MuxResult<()> {
            self.capturing.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn stop_capturing(&mut self) {
            self.capturing.store(false, Ordering::SeqCst);
        }

        fn is_capturing(&self) -> bool {
            self.capturing.load(Ordering::SeqCst)
        }
    }

    fn memory_coordinator() -> (Arc<MuxCoordinator>, Arc<MemorySinkLog>) {
        let (sink, log) = MemorySink::new();
        let coordinator = MuxCoordinator::new(MuxerConfig::new("memory.mux"), Box::new(sink));
        (Arc::new(coordinator), log)
    }

    fn register(coordinator: &MuxCoordinator, kind: ProducerKind) -> Arc<AtomicBool> {
        let (producer, capturing) = StubProducer::new(kind);
        coordinator.register(producer).unwrap();
        capturing
    }

    fn video_format() -> TrackFormat {
        TrackFormat::video("video/avc", 1280, 720, 30)
    }

    fn audio_format() -> TrackFormat {
        TrackFormat::audio("audio/mp4a-latm", 44100, 1)
    }

    #[test]
    fn test_registered_count_per_combination() {
        for (kinds, expected) in [
            (vec![ProducerKind::Video], 1),
            (vec![ProducerKind::Audio], 1),
            (vec![ProducerKind::Video, ProducerKind::Audio], 2),
            (vec![ProducerKind::Audio, ProducerKind::Video], 2),
        ] {
            let (coordinator, _) = memory_coordinator();
            for kind in kinds {
                register(&coordinator, kind);
            }
            assert_eq!(coordinator.snapshot().registered_count, expected);
        }
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let (coordinator, _) = memory_coordinator();
        register(&coordinator, ProducerKind::Video);

        let (again, _) = StubProducer::new(ProducerKind::Video);
        let err = coordinator.register(again).unwrap_err();
        assert!(matches!(err, MuxError::DuplicateProducer(ProducerKind::Video)));
        assert_eq!(err.class(), ErrorClass::StructuralPrecondition);
        assert_eq!(coordinator.snapshot().registered_count, 1);
    }

    #[test]
    fn test_unsupported_kind_fails() {
        let (coordinator, _) = memory_coordinator();
        let (subtitle, _) = StubProducer::new(ProducerKind::Subtitle);
        let err = coordinator.register(subtitle).unwrap_err();
        assert!(matches!(err, MuxError::UnsupportedProducer(ProducerKind::Subtitle)));
        assert_eq!(coordinator.snapshot().registered_count, 0);
    }

    #[test]
    fn test_barrier_opens_only_when_all_active() {
        let (coordinator, log) = memory_coordinator();
        register(&coordinator, ProducerKind::Video);
        register(&coordinator, ProducerKind::Audio);

        assert!(!coordinator.request_start().unwrap());
        assert_eq!(coordinator.state(), MuxState::Waiting);
        assert_eq!(log.start_count(), 0);

        assert!(coordinator.request_start().unwrap());
        assert_eq!(coordinator.state(), MuxState::Writing);
        assert_eq!(log.start_count(), 1);

        // Idempotent: no second open
        assert!(coordinator.request_start().unwrap());
        assert_eq!(log.start_count(), 1);
    }

    #[test]
    fn test_no_start_without_registrations() {
        let (coordinator, log) = memory_coordinator();
        assert!(!coordinator.request_start().unwrap());
        assert_eq!(log.start_count(), 0);
        coordinator.request_stop().unwrap();
        assert_eq!(log.stop_count(), 0);
        assert_eq!(coordinator.state(), MuxState::Idle);
    }

    #[test]
    fn test_concurrent_stops_finalize_once() {
        let (coordinator, log) = memory_coordinator();
        register(&coordinator, ProducerKind::Video);
        register(&coordinator, ProducerKind::Audio);
        coordinator.request_start().unwrap();
        coordinator.request_start().unwrap();
        coordinator.request_stop().unwrap();
        assert_eq!(coordinator.snapshot().active_count, 1);

        let gate = Arc::new(std::sync::Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let coordinator = coordinator.clone();
                let gate = gate.clone();
                std::thread::spawn(move || {
                    gate.wait();
                    coordinator.request_stop()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(log.stop_count(), 1);
        assert_eq!(log.release_count(), 1);
        assert_eq!(coordinator.state(), MuxState::Finalized);
        assert!(!coordinator.is_started());
    }

    #[test]
    fn test_append_after_finalize_is_silent() {
        let (coordinator, log) = memory_coordinator();
        register(&coordinator, ProducerKind::Audio);
        let track = coordinator.add_track(&audio_format()).unwrap();
        coordinator.request_start().unwrap();
        coordinator.request_stop().unwrap();

        let mut events = coordinator.subscribe();
        coordinator
            .append_sample(track, &[1, 2], &SampleInfo::whole(2, 10, false))
            .unwrap();

        assert_eq!(log.write_count(), 0);
        assert_eq!(coordinator.snapshot().dropped_samples, 1);
        assert_eq!(
            events.try_recv().unwrap(),
            MuxEvent::SampleDropped { track_index: track }
        );
    }

    #[test]
    fn test_add_track_before_and_after_start() {
        let (coordinator, _) = memory_coordinator();
        register(&coordinator, ProducerKind::Video);
        register(&coordinator, ProducerKind::Audio);

        let video = coordinator.add_track(&video_format()).unwrap();
        let audio = coordinator.add_track(&audio_format()).unwrap();
        assert_ne!(video, audio);

        coordinator.request_start().unwrap();
        coordinator.request_start().unwrap();

        let err = coordinator.add_track(&video_format()).unwrap_err();
        assert!(matches!(err, MuxError::WriterAlreadyStarted));
        assert_eq!(err.class(), ErrorClass::StructuralPrecondition);
    }

    #[test]
    fn test_add_track_after_finalize_fails() {
        let (coordinator, _) = memory_coordinator();
        register(&coordinator, ProducerKind::Video);
        coordinator.request_start().unwrap();
        coordinator.request_stop().unwrap();
        assert!(matches!(
            coordinator.add_track(&video_format()),
            Err(MuxError::SinkReleased)
        ));
    }

    #[test]
    fn test_append_rejects_unknown_track_and_bad_range() {
        let (coordinator, log) = memory_coordinator();
        register(&coordinator, ProducerKind::Video);
        let track = coordinator.add_track(&video_format()).unwrap();
        coordinator.request_start().unwrap();

        assert!(matches!(
            coordinator.append_sample(track + 5, &[0], &SampleInfo::whole(1, 0, true)),
            Err(MuxError::UnknownTrack(_))
        ));

        let info = SampleInfo {
            offset: 1,
            size: 4,
            presentation_time_us: 0,
            key_frame: true,
        };
        assert!(matches!(
            coordinator.append_sample(track, &[0; 3], &info),
            Err(MuxError::InvalidSample(_))
        ));
        assert_eq!(log.write_count(), 0);
    }

    #[test]
    fn test_full_session_scenario() {
        let (coordinator, log) = memory_coordinator();
        let video_capturing = register(&coordinator, ProducerKind::Video);
        let audio_capturing = register(&coordinator, ProducerKind::Audio);

        coordinator.prepare().unwrap();
        assert!(!coordinator.is_recording());
        coordinator.start_recording().unwrap();
        assert!(video_capturing.load(Ordering::SeqCst));
        assert!(audio_capturing.load(Ordering::SeqCst));
        assert!(coordinator.is_recording());

        let video = coordinator.add_track(&video_format()).unwrap();
        let audio = coordinator.add_track(&audio_format()).unwrap();

        // Video arrives first
        assert!(!coordinator.request_start().unwrap());
        assert_eq!(coordinator.snapshot().active_count, 1);
        assert!(!coordinator.is_started());
        assert!(matches!(
            coordinator.append_sample(video, &[0], &SampleInfo::whole(1, 0, true)),
            Err(MuxError::WriterNotStarted)
        ));

        // Audio opens the barrier
        assert!(coordinator.request_start().unwrap());
        assert_eq!(coordinator.snapshot().active_count, 2);
        assert_eq!(log.start_count(), 1);

        coordinator
            .append_sample(video, &[1, 1, 1], &SampleInfo::whole(3, 0, true))
            .unwrap();
        coordinator
            .append_sample(audio, &[2, 2], &SampleInfo::whole(2, 0, false))
            .unwrap();

        // Video leaves, sink stays open
        coordinator.request_stop().unwrap();
        assert_eq!(coordinator.snapshot().active_count, 1);
        assert_eq!(log.stop_count(), 0);
        assert!(coordinator.is_started());
        coordinator
            .append_sample(audio, &[3, 3], &SampleInfo::whole(2, 23_000, false))
            .unwrap();

        // Audio leaves, sink finalized
        coordinator.request_stop().unwrap();
        assert_eq!(log.stop_count(), 1);
        assert_eq!(log.release_count(), 1);
        assert_eq!(log.samples_for(video), 1);
        assert_eq!(log.samples_for(audio), 2);

        coordinator.stop_recording();
        assert!(!video_capturing.load(Ordering::SeqCst));
        assert!(!audio_capturing.load(Ordering::SeqCst));

        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.state, MuxState::Finalized);
        assert_eq!(snapshot.tracks[audio].bytes_written, 4);
        assert!(snapshot.duration_ms().is_some());
    }

    #[test]
    fn test_audio_only_is_recording() {
        let (coordinator, _) = memory_coordinator();
        let audio_capturing = register(&coordinator, ProducerKind::Audio);

        assert!(!coordinator.is_recording());
        audio_capturing.store(true, Ordering::SeqCst);
        assert!(coordinator.is_recording());
    }

    #[test]
    fn test_stop_recording_detaches_and_is_idempotent() {
        let (coordinator, _) = memory_coordinator();
        let video_capturing = register(&coordinator, ProducerKind::Video);
        coordinator.start_recording().unwrap();

        coordinator.stop_recording();
        assert!(!video_capturing.load(Ordering::SeqCst));

        // Nothing attached any more; the second call is a no-op
        coordinator.stop_recording();
        video_capturing.store(true, Ordering::SeqCst);
        assert!(!coordinator.is_recording());
    }

    #[test]
    fn test_is_recording_false_without_producers() {
        let (coordinator, _) = memory_coordinator();
        assert!(!coordinator.is_recording());
    }

    #[test]
    fn test_is_recording_false_after_stop() {
        let (coordinator, _) = memory_coordinator();
        register(&coordinator, ProducerKind::Video);
        register(&coordinator, ProducerKind::Audio);
        coordinator.start_recording().unwrap();
        assert!(coordinator.is_recording());

        coordinator.stop_recording();
        assert!(!coordinator.is_recording());
    }

    /// Sink whose first `start` fails
    struct FlakyStartSink {
        inner: MemorySink,
        failures_left: usize,
    }

    impl ContainerSink for FlakyStartSink {
        fn add_track(&mut self, format: &TrackFormat) -> MuxResult<usize> {
            self.inner.add_track(format)
        }

        fn start(&mut self) -> MuxResult<()> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(MuxError::Sink("device busy".to_string()));
            }
            self.inner.start()
        }

        fn write_sample(&mut self, track_index: usize, data: &[u8], info: &SampleInfo) -> MuxResult<()> {
            self.inner.write_sample(track_index, data, info)
        }

        fn stop(&mut self) -> MuxResult<()> {
            self.inner.stop()
        }
    }

    #[test]
    fn test_failed_sink_start_keeps_barrier_reachable() {
        let (inner, log) = MemorySink::new();
        let sink = FlakyStartSink {
            inner,
            failures_left: 1,
        };
        let coordinator = MuxCoordinator::new(MuxerConfig::new("flaky.mux"), Box::new(sink));
        register(&coordinator, ProducerKind::Video);
        register(&coordinator, ProducerKind::Audio);

        assert!(!coordinator.request_start().unwrap());
        assert!(matches!(coordinator.request_start(), Err(MuxError::Sink(_))));
        assert_eq!(coordinator.snapshot().active_count, 1);

        assert!(coordinator.request_start().unwrap());
        assert_eq!(coordinator.snapshot().active_count, 2);
        assert_eq!(log.start_count(), 1);
    }

    #[test]
    fn test_wait_started_wakes_on_barrier() {
        let (coordinator, _) = memory_coordinator();
        register(&coordinator, ProducerKind::Video);

        assert!(!coordinator.wait_started(Some(Duration::from_millis(10))));

        let waiter = {
            let coordinator = coordinator.clone();
            std::thread::spawn(move || coordinator.wait_started(None))
        };
        std::thread::sleep(Duration::from_millis(20));
        coordinator.request_start().unwrap();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_wait_started_returns_on_finalize() {
        let (coordinator, _) = memory_coordinator();
        register(&coordinator, ProducerKind::Video);
        register(&coordinator, ProducerKind::Audio);
        coordinator.request_start().unwrap();

        let waiter = {
            let coordinator = coordinator.clone();
            std::thread::spawn(move || coordinator.wait_started(None))
        };
        std::thread::sleep(Duration::from_millis(20));
        coordinator.request_stop().unwrap();
        assert!(!waiter.join().unwrap());
    }

    #[test]
    fn test_events_for_lifecycle() {
        let (coordinator, _) = memory_coordinator();
        let mut events = coordinator.subscribe();
        register(&coordinator, ProducerKind::Video);

        let track = coordinator.add_track(&video_format()).unwrap();
        coordinator.request_start().unwrap();
        coordinator
            .append_sample(track, &[7], &SampleInfo::whole(1, 0, true))
            .unwrap();
        coordinator.request_stop().unwrap();

        assert_eq!(
            events.try_recv().unwrap(),
            MuxEvent::TrackAdded {
                index: track,
                kind: ProducerKind::Video
            }
        );
        assert_eq!(events.try_recv().unwrap(), MuxEvent::Started);
        assert_eq!(
            events.try_recv().unwrap(),
            MuxEvent::Finalized { samples_written: 1 }
        );
    }

    #[test]
    fn test_create_fails_for_bad_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = MuxerConfig::new(dir.path().join("no").join("such").join("out.mux"));
        let err = MuxCoordinator::create(config).err().unwrap();
        assert_eq!(err.class(), ErrorClass::ResourceOpenFailure);
    }

    #[test]
    fn test_prepare_is_forwarded() {
        let (coordinator, _) = memory_coordinator();
        let prepared = Arc::new(AtomicUsize::new(0));
        coordinator
            .register(Box::new(StubProducer {
                kind: ProducerKind::Video,
                capturing: Arc::new(AtomicBool::new(false)),
                prepared: prepared.clone(),
            }))
            .unwrap();
        coordinator.prepare().unwrap();
        assert_eq!(prepared.load(Ordering::SeqCst), 1);
    }
}
