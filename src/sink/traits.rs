//! Sink trait definitions
//!
//! The container writer is opaque to the coordinator: it accepts track
//! registrations and ordered sample appends, and follows a
//! start/stop/release lifecycle.

use crate::recorder::producer::ProducerKind;
use crate::utils::error::{MuxError, MuxResult};
use serde::{Deserialize, Serialize};

/// Media-specific part of a track descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TrackKind {
    #[serde(rename_all = "camelCase")]
    Video {
        width: u32,
        height: u32,
        frame_rate: u32,
    },
    #[serde(rename_all = "camelCase")]
    Audio { sample_rate: u32, channels: u16 },
}

/// Track descriptor handed to the sink on registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackFormat {
    /// Codec MIME type (e.g. "video/avc", "audio/mp4a-latm")
    pub mime: String,

    /// Video or audio parameters
    pub kind: TrackKind,

    /// Codec-specific configuration (SPS/PPS, AudioSpecificConfig, ...)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub codec_config: Vec<u8>,
}

impl TrackFormat {
    pub fn video(mime: impl Into<String>, width: u32, height: u32, frame_rate: u32) -> Self {
        Self {
            mime: mime.into(),
            kind: TrackKind::Video {
                width,
                height,
                frame_rate,
            },
            codec_config: Vec::new(),
        }
    }

    pub fn audio(mime: impl Into<String>, sample_rate: u32, channels: u16) -> Self {
        Self {
            mime: mime.into(),
            kind: TrackKind::Audio {
                sample_rate,
                channels,
            },
            codec_config: Vec::new(),
        }
    }

    pub fn with_codec_config(mut self, codec_config: Vec<u8>) -> Self {
        self.codec_config = codec_config;
        self
    }

    /// Producer kind this track belongs to
    pub fn producer_kind(&self) -> ProducerKind {
        match self.kind {
            TrackKind::Video { .. } => ProducerKind::Video,
            TrackKind::Audio { .. } => ProducerKind::Audio,
        }
    }
}

/// Per-sample metadata accompanying a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleInfo {
    /// Start of the sample within the buffer
    pub offset: usize,

    /// Length of the sample in bytes
    pub size: usize,

    /// Presentation timestamp in microseconds
    pub presentation_time_us: i64,

    /// Whether this sample is a sync point
    pub key_frame: bool,
}

impl SampleInfo {
    /// Info covering a whole buffer of `size` bytes
    pub fn whole(size: usize, presentation_time_us: i64, key_frame: bool) -> Self {
        Self {
            offset: 0,
            size,
            presentation_time_us,
            key_frame,
        }
    }

    /// Slice the sample bytes out of `buffer`
    pub fn slice<'a>(&self, buffer: &'a [u8]) -> MuxResult<&'a [u8]> {
        let end = self
            .offset
            .checked_add(self.size)
            .ok_or_else(|| MuxError::InvalidSample("offset + size overflows".to_string()))?;
        buffer.get(self.offset..end).ok_or_else(|| {
            MuxError::InvalidSample(format!(
                "range {}..{} outside buffer of {} bytes",
                self.offset,
                end,
                buffer.len()
            ))
        })
    }
}

/// Container writer driven by the coordinator.
///
/// All calls arrive serialized; implementations need no locking of their own.
pub trait ContainerSink: Send {
    /// Register a track and return its index
    fn add_track(&mut self, format: &TrackFormat) -> MuxResult<usize>;

    /// Begin accepting samples. Called once, after all tracks are added.
    fn start(&mut self) -> MuxResult<()>;

    /// Append one sample to a track
    fn write_sample(&mut self, track_index: usize, data: &[u8], info: &SampleInfo) -> MuxResult<()>;

    /// Finalize the container. Called once.
    fn stop(&mut self) -> MuxResult<()>;

    /// Free underlying resources. Called once, right after `stop`.
    fn release(&mut self) -> MuxResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_within_buffer() {
        let buffer = [0u8, 1, 2, 3, 4, 5];
        let info = SampleInfo {
            offset: 2,
            size: 3,
            presentation_time_us: 0,
            key_frame: false,
        };
        assert_eq!(info.slice(&buffer).unwrap(), &[2, 3, 4]);
    }

    #[test]
    fn test_slice_out_of_range() {
        let buffer = [0u8; 4];
        let info = SampleInfo {
            offset: 2,
            size: 3,
            ..Default::default()
        };
        assert!(matches!(info.slice(&buffer), Err(MuxError::InvalidSample(_))));
    }

    #[test]
    fn test_track_format_kind() {
        assert_eq!(
            TrackFormat::video("video/avc", 1280, 720, 30).producer_kind(),
            ProducerKind::Video
        );
        assert_eq!(
            TrackFormat::audio("audio/mp4a-latm", 44100, 1).producer_kind(),
            ProducerKind::Audio
        );
    }

    #[test]
    fn test_track_format_json() {
        let format = TrackFormat::audio("audio/opus", 48000, 2);
        let json = serde_json::to_value(&format).unwrap();
        assert_eq!(json["kind"]["type"], "audio");
        assert_eq!(json["kind"]["sampleRate"], 48000);
        assert!(json.get("codecConfig").is_none());
    }

    #[test]
    fn test_codec_config_serialized_when_present() {
        let format = TrackFormat::video("video/avc", 1920, 1080, 30)
            .with_codec_config(vec![0x67, 0x42, 0x00, 0x1f]);
        let json = serde_json::to_value(&format).unwrap();
        assert_eq!(json["codecConfig"], serde_json::json!([0x67, 0x42, 0x00, 0x1f]));
    }
}
