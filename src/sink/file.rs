//! File-backed sink
//!
//! Writes the interleaved sample stream to a single file:
//! - a magic line
//! - a JSON track table, written on `start`
//! - one record per sample: track (u32), pts (i64), flags (u32), length (u32), bytes
//! - a JSON trailer with per-track sample counts, written on `stop`
//!
//! A sink stopped without ever starting still writes the track table first,
//! so the trailer is always the last line.
//!
//! Integers are little-endian. This is record framing for the coordinator's
//! output, not a media container; remuxing into MP4/WebM is left to ffmpeg.

use super::traits::{ContainerSink, SampleInfo, TrackFormat};
use crate::utils::error::{MuxError, MuxResult};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// First line of every file written by [`FileSink`]
pub const FILE_MAGIC: &[u8] = b"MUXREC1\n";

const FLAG_KEY_FRAME: u32 = 1;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Trailer<'a> {
    samples_per_track: &'a [u64],
    bytes_written: u64,
}

/// Sink writing interleaved sample records to a file
pub struct FileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    tracks: Vec<TrackFormat>,
    samples_per_track: Vec<u64>,
    bytes_written: u64,
    started: bool,
}

impl FileSink {
    /// Create the output file. With `overwrite == false` an existing file is an error.
    pub fn create(path: impl AsRef<Path>, overwrite: bool) -> MuxResult<Self> {
        let path = path.as_ref();
        let display = path.to_string_lossy().to_string();

        let mut options = OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }

        let file = options
            .open(path)
            .map_err(|e| MuxError::sink_open(display.clone(), e))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(FILE_MAGIC)
            .map_err(|e| MuxError::sink_open(display, e))?;

        tracing::debug!("File sink opened at {:?}", path);

        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(writer),
            tracks: Vec::new(),
            samples_per_track: Vec::new(),
            bytes_written: 0,
            started: false,
        })
    }

    fn writer(&mut self) -> MuxResult<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| MuxError::Sink("file sink already closed".to_string()))
    }

    fn write_track_table(&mut self) -> MuxResult<()> {
        let tracks = std::mem::take(&mut self.tracks);
        let result = self.write_json_line(&tracks);
        self.tracks = tracks;
        result
    }

    fn write_json_line<T: Serialize>(&mut self, value: &T) -> MuxResult<()> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');
        self.writer()?.write_all(&line)?;
        Ok(())
    }
}

impl ContainerSink for FileSink {
    fn add_track(&mut self, format: &TrackFormat) -> MuxResult<usize> {
        if self.started {
            return Err(MuxError::WriterAlreadyStarted);
        }
        self.tracks.push(format.clone());
        self.samples_per_track.push(0);
        Ok(self.tracks.len() - 1)
    }

    fn start(&mut self) -> MuxResult<()> {
        self.write_track_table()?;
        self.started = true;
        Ok(())
    }

    fn write_sample(&mut self, track_index: usize, data: &[u8], info: &SampleInfo) -> MuxResult<()> {
        if !self.started {
            return Err(MuxError::WriterNotStarted);
        }
        if track_index >= self.tracks.len() {
            return Err(MuxError::UnknownTrack(track_index));
        }
        let len = u32::try_from(data.len())
            .map_err(|_| MuxError::InvalidSample(format!("{} bytes exceeds record limit", data.len())))?;
        let flags = if info.key_frame { FLAG_KEY_FRAME } else { 0 };

        let writer = self.writer()?;
        writer.write_all(&(track_index as u32).to_le_bytes())?;
        writer.write_all(&info.presentation_time_us.to_le_bytes())?;
        writer.write_all(&flags.to_le_bytes())?;
        writer.write_all(&len.to_le_bytes())?;
        writer.write_all(data)?;

        self.samples_per_track[track_index] += 1;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    fn stop(&mut self) -> MuxResult<()> {
        if !self.started {
            self.write_track_table()?;
        }

        let samples = std::mem::take(&mut self.samples_per_track);
        let trailer = Trailer {
            samples_per_track: &samples,
            bytes_written: self.bytes_written,
        };
        let mut line = serde_json::to_vec(&trailer)?;
        line.push(b'\n');
        self.samples_per_track = samples;

        let writer = self.writer()?;
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }

    fn release(&mut self) -> MuxResult<()> {
        if let Some(writer) = self.writer.take() {
            let file = writer
                .into_inner()
                .map_err(|e| MuxError::Io(e.into_error()))?;
            file.sync_all()?;
        }
        tracing::debug!(
            "File sink released: {:?} ({} bytes of samples)",
            self.path,
            self.bytes_written
        );
        Ok(())
    }
}

impl std::fmt::Debug for FileSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSink")
            .field("path", &self.path)
            .field("tracks", &self.tracks.len())
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}
