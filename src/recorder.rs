//! File recording of a publication
//!
//! A [`Recorder`] receives the same fan-out as subscribers and writes it to
//! disk through a [`MediaWriter`]. Recording is best effort: the first I/O
//! failure is logged and the recorder goes inert.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};

use crate::media::{AudioTag, DataType, MediaFormat, MediaWriter, Properties, VideoTag};

pub struct Recorder {
    path: PathBuf,
    file: Option<BufWriter<File>>,
    writer: MediaWriter,
    buf: BytesMut,
    begun: bool,
}

impl Recorder {
    /// Create (or truncate) the file at `path`
    pub fn create(path: impl Into<PathBuf>, format: MediaFormat) -> io::Result<Self> {
        let path = path.into();
        let file = File::create(&path)?;
        tracing::info!(path = %path.display(), format = ?format, "Recording started");
        Ok(Self {
            path,
            file: Some(BufWriter::new(file)),
            writer: MediaWriter::new(format),
            buf: BytesMut::with_capacity(64 * 1024),
            begun: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> MediaFormat {
        self.writer.format()
    }

    /// False once a write failed or the recorder was finished
    pub fn is_active(&self) -> bool {
        self.file.is_some()
    }

    pub fn write_audio(&mut self, track: u8, tag: &AudioTag, packet: &Bytes) {
        if self.begin() {
            self.writer.write_audio(track, tag, packet, &mut self.buf);
            self.drain();
        }
    }

    pub fn write_video(&mut self, track: u8, tag: &VideoTag, packet: &Bytes) {
        if self.begin() {
            self.writer.write_video(track, tag, packet, &mut self.buf);
            self.drain();
        }
    }

    pub fn write_data(&mut self, track: u8, ty: DataType, packet: &Bytes) {
        if self.begin() {
            self.writer.write_data(track, ty, packet, &mut self.buf);
            self.drain();
        }
    }

    pub fn write_properties(&mut self, properties: &Properties) {
        if self.begin() {
            self.writer.write_properties(properties, &mut self.buf);
            self.drain();
        }
    }

    pub fn flush(&mut self) {
        if let Some(file) = self.file.as_mut() {
            if let Err(e) = file.flush() {
                self.fail(e);
            }
        }
    }

    /// Close the container and the file
    pub fn finish(&mut self) {
        if self.file.is_none() {
            return;
        }
        if self.begun {
            self.writer.end_media(&mut self.buf);
            self.drain();
        }
        self.flush();
        if self.file.take().is_some() {
            tracing::info!(path = %self.path.display(), "Recording finished");
        }
    }

    /// Open the container on first use; false when inert
    fn begin(&mut self) -> bool {
        if self.file.is_none() {
            return false;
        }
        if !self.begun {
            self.begun = true;
            self.writer.begin_media(&mut self.buf);
        }
        true
    }

    fn drain(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let result = match self.file.as_mut() {
            Some(file) => file.write_all(&self.buf),
            None => Ok(()),
        };
        self.buf.clear();
        if let Err(e) = result {
            self.fail(e);
        }
    }

    fn fail(&mut self, error: io::Error) {
        tracing::warn!(
            path = %self.path.display(),
            error = %error,
            "Recording failed, recorder disabled"
        );
        self.file = None;
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("path", &self.path)
            .field("format", &self.format())
            .field("active", &self.is_active())
            .finish()
    }
}
