//! Output sinks for per-speaker replay streams

use chrono::Utc;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::SpeakerId;

/// Supplies one writable sink per speaker for a single replay build
pub trait SinkProvider {
    type Sink: Write;
    type Output;

    /// Open a fresh sink for `speaker`
    fn open(&mut self, speaker: SpeakerId) -> io::Result<Self::Sink>;

    /// Flush a completed sink and turn it into the build's output
    fn finish(&mut self, speaker: SpeakerId, sink: Self::Sink) -> io::Result<Self::Output>;

    /// Discard everything opened so far after a failed build
    fn abort(&mut self) {}
}

/// A buffered file created inside a [`TempDirSinks`] directory
pub struct TempFileSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl TempFileSink {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Write for TempFileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Creates uniquely named `.ogg` files in a directory
pub struct TempDirSinks {
    dir: PathBuf,
    prefix: String,
    created: Vec<PathBuf>,
}

impl TempDirSinks {
    pub fn new<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();

        // Ensure temp directory exists
        fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            prefix: format!("replay-{}", Utc::now().format("%Y%m%dT%H%M%S")),
            created: Vec::new(),
        })
    }

    /// Paths of every file this provider has created
    pub fn created(&self) -> &[PathBuf] {
        &self.created
    }
}

impl SinkProvider for TempDirSinks {
    type Sink = TempFileSink;
    type Output = PathBuf;

    fn open(&mut self, speaker: SpeakerId) -> io::Result<TempFileSink> {
        let (file, path) = tempfile::Builder::new()
            .prefix(&format!("{}-{}-", self.prefix, speaker))
            .suffix(".ogg")
            .tempfile_in(&self.dir)?
            .keep()
            .map_err(|e| e.error)?;

        debug!("Created replay file for speaker {}: {:?}", speaker, path);
        self.created.push(path.clone());

        Ok(TempFileSink {
            path,
            writer: BufWriter::new(file),
        })
    }

    fn finish(&mut self, _speaker: SpeakerId, mut sink: TempFileSink) -> io::Result<PathBuf> {
        sink.writer.flush()?;
        Ok(sink.path)
    }

    fn abort(&mut self) {
        for path in self.created.drain(..) {
            match fs::remove_file(&path) {
                Ok(_) => debug!("Removed partial replay file: {:?}", path),
                Err(e) => warn!("Failed to remove {:?}: {}", path, e),
            }
        }
    }
}

/// Keeps every stream in memory; handy for embedding and tests
#[derive(Default)]
pub struct MemorySinks {
    finished: HashMap<SpeakerId, usize>,
}

impl MemorySinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes produced per speaker so far
    pub fn bytes_written(&self, speaker: SpeakerId) -> Option<usize> {
        self.finished.get(&speaker).copied()
    }
}

impl SinkProvider for MemorySinks {
    type Sink = Vec<u8>;
    type Output = Vec<u8>;

    fn open(&mut self, _speaker: SpeakerId) -> io::Result<Vec<u8>> {
        Ok(Vec::new())
    }

    fn finish(&mut self, speaker: SpeakerId, sink: Vec<u8>) -> io::Result<Vec<u8>> {
        self.finished.insert(speaker, sink.len());
        Ok(sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_temp_dir_sinks_create_and_abort() {
        let temp = tempdir().unwrap();
        let mut sinks = TempDirSinks::new(temp.path().join("nested")).unwrap();

        let mut a = sinks.open(SpeakerId(1)).unwrap();
        let b = sinks.open(SpeakerId(2)).unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().extension().map(|e| e == "ogg").unwrap_or(false));

        a.write_all(b"OggS").unwrap();
        let path = sinks.finish(SpeakerId(1), a).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"OggS");
        assert_eq!(sinks.created().len(), 2);

        drop(b);
        sinks.abort();
        assert!(!path.exists());
        assert!(sinks.created().is_empty());
    }

    #[test]
    fn test_memory_sinks() {
        let mut sinks = MemorySinks::new();
        let mut sink = sinks.open(SpeakerId(5)).unwrap();
        sink.extend_from_slice(&[1, 2, 3]);
        let out = sinks.finish(SpeakerId(5), sink).unwrap();
        assert_eq!(out, vec![1, 2, 3]);
        assert_eq!(sinks.bytes_written(SpeakerId(5)), Some(3));
        assert_eq!(sinks.bytes_written(SpeakerId(6)), None);
    }
}
