//! BinaryFILE sink.
//!
//! A BinaryFILE is a plain sequence of records, each a 2-byte big-endian
//! length followed by that many bytes of application message.

use async_trait::async_trait;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::WriterError;
use crate::traits::Writer;

/// Largest payload a BinaryFILE record can carry
pub const MAX_RECORD_LEN: usize = u16::MAX as usize;

/// Appends application messages to a BinaryFILE.
/// The file is created, or truncated if it exists, on open.
pub struct BinaryFileWriter {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    messages: u64,
}

impl BinaryFileWriter {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, WriterError> {
        let path = path.into();
        let file = File::create(&path)?;
        info!(path = %path.display(), "Opened output file");

        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            messages: 0,
        })
    }

    /// Number of messages written so far
    pub fn messages(&self) -> u64 {
        self.messages
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }
}

#[async_trait]
impl Writer for BinaryFileWriter {
    async fn write(&mut self, data: &[u8]) -> Result<(), WriterError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| WriterError::WriteFailed("writer is closed".to_string()))?;

        if data.len() > MAX_RECORD_LEN {
            return Err(WriterError::WriteFailed(format!(
                "message of {} bytes exceeds record limit of {}",
                data.len(),
                MAX_RECORD_LEN
            )));
        }

        writer.write_all(&(data.len() as u16).to_be_bytes())?;
        writer.write_all(data)?;
        self.messages += 1;

        Ok(())
    }

    async fn close(&mut self) -> Result<(), WriterError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
            info!(
                path = %self.path.display(),
                messages = self.messages,
                "Closed output file"
            );
        }
        Ok(())
    }
}

impl Drop for BinaryFileWriter {
    fn drop(&mut self) {
        // Only reached when close() was skipped by an early return
        if let Some(mut writer) = self.writer.take() {
            match writer.flush() {
                Ok(()) => debug!(path = %self.path.display(), "Flushed output file on drop"),
                Err(e) => {
                    warn!(error = %e, path = %self.path.display(), "Failed to flush output file")
                }
            }
        }
    }
}

/// Reads records back from a BinaryFILE.
pub struct BinaryFileReader<R: Read> {
    reader: BufReader<R>,
}

impl BinaryFileReader<File> {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self::new(File::open(path)?))
    }
}

impl<R: Read> BinaryFileReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
        }
    }

    /// Next record, or `None` at a clean end of file
    pub fn read_message(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut header = [0u8; 2];
        match self.fill(&mut header)? {
            0 => return Ok(None),
            2 => {}
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "truncated record header",
                ))
            }
        }

        let mut data = vec![0u8; u16::from_be_bytes(header) as usize];
        if self.fill(&mut data)? != data.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "truncated record payload",
            ));
        }

        Ok(Some(data))
    }

    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl<R: Read> Iterator for BinaryFileReader<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_message().transpose()
    }
}
