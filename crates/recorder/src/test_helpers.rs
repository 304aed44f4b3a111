//! In-memory collaborators for session tests

use async_trait::async_trait;

use crate::error::WriterError;
use crate::traits::{StatusListener, Writer};

/// Sink that keeps every message in memory
#[derive(Debug, Default)]
pub struct MemoryWriter {
    pub messages: Vec<Vec<u8>>,
    pub closed: bool,
}

#[async_trait]
impl Writer for MemoryWriter {
    async fn write(&mut self, data: &[u8]) -> Result<(), WriterError> {
        if self.closed {
            return Err(WriterError::WriteFailed("writer is closed".to_string()));
        }
        self.messages.push(data.to_vec());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), WriterError> {
        self.closed = true;
        Ok(())
    }
}

/// Sink that fails every write
#[derive(Debug, Default)]
pub struct FailingWriter;

#[async_trait]
impl Writer for FailingWriter {
    async fn write(&mut self, _data: &[u8]) -> Result<(), WriterError> {
        Err(WriterError::WriteFailed("disk full".to_string()))
    }

    async fn close(&mut self) -> Result<(), WriterError> {
        Ok(())
    }
}

/// Records every status event it sees
impl<E: Send> StatusListener<E> for Vec<E> {
    fn on_event(&mut self, event: E) {
        self.push(event);
    }
}
