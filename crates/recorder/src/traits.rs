use async_trait::async_trait;

use crate::error::WriterError;

/// Writer trait for the persistent sink of application messages
#[async_trait]
pub trait Writer: Send + Sync {
    /// Append one application message, byte for byte
    async fn write(&mut self, data: &[u8]) -> Result<(), WriterError>;

    /// Flush and release the destination
    async fn close(&mut self) -> Result<(), WriterError>;
}

/// Lets a session borrow a sink that the caller keeps ownership of.
#[async_trait]
impl<W: Writer + ?Sized> Writer for &mut W {
    async fn write(&mut self, data: &[u8]) -> Result<(), WriterError> {
        (**self).write(data).await
    }

    async fn close(&mut self) -> Result<(), WriterError> {
        (**self).close().await
    }
}

/// Receives lifecycle events from a transport session.
///
/// Invoked synchronously from the session's decode path: implementations
/// must not block or perform I/O.
pub trait StatusListener<E>: Send {
    fn on_event(&mut self, event: E);
}

impl<E, L: StatusListener<E> + ?Sized> StatusListener<E> for &mut L {
    fn on_event(&mut self, event: E) {
        (**self).on_event(event)
    }
}
