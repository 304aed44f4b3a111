use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("multicast join failed: {0}")]
    JoinFailed(String),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("writer error: {0}")]
    Writer(#[from] WriterError),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("writer error: {0}")]
    Writer(#[from] WriterError),
}

#[derive(Error, Debug)]
pub enum WriterError {
    #[error("write failed: {0}")]
    WriteFailed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
