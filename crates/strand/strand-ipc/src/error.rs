use strand_events::EventError;
use strand_ring::ChannelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IpcError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("poll timed out")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, IpcError>;
