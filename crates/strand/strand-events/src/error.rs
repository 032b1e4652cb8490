use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("event io failure")]
    Io(#[from] std::io::Error),

    #[error("event wait timed out")]
    Timeout,

    #[error("event wait interrupted by signal")]
    Interrupted,

    #[error("event has no valid file descriptor")]
    NotInitialized,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, EventError>;
