use thiserror::Error;

/// Errors surfaced by channel and segment operations.
///
/// Timeouts are not errors at this layer: `recv` reports an elapsed timeout
/// as `Ok(None)`.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("handle was not initialized as a publisher or subscriber")]
    NotInitialized,

    #[error("shared memory io failure")]
    Io(#[from] std::io::Error),

    #[error("segment size mismatch: requested {requested} data bytes, existing segment has {existing}")]
    SizeMismatch { requested: u32, existing: u32 },

    #[error("message of {size} bytes exceeds channel capacity of {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("no free or reclaimable reader slot")]
    SlotExhausted,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
