use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("short ring-buffer record: {len} bytes, expected {expected}")]
    ShortRecord { len: usize, expected: usize },

    #[error("snapshot store error: {0}")]
    Store(#[from] sled::Error),

    #[error("snapshot serialisation error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
