use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("index gateway is not initialized")]
    NotInitialized,

    #[error("flush of {count} documents failed: {reason}")]
    Flush { count: usize, reason: String },

    #[error("index gateway error: {0}")]
    Gateway(#[from] anyhow::Error),
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;
