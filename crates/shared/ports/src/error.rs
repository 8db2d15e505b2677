use thiserror::Error;

/// Errors from the backing store collaborator
///
/// All of these are transient from the cache's point of view: the caller that
/// activates a partition decides whether and when to retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Stored value is corrupt: {0}")]
    Corrupt(String),

    #[error("Write rejected: {0}")]
    Rejected(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors from the ingestion source collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Connection dropped: {0}")]
    Disconnected(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Undecodable frame: {0}")]
    Malformed(String),
}

impl SourceError {
    /// Fatal errors end the pump loop and go back to the owner for reconnection.
    /// A malformed frame only costs that one frame.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SourceError::Malformed(_))
    }
}
