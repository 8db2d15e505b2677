use strata_ports::StoreError;
use thiserror::Error;

/// Errors surfaced by partition caches and replicas
///
/// Steady-state conditions (long-poll timeout, partition not yet populated)
/// are never errors; they come back as `None`. Conflation buffers report
/// through `EnqueueOutcome` instead.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("Partition {key} failed to activate: {source}")]
    Activation {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Partition {key} write-through persist failed: {source}")]
    Persist {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Partition {0} is shut down")]
    PartitionClosed(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

impl CacheError {
    /// Store failures are transient; the owner may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CacheError::Activation { .. } | CacheError::Persist { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activation_error_is_retryable() {
        let err = CacheError::Activation {
            key: "ABCUSD".to_string(),
            source: StoreError::Unavailable("connection refused".to_string()),
        };
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Partition ABCUSD failed to activate: Store unavailable: connection refused"
        );
        assert!(!CacheError::PartitionClosed("ABCUSD".to_string()).is_retryable());
    }

    #[test]
    fn test_persist_error_is_retryable() {
        let err = CacheError::Persist {
            key: "BTCUSDT".to_string(),
            source: StoreError::Rejected("read-only".to_string()),
        };
        assert!(err.is_retryable());
    }
}
