use thiserror::Error;

/// Failures of the durable store.
///
/// "Not found" is never an error here: lookups return `Ok(None)`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage write failed: {0}")]
    Write(String),

    #[error("Storage read failed: {0}")]
    Read(String),
}

/// Maximum length for error detail carried in a store error
const MAX_ERROR_DETAIL_LENGTH: usize = 300;

impl StoreError {
    /// Truncate engine error text to avoid logging excessive data
    fn truncate_detail(detail: String) -> String {
        if detail.len() <= MAX_ERROR_DETAIL_LENGTH {
            detail
        } else {
            let cut = (0..=MAX_ERROR_DETAIL_LENGTH)
                .rev()
                .find(|&i| detail.is_char_boundary(i))
                .unwrap_or(0);
            format!("{}... (truncated, {} total bytes)", &detail[..cut], detail.len())
        }
    }

    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        StoreError::Unavailable(Self::truncate_detail(err.to_string()))
    }

    pub fn write(err: impl std::fmt::Display) -> Self {
        StoreError::Write(Self::truncate_detail(err.to_string()))
    }

    pub fn read(err: impl std::fmt::Display) -> Self {
        StoreError::Read(Self::truncate_detail(err.to_string()))
    }
}

/// Failures reported by a host platform.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Feature unsupported: {0}")]
    Unsupported(String),

    #[error("Platform call failed: {0}")]
    Failed(String),
}

impl PlatformError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, PlatformError::Unsupported(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_detail_is_kept() {
        let err = StoreError::write("disk full");
        assert_eq!(err, StoreError::Write("disk full".to_string()));
        assert_eq!(err.to_string(), "Storage write failed: disk full");
    }

    #[test]
    fn test_long_detail_is_truncated() {
        let long = "x".repeat(MAX_ERROR_DETAIL_LENGTH + 50);
        match StoreError::read(&long) {
            StoreError::Read(detail) => {
                assert!(detail.starts_with(&"x".repeat(MAX_ERROR_DETAIL_LENGTH)));
                assert!(detail.contains("truncated"));
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_is_distinguishable() {
        assert!(PlatformError::Unsupported("no agents".into()).is_unsupported());
        assert!(!PlatformError::Failed("boom".into()).is_unsupported());
    }
}
