//! Cache error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = CacheError::Config("max_entries must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "Cache configuration error: max_entries must be positive"
        );
    }

    #[test]
    fn test_serialization_error_display() {
        let err = CacheError::Serialization("invalid msgpack".to_string());
        assert_eq!(err.to_string(), "Serialization error: invalid msgpack");
    }
}
