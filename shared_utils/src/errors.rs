use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Probe failed: {0}")]
    ProbeFailure(String),

    #[error("Encode failed: {0}")]
    EncodeFailure(String),

    #[error("Duration mismatch: source {source_secs:.2}s, output {output_secs:.2}s")]
    IntegrityFailure { source_secs: f64, output_secs: f64 },

    #[error("Metadata copy failed: {0}")]
    MetadataFailure(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_cause() {
        let e = ConvertError::ToolNotFound("magick".into());
        assert_eq!(e.to_string(), "External tool not found: magick");
        let e: ConvertError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(e, ConvertError::Io(_)));
    }

    #[test]
    fn test_integrity_message() {
        let e = ConvertError::IntegrityFailure {
            source_secs: 10.0,
            output_secs: 6.5,
        };
        assert_eq!(e.to_string(), "Duration mismatch: source 10.00s, output 6.50s");
    }
}
