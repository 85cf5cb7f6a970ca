// Typed errors with thiserror. Strict parsers return these; the panel downgrades them to
// empty/absent values and logs, so nothing here ever stops the visualization.

use thiserror::Error;

/// Engine error types.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid sensor mapping: {0}")]
    InvalidMapping(String),

    #[error("Markup parse error: {0}")]
    MarkupParse(String),

    #[error("Invalid color {name:?}: {message}")]
    InvalidColor { name: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl From<roxmltree::Error> for EngineError {
    fn from(err: roxmltree::Error) -> Self {
        EngineError::MarkupParse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = EngineError::InvalidConfig("missing field".to_string());
        assert!(err.to_string().contains("missing field"));
    }

    #[test]
    fn color_error_names_the_color() {
        let err = EngineError::InvalidColor {
            name: "semi-dark-purple".to_string(),
            message: "not in palette".to_string(),
        };
        assert!(err.to_string().contains("semi-dark-purple"));
    }

    #[test]
    fn json_error_converts() {
        let err: EngineError = serde_json::from_str::<Vec<u8>>("{").unwrap_err().into();
        assert!(matches!(err, EngineError::Serialization(_)));
    }
}
