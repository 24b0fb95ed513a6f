use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Class not found: {0}")]
    ClassNotFound(String),

    #[error("Method not found: {class}.{method}")]
    MethodNotFound { class: String, method: String },

    #[error("Field not found: {class}.{field}")]
    FieldNotFound { class: String, field: String },

    #[error("Field value is null: {class}.{field}")]
    NullField { class: String, field: String },

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Export not found: {module}!{symbol}")]
    ExportNotFound { module: String, symbol: String },

    #[error("Failed to read memory at address {address:#x}: {message}")]
    MemoryReadFailed { address: u64, message: String },

    #[error("Invalid scan pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is a symbol-resolution failure (as opposed to a
    /// failure to read an already-resolved value).
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            Error::ClassNotFound(_)
                | Error::MethodNotFound { .. }
                | Error::FieldNotFound { .. }
                | Error::ModuleNotFound(_)
                | Error::ExportNotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_resolution() {
        let err = Error::ExportNotFound {
            module: "libnative-lib.so".to_string(),
            symbol: "_Z16anti_debug_checkv".to_string(),
        };
        assert!(err.is_resolution());

        let err2 = Error::MemoryReadFailed {
            address: 0x1000,
            message: "out of range".to_string(),
        };
        assert!(!err2.is_resolution());

        let err3 = Error::NullField {
            class: "a.B".to_string(),
            field: "c".to_string(),
        };
        assert!(!err3.is_resolution());
    }
}
