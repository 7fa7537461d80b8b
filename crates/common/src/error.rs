//! Error types shared across Clipdeck crates.

/// Top-level error type for Clipdeck operations.
#[derive(Debug, thiserror::Error)]
pub enum ClipdeckError {
    #[error("Media error: {message}")]
    Media { message: String },

    #[error("Ingest error: {message}")]
    Ingest { message: String },

    #[error("Upload error: {message}")]
    Upload { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Project error: {message}")]
    Project { message: String },

    #[error("Operation cancelled: {message}")]
    Cancelled { message: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ClipdeckError.
pub type ClipdeckResult<T> = Result<T, ClipdeckError>;

impl ClipdeckError {
    pub fn media(msg: impl Into<String>) -> Self {
        Self::Media {
            message: msg.into(),
        }
    }

    pub fn ingest(msg: impl Into<String>) -> Self {
        Self::Ingest {
            message: msg.into(),
        }
    }

    pub fn upload(msg: impl Into<String>) -> Self {
        Self::Upload {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn project(msg: impl Into<String>) -> Self {
        Self::Project {
            message: msg.into(),
        }
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether this error came from an explicit cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_format_messages() {
        let err = ClipdeckError::render("encoder crashed");
        assert_eq!(err.to_string(), "Render error: encoder crashed");

        let err = ClipdeckError::cancelled("engine terminated");
        assert!(err.is_cancelled());
        assert!(!ClipdeckError::upload("503").is_cancelled());
    }

    #[test]
    fn test_io_error_converts() {
        fn fails() -> ClipdeckResult<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(ClipdeckError::Io(_))));
    }
}
