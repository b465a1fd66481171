use thiserror::Error;

pub type SegmenterResult<T> = Result<T, SegmenterError>;

/// Raised when a criteria document or one of its embedded literals does not
/// conform to its grammar. `path` locates the offending node, e.g.
/// `$.and[1].presence`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (at {path})")]
pub struct BadInputError {
    pub message: String,
    pub path: String,
}

impl BadInputError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: "$".to_string(),
        }
    }

    pub fn at(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: path.into(),
        }
    }

    /// Relocates an error raised by a literal parser to the node that
    /// embedded the literal.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }
}

#[derive(Error, Debug)]
pub enum SegmenterError {
    #[error("Bad input: {0}")]
    BadInput(#[from] BadInputError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for SegmenterError {
    fn from(err: config::ConfigError) -> Self {
        SegmenterError::Config(err.to_string())
    }
}
