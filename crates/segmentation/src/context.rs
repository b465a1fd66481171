//! Parsing context threaded through recursive descent.

use std::sync::Arc;

use segmenter_core::{BadInputError, ParserConfig};

use crate::datasource::DataSource;

/// Snapshot of where the parser stands: the data source criteria apply to,
/// the JSON path for diagnostics, and the nesting depth. Each child derives
/// its own copy; a context is never mutated once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsingContext {
    source: Arc<DataSource>,
    path: String,
    depth: usize,
    limits: ParserConfig,
}

impl ParsingContext {
    /// Root context: criteria apply to the installation scope.
    pub fn new(limits: ParserConfig) -> Self {
        Self {
            source: DataSource::installation(),
            path: "$".to_string(),
            depth: 0,
            limits,
        }
    }

    pub fn source(&self) -> &Arc<DataSource> {
        &self.source
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn limits(&self) -> &ParserConfig {
        &self.limits
    }

    /// Context for the value under `key` of the current object.
    pub fn key(&self, key: &str) -> Result<Self, BadInputError> {
        let is_identifier = !key.is_empty()
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        let path = if is_identifier {
            format!("{}.{}", self.path, key)
        } else {
            format!("{}[{:?}]", self.path, key)
        };
        self.descend(path)
    }

    /// Context for element `index` of the current array.
    pub fn index(&self, index: usize) -> Result<Self, BadInputError> {
        self.descend(format!("{}[{}]", self.path, index))
    }

    /// Same location, criteria now applying to `source`.
    pub fn with_source(&self, source: Arc<DataSource>) -> Self {
        Self {
            source,
            ..self.clone()
        }
    }

    pub fn error(&self, message: impl Into<String>) -> BadInputError {
        BadInputError::at(message, self.path.clone())
    }

    fn descend(&self, path: String) -> Result<Self, BadInputError> {
        let depth = self.depth + 1;
        if depth > self.limits.max_depth {
            return Err(self.error(format!(
                "criteria nested deeper than {} levels",
                self.limits.max_depth
            )));
        }
        Ok(Self {
            source: self.source.clone(),
            path,
            depth,
            limits: self.limits,
        })
    }
}
