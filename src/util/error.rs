//! Error types for the gusd library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for gusd operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Stage description file does not exist or cannot be accessed
    #[error("Stage file not found: {0}")]
    FileNotFound(PathBuf),

    /// Stage could not be opened or composed
    #[error("Failed to open stage '{file}': {reason}")]
    StageOpen { file: String, reason: String },

    /// Prim path is not a valid absolute scene path
    #[error("Invalid prim path: {0}")]
    InvalidPath(String),

    /// Prim not found on an opened stage
    #[error("Prim not found: {path} in {file}")]
    PrimNotFound { file: String, path: String },

    /// Traversal name is not registered in the traverse table
    #[error("Failed locating traversal '{0}'")]
    UnknownTraversal(String),

    /// Prim type has no geometry conversion
    #[error("Can't convert prim for unpack. {path}. Type = {type_name}.")]
    UnsupportedPrimType { path: String, type_name: String },

    /// Attribute could not be created on a detail
    #[error("Cannot create attribute '{name}': {reason}")]
    AttributeCreation { name: String, reason: String },

    /// Required attribute is absent or has the wrong storage
    #[error("Missing {owner} attribute '{name}'")]
    MissingAttribute { owner: &'static str, name: String },

    /// Parameter missing or of the wrong type
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParm { name: String, reason: String },

    /// Offset does not refer to an element of the detail
    #[error("Element offset {offset} out of bounds (count: {count})")]
    OffsetOutOfBounds { offset: usize, count: usize },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create a stage-open error.
    pub fn stage_open(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StageOpen { file: file.into(), reason: reason.into() }
    }

    /// Create an attribute-creation error.
    pub fn attribute(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AttributeCreation { name: name.into(), reason: reason.into() }
    }

    /// Create an invalid-parameter error.
    pub fn parm(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParm { name: name.into(), reason: reason.into() }
    }
}

/// Result type alias for gusd operations.
pub type Result<T> = std::result::Result<T, Error>;
