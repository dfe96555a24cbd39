//! Error types for fallible engine setup and I/O
//!
//! Rendering itself never fails: malformed tiles, broken avatars and
//! out-of-range indices degrade visually. Only loading things from the outside
//! world (tiles, configs, fonts, images, GPU devices) surfaces an error.

use thiserror::Error;

/// Errors that can occur while loading engine inputs or creating backends
#[derive(Error, Debug)]
pub enum SceneError {
    /// An I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A tile or config document could not be parsed
    #[error("parse error: {0}")]
    Parse(String),

    /// A configuration value or file type is invalid
    #[error("config error: {0}")]
    Config(String),

    /// An image could not be decoded or encoded
    #[error("image error: {0}")]
    Image(String),

    /// A font could not be loaded
    #[error("font error: {0}")]
    Font(String),

    /// The GPU backend could not be created
    #[error("GPU error: {0}")]
    Gpu(String),

    /// The requested operation or reference kind is not supported
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Result type for engine setup and I/O operations
pub type SceneResult<T> = Result<T, SceneError>;
