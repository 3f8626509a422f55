use std::env;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrewError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("TOML parse error: {0}")]
    TomlDecodeError(#[from] toml::de::Error),
    #[error("TOML encode error: {0}")]
    TomlEncodeError(#[from] toml::ser::Error),
    #[error("Directory walk error: {0}")]
    WalkError(#[from] walkdir::Error),
    #[error("Environment variable error: {0}")]
    EnvVarError(#[from] env::VarError),
    #[error("Path error: {0}")]
    PathError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },
    #[error("Archive entry escapes target directory: {0}")]
    PathTraversal(String),
    #[error("Component '{component}' failed: {}", .errors.join("; "))]
    ComponentFailed {
        component: String,
        errors: Vec<String>,
    },
}
