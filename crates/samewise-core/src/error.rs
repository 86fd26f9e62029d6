use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Scan cancelled")]
    Cancelled,

    #[error("Not a file or directory: {0}")]
    UnsupportedEntry(PathBuf),

    #[error("Entry could not be hashed: {0}")]
    Unreadable(PathBuf),

    #[error("{0}")]
    Other(String),
}
