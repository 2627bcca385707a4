//! Common error types for Moodlist

use thiserror::Error;

/// Common result type for Moodlist operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across Moodlist crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
