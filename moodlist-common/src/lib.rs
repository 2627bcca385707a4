//! # Moodlist Common Library
//!
//! Shared code for the Moodlist services:
//! - Error and result types
//! - Bootstrap configuration (TOML file discovery and loading)
//! - Provider credential resolution

pub mod config;
pub mod error;

pub use error::{Error, Result};
