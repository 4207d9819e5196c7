//! # Onboarding Common Library
//!
//! Shared code for the onboarding simulator crates:
//! - Common error type
//! - Bootstrap configuration loading (TOML)
//! - Root folder resolution

pub mod config;
pub mod error;

pub use error::{Error, Result};
