//! Passgate Common Types and Utilities
//!
//! Shared credential types, configuration, and error handling for the passgate
//! authentication service.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::{Error, ErrorKind, Result};
