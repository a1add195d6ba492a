//! Core application functionality
//!
//! This module contains the outer layer of the tool:
//! - CLI parsing and validation
//! - User settings
//! - Error types shared by every stage
//! - Process setup and command dispatch

pub mod cli;
pub mod config_file;
pub mod errors;
pub mod platform;
pub mod runner;

// Re-export commonly used items
pub use cli::CliArgs;
pub use config_file::ConfigFile;
pub use errors::{PipelineError, PipelineResult};
pub use runner::run_app;
