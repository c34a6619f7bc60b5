//! Server module for Whispr
//!
//! Contains the server initialization and runtime logic.
//!
//! # Module Structure
//!
//! - `config`: Configuration structures
//! - `loader`: Configuration loading from files and environment
//! - `validation`: Startup and production configuration checks
//! - `background_tasks`: Domain self-check
//! - `init`: Server initialization and run loop

mod background_tasks;
pub mod config;
mod init;
mod loader;
mod validation;

// Re-export public API
pub use init::run;
