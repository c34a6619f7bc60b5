//! Middleware module for the Whispr HTTP server
//!
//! Provides:
//! - Bearer token authorization with per-route exemptions

pub mod auth;
