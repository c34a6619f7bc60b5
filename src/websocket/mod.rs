//! WebSocket module for Whispr
//!
//! - `protocol`: gateway frame format, opcodes and close codes
//! - `gateway`: the authenticated real-time event socket

pub mod gateway;
pub mod protocol;

pub use gateway::{gateway_routes, GatewaySettings, GatewayState, SessionRegistry};
