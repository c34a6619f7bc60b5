//! Whispr Core - Messaging Backend Engine
//!
//! This crate provides the transport-independent core of the Whispr
//! encrypted-messaging backend, including:
//! - Auth: Signed bearer tokens with revocable identifiers
//! - Store: SQLite persistence for users, channels, messages and tokens
//! - Event Bus: In-process notification fan-out to gateway sessions
//! - Services: Account, channel, message and admin operations
//! - Password: Server-side hardening of client-derived passwords
//! - Shutdown: Graceful shutdown coordination

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod error;
pub mod event_bus;
pub mod models;
pub mod password;
pub mod services;
pub mod shutdown;
pub mod store;

pub use auth::{
    TokenCodec, TokenError, TokenHeader, TokenOptions, TokenPayload, TokenRecord, TokenStore,
    TokenType, VerifiedToken,
};
pub use error::{Error, ErrorKind, Result};
pub use event_bus::{Notification, NotificationBus, ServerEvent, Subscription};
pub use services::{AdminService, AuthService, ChannelService, UserService};
pub use shutdown::{shutdown_signal_with_controller, ShutdownController, ShutdownPhase};
pub use store::Store;
