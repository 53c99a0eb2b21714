//! palaver-gateway: client for the chat session proxy
//!
//! This crate wraps the four proxy operations (create, message, status, end)
//! and isolates every assumption about the vendor's payload shapes in
//! [`compat`].

pub mod compat;
pub mod error;
pub mod gateway;
pub mod types;

pub use error::{Error, Result};
pub use gateway::{GatewayConfig, HttpGateway, SessionGateway};
pub use types::{CreatedSession, Variables};
