//! Resilient streaming feed client for Trainwatch.
//!
//! Owns one WebSocket connection to the live position feed, reconnects
//! with exponential backoff, heartbeats while connected, and decodes
//! inbound frames into [`PositionUpdate`] batches.
//!
//! # Modules
//!
//! - [`backoff`] -- Reconnect delay curve with jitter
//! - [`channel`] -- [`TransportChannel`] and its [`TransportHandle`]
//! - [`codec`] -- Tolerant inbound frame decoding
//! - [`error`] -- [`TransportError`]
//!
//! [`PositionUpdate`]: trainwatch_types::PositionUpdate

pub mod backoff;
pub mod channel;
pub mod codec;
pub mod error;

pub use channel::{ConnectionState, TransportChannel, TransportHandle, UpdateHandler};
pub use error::TransportError;
