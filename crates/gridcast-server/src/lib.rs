//! # gridcast-server
//!
//! Axum HTTP + `WebSocket` server for the shared grid:
//!
//! - `WebSocket` gateway: identity handshake, session registry, per-identity
//!   rate limiting, protocol dispatch, broadcast fan-out
//! - HTTP endpoints: health check, Prometheus metrics
//! - Graceful shutdown via `tokio-util` `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod limiter;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;
