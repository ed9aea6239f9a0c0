//! WebSocket gateway: session handles, the registry, broadcast fan-out,
//! protocol dispatch, and the per-connection session loop.

pub mod broadcast;
pub mod connection;
pub mod dispatch;
pub mod registry;
pub mod session;
