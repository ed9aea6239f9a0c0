//! # gridcast-core
//!
//! Wire protocol types shared between the server and its tests:
//!
//! - Request/response envelopes and the `meta` correlation block
//! - The [`Voxel`] grid cell and its client-facing projection
//!
//! The envelope format is deliberately loose on the inbound side (`id` is an
//! opaque JSON value, `args` is an arbitrary mapping) and strict on the
//! outbound side (exactly one of `data` / `error` per message).

#![deny(unsafe_code)]

pub mod envelope;
pub mod voxel;

pub use envelope::{ErrorBody, Meta, RequestEnvelope, ResponseEnvelope};
pub use voxel::Voxel;
