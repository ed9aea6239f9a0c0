//! # gridcast-identity
//!
//! Resolution of a user identity to its assigned display color, behind the
//! narrow [`IdentityService`] interface the server's handshake depends on:
//!
//! - [`http`] — client for an external HTTP identity/color service
//! - [`fixed`] — static uid→color map for tests and demo mode
//!
//! `Ok(None)` means the identity exists but has no color assigned (the
//! unauthorized case); `Err` means the lookup itself failed.

#![deny(unsafe_code)]

use async_trait::async_trait;

pub mod fixed;
pub mod http;

pub use fixed::StaticIdentityService;
pub use http::HttpIdentityService;

/// Identity lookup failure.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// Transport-level failure reaching the identity service.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// The identity service answered with an unexpected status.
    #[error("identity service returned status {0}")]
    Status(u16),

    /// The identity service answered with an unusable body.
    #[error("identity service returned an unusable body")]
    Decode,
}

/// Narrow interface to the external identity service.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Resolve the color assigned to `uid`, or `None` when the identity has
    /// no color (unauthorized).
    async fn resolve_color(&self, uid: &str) -> Result<Option<String>, IdentityError>;
}
