//! HTTP client for the external identity/color service.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::{IdentityError, IdentityService};

/// Expected response body from the identity service.
#[derive(Debug, Deserialize)]
struct ColorResponse {
    color: Option<String>,
}

/// Identity service reached over HTTP.
///
/// `GET {base_url}/users/{uid}/color` → `{"color": "#rrggbb"}`.
/// A 404 means the identity has no color (unauthorized); any other
/// non-success status is a lookup failure.
#[derive(Clone, Debug)]
pub struct HttpIdentityService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpIdentityService {
    /// Create a client for the service at `base_url` (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl IdentityService for HttpIdentityService {
    async fn resolve_color(&self, uid: &str) -> Result<Option<String>, IdentityError> {
        let url = format!("{}/users/{uid}/color", self.base_url);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!(uid, "identity has no assigned color");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(IdentityError::Status(status.as_u16()));
        }

        let body: ColorResponse = response.json().await.map_err(|_| IdentityError::Decode)?;
        Ok(body.color)
    }
}
