//! Static identity service backed by a fixed uid→color map.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::{IdentityError, IdentityService};

/// Identity service that answers from a map built at construction.
///
/// Unknown identities resolve to `None` (unauthorized), never to an error.
#[derive(Clone, Debug, Default)]
pub struct StaticIdentityService {
    colors: HashMap<String, String>,
}

impl StaticIdentityService {
    /// Build from `(uid, color)` pairs.
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            colors: pairs.into_iter().collect(),
        }
    }

    /// Add one identity.
    #[must_use]
    pub fn with_user(mut self, uid: impl Into<String>, color: impl Into<String>) -> Self {
        let _ = self.colors.insert(uid.into(), color.into());
        self
    }
}

#[async_trait]
impl IdentityService for StaticIdentityService {
    async fn resolve_color(&self, uid: &str) -> Result<Option<String>, IdentityError> {
        Ok(self.colors.get(uid).cloned())
    }
}
