//! The grid cell type and its client-facing projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One cell of the shared grid.
///
/// `owner` is the display color of the identity that last wrote the cell,
/// stamped by the server — clients never supply it. `updated` is internal
/// bookkeeping set by the store and stripped before broadcasting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voxel {
    /// Grid x coordinate.
    pub x: i64,
    /// Grid y coordinate.
    pub y: i64,
    /// Color of the owning identity.
    pub owner: String,
    /// Optional display label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Last-modified timestamp, set by the store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

impl Voxel {
    /// Create a voxel without bookkeeping fields.
    pub fn new(x: i64, y: i64, owner: impl Into<String>) -> Self {
        Self {
            x,
            y,
            owner: owner.into(),
            name: None,
            updated: None,
        }
    }

    /// Attach a display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The projection sent to clients on broadcast: `updated` is stripped
    /// and an empty name is omitted rather than sent as `""`.
    pub fn client_view(&self) -> Value {
        let mut view = serde_json::json!({
            "x": self.x,
            "y": self.y,
            "owner": self.owner,
        });
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => {
                view["name"] = Value::String(name.to_owned());
            }
            _ => {}
        }
        view
    }
}
