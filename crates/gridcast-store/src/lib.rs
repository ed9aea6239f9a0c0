//! # gridcast-store
//!
//! Storage for the shared grid, behind the narrow [`GridStore`] interface
//! the server dispatches through:
//!
//! - [`sqlite`] — file/in-memory SQLite backend (r2d2 pool, WAL mode)
//! - [`memory`] — plain in-memory backend for tests and demo mode
//! - [`validate`] — update payload schema validation
//!
//! Range queries use a strict axis-aligned box (`x - r < cell.x < x + r`,
//! same for `y`); upserts stamp the `updated` timestamp server-side and
//! reject cells outside the world bounds with a structured error detail.

#![deny(unsafe_code)]

use async_trait::async_trait;
use gridcast_core::Voxel;

pub mod errors;
pub mod memory;
pub mod sqlite;
pub mod validate;

pub use errors::StoreError;
pub use memory::MemoryGridStore;
pub use sqlite::SqliteGridStore;

/// Narrow interface to the external grid store.
#[async_trait]
pub trait GridStore: Send + Sync {
    /// All cells inside the strict box centered on `(x, y)` with the given
    /// half-width.
    async fn query_cells(&self, x: i64, y: i64, range: i64) -> Result<Vec<Voxel>, StoreError>;

    /// Insert or replace a cell, returning the stored record (with the
    /// server-side `updated` stamp).
    async fn upsert_cell(&self, voxel: Voxel) -> Result<Voxel, StoreError>;
}
