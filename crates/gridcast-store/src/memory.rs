//! In-memory grid store for tests and demo mode.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use gridcast_core::Voxel;
use parking_lot::Mutex;

use crate::GridStore;
use crate::errors::StoreError;
use crate::sqlite::DEFAULT_WORLD_BOUND;
use crate::validate::check_world_bounds;

/// Grid store holding cells in a mutex-guarded map.
pub struct MemoryGridStore {
    cells: Mutex<HashMap<(i64, i64), Voxel>>,
    world_bound: i64,
}

impl MemoryGridStore {
    /// Create an empty store with the default world bounds.
    pub fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
            world_bound: DEFAULT_WORLD_BOUND,
        }
    }

    /// Override the world bounds.
    #[must_use]
    pub fn with_world_bound(mut self, bound: i64) -> Self {
        self.world_bound = bound;
        self
    }

    /// Number of stored cells.
    pub fn len(&self) -> usize {
        self.cells.lock().len()
    }

    /// Whether the store holds no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.lock().is_empty()
    }
}

impl Default for MemoryGridStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GridStore for MemoryGridStore {
    async fn query_cells(&self, x: i64, y: i64, range: i64) -> Result<Vec<Voxel>, StoreError> {
        // Saturating: `range` is client-controlled and may sit at the i64
        // extremes.
        let (x_lo, x_hi) = (x.saturating_sub(range), x.saturating_add(range));
        let (y_lo, y_hi) = (y.saturating_sub(range), y.saturating_add(range));
        let cells = self.cells.lock();
        let mut hits: Vec<Voxel> = cells
            .values()
            .filter(|v| v.x > x_lo && v.x < x_hi && v.y > y_lo && v.y < y_hi)
            .cloned()
            .collect();
        hits.sort_by_key(|v| (v.x, v.y));
        Ok(hits)
    }

    async fn upsert_cell(&self, voxel: Voxel) -> Result<Voxel, StoreError> {
        check_world_bounds(voxel.x, voxel.y, self.world_bound)?;
        let stored = Voxel {
            updated: Some(Utc::now()),
            ..voxel
        };
        let _ = self
            .cells
            .lock()
            .insert((stored.x, stored.y), stored.clone());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_and_query() {
        let store = MemoryGridStore::new();
        store.upsert_cell(Voxel::new(1, 1, "#f00")).await.unwrap();
        let cells = store.query_cells(0, 0, 25).await.unwrap();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].owner, "#f00");
        assert!(cells[0].updated.is_some());
    }

    #[tokio::test]
    async fn strict_box_excludes_edges() {
        let store = MemoryGridStore::new();
        store.upsert_cell(Voxel::new(25, 0, "#f00")).await.unwrap();
        store.upsert_cell(Voxel::new(24, 0, "#f00")).await.unwrap();
        let cells = store.query_cells(0, 0, 25).await.unwrap();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].x, 24);
    }

    #[tokio::test]
    async fn upsert_replaces_cell_at_same_position() {
        let store = MemoryGridStore::new();
        store.upsert_cell(Voxel::new(2, 2, "#111")).await.unwrap();
        store.upsert_cell(Voxel::new(2, 2, "#222")).await.unwrap();
        assert_eq!(store.len(), 1);
        let cells = store.query_cells(2, 2, 1).await.unwrap();
        assert_eq!(cells[0].owner, "#222");
    }

    #[tokio::test]
    async fn out_of_bounds_rejected() {
        let store = MemoryGridStore::new().with_world_bound(10);
        let err = store.upsert_cell(Voxel::new(0, 10, "#abc")).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn extreme_range_values_do_not_overflow() {
        let store = MemoryGridStore::new();
        store.upsert_cell(Voxel::new(0, 0, "#f00")).await.unwrap();

        // An inverted box, never a panic or a wrapped one.
        let cells = store.query_cells(0, 0, i64::MIN).await.unwrap();
        assert!(cells.is_empty());
        let cells = store.query_cells(0, 0, -1).await.unwrap();
        assert!(cells.is_empty());

        let cells = store.query_cells(0, 0, i64::MAX).await.unwrap();
        assert_eq!(cells.len(), 1);
        let cells = store.query_cells(i64::MAX, i64::MIN, 100).await.unwrap();
        assert!(cells.is_empty());
    }

    #[tokio::test]
    async fn results_sorted_by_position() {
        let store = MemoryGridStore::new();
        store.upsert_cell(Voxel::new(5, 0, "#a")).await.unwrap();
        store.upsert_cell(Voxel::new(-5, 0, "#b")).await.unwrap();
        store.upsert_cell(Voxel::new(0, 3, "#c")).await.unwrap();
        let cells = store.query_cells(0, 0, 25).await.unwrap();
        let xs: Vec<i64> = cells.iter().map(|v| v.x).collect();
        assert_eq!(xs, vec![-5, 0, 5]);
    }
}
