//! The set of live sessions and their assigned colors.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::RwLock;

use super::connection::SessionHandle;

/// Registry of currently open sessions, keyed by session handle.
///
/// The assigned color lives on the [`SessionHandle`] itself, so a session in
/// the live set always has a color and vice versa. Iteration happens over a
/// snapshot, so membership changes during a broadcast never corrupt the
/// traversal of the remaining recipients.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
    /// Atomic mirror of the live count (avoids read-locking for health/metrics).
    active_count: AtomicUsize,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
        }
    }

    /// Add a session.
    pub async fn add(&self, session: Arc<SessionHandle>) {
        let mut sessions = self.sessions.write().await;
        if sessions.insert(session.id.clone(), session).is_none() {
            let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove a session by handle. Idempotent: removing an absent session
    /// is a no-op, so every teardown path may call it unconditionally.
    pub async fn remove(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(session_id).is_some() {
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// The color assigned to a live session, if it is registered.
    pub async fn color_of(&self, session_id: &str) -> Option<String> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).map(|s| s.color.clone())
    }

    /// Snapshot of the current members, for fan-out.
    pub async fn snapshot(&self) -> Vec<Arc<SessionHandle>> {
        let sessions = self.sessions.read().await;
        sessions.values().cloned().collect()
    }

    /// Number of live sessions.
    pub fn connection_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn make_session(uid: &str, color: &str) -> Arc<SessionHandle> {
        let (tx, rx) = mpsc::channel(32);
        // Receiver is dropped; registry tests never send.
        drop(rx);
        Arc::new(SessionHandle::new(uid.into(), color.into(), tx))
    }

    #[tokio::test]
    async fn add_and_count() {
        let registry = SessionRegistry::new();
        registry.add(make_session("u1", "#f00")).await;
        registry.add(make_session("u2", "#0f0")).await;
        assert_eq!(registry.connection_count(), 2);
    }

    #[tokio::test]
    async fn remove_drops_membership_and_color() {
        let registry = SessionRegistry::new();
        let session = make_session("u1", "#f00");
        let id = session.id.clone();
        registry.add(session).await;
        assert_eq!(registry.color_of(&id).await.as_deref(), Some("#f00"));

        registry.remove(&id).await;
        assert_eq!(registry.connection_count(), 0);
        assert!(registry.color_of(&id).await.is_none());
    }

    #[tokio::test]
    async fn double_remove_is_noop() {
        let registry = SessionRegistry::new();
        let session = make_session("u1", "#f00");
        let id = session.id.clone();
        registry.add(session).await;
        registry.add(make_session("u2", "#0f0")).await;

        registry.remove(&id).await;
        registry.remove(&id).await;
        assert_eq!(registry.connection_count(), 1);
    }

    #[tokio::test]
    async fn remove_unknown_session_is_noop() {
        let registry = SessionRegistry::new();
        registry.remove("never-registered").await;
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn color_of_unknown_session_is_none() {
        let registry = SessionRegistry::new();
        assert!(registry.color_of("nope").await.is_none());
    }

    #[tokio::test]
    async fn snapshot_tolerates_concurrent_removal() {
        let registry = SessionRegistry::new();
        let a = make_session("u1", "#f00");
        let b = make_session("u2", "#0f0");
        let a_id = a.id.clone();
        registry.add(a).await;
        registry.add(b).await;

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 2);

        // Removing mid-iteration must not disturb the snapshot.
        registry.remove(&a_id).await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(registry.connection_count(), 1);
    }

    #[tokio::test]
    async fn same_uid_may_hold_multiple_sessions() {
        let registry = SessionRegistry::new();
        registry.add(make_session("u1", "#f00")).await;
        registry.add(make_session("u1", "#f00")).await;
        assert_eq!(registry.connection_count(), 2);
    }
}
