//! Update fan-out to every registered session.

use std::sync::Arc;

use gridcast_core::{Meta, ResponseEnvelope, Voxel};
use metrics::counter;
use tracing::{debug, warn};

use super::registry::SessionRegistry;

/// Fans a stored update out to every live session.
pub struct Broadcaster {
    registry: Arc<SessionRegistry>,
}

impl Broadcaster {
    /// Create a broadcaster over the given registry.
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Send the client projection of `voxel` to every registered session,
    /// including the submitter.
    ///
    /// The envelope is serialized once and shared. A recipient whose
    /// channel is closed or full is logged and counted; it is never removed
    /// here — teardown belongs to the session loop that owns the socket —
    /// and its failure never blocks delivery to the rest.
    pub async fn broadcast(&self, voxel: &Voxel, meta: Meta) {
        let envelope = ResponseEnvelope::data(voxel.client_view(), meta);
        let json = match serde_json::to_string(&envelope) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(error = %e, "failed to serialize broadcast envelope");
                return;
            }
        };

        let recipients = self.registry.snapshot().await;
        let mut delivered = 0usize;
        for session in &recipients {
            if session.send(Arc::clone(&json)) {
                delivered += 1;
            } else {
                counter!(crate::metrics::WS_BROADCAST_FAILURES_TOTAL).increment(1);
                warn!(
                    session_id = %session.id,
                    drops = session.drop_count(),
                    "failed to deliver broadcast to session"
                );
            }
        }
        debug!(
            x = voxel.x,
            y = voxel.y,
            delivered,
            recipients = recipients.len(),
            "broadcast update"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::SessionHandle;
    use serde_json::Value;
    use tokio::sync::mpsc;

    fn make_session(color: &str) -> (Arc<SessionHandle>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(32);
        (
            Arc::new(SessionHandle::new("uid".into(), color.into(), tx)),
            rx,
        )
    }

    fn make_broken_session() -> Arc<SessionHandle> {
        let (tx, rx) = mpsc::channel(32);
        drop(rx);
        Arc::new(SessionHandle::new("uid".into(), "#000".into(), tx))
    }

    async fn setup() -> (Arc<SessionRegistry>, Broadcaster) {
        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());
        (registry, broadcaster)
    }

    #[tokio::test]
    async fn delivers_to_all_sessions_including_submitter() {
        let (registry, broadcaster) = setup().await;
        let (submitter, mut rx1) = make_session("#f00");
        let (other, mut rx2) = make_session("#0f0");
        registry.add(submitter.clone()).await;
        registry.add(other).await;

        let voxel = Voxel::new(1, 2, "#f00");
        broadcaster
            .broadcast(&voxel, Meta::event("update"))
            .await;

        for rx in [&mut rx1, &mut rx2] {
            let raw = rx.try_recv().unwrap();
            let parsed: Value = serde_json::from_str(&raw).unwrap();
            assert_eq!(parsed["data"]["owner"], "#f00");
            assert_eq!(parsed["meta"]["type"], "update");
        }
    }

    #[tokio::test]
    async fn broken_recipient_does_not_block_the_rest() {
        let (registry, broadcaster) = setup().await;
        registry.add(make_broken_session()).await;
        let mut receivers = Vec::new();
        for _ in 0..4 {
            let (session, rx) = make_session("#abc");
            registry.add(session).await;
            receivers.push(rx);
        }

        broadcaster
            .broadcast(&Voxel::new(0, 0, "#abc"), Meta::event("update"))
            .await;

        for rx in &mut receivers {
            assert!(rx.try_recv().is_ok());
        }
    }

    #[tokio::test]
    async fn broken_recipient_stays_registered() {
        let (registry, broadcaster) = setup().await;
        registry.add(make_broken_session()).await;

        broadcaster
            .broadcast(&Voxel::new(0, 0, "#abc"), Meta::event("update"))
            .await;

        // Removal is the owning session loop's job, not the broadcaster's.
        assert_eq!(registry.connection_count(), 1);
    }

    #[tokio::test]
    async fn projection_strips_internal_fields() {
        let (registry, broadcaster) = setup().await;
        let (session, mut rx) = make_session("#f00");
        registry.add(session).await;

        let voxel = Voxel {
            updated: Some(chrono::Utc::now()),
            ..Voxel::new(3, 4, "#f00").with_name("")
        };
        broadcaster.broadcast(&voxel, Meta::event("update")).await;

        let raw = rx.try_recv().unwrap();
        let parsed: Value = serde_json::from_str(&raw).unwrap();
        let data = parsed["data"].as_object().unwrap();
        assert!(!data.contains_key("updated"));
        assert!(!data.contains_key("name"));
    }

    #[tokio::test]
    async fn all_recipients_share_one_serialization() {
        let (registry, broadcaster) = setup().await;
        let (a, mut rx1) = make_session("#f00");
        let (b, mut rx2) = make_session("#0f0");
        registry.add(a).await;
        registry.add(b).await;

        broadcaster
            .broadcast(&Voxel::new(0, 0, "#f00"), Meta::event("update"))
            .await;

        let m1 = rx1.try_recv().unwrap();
        let m2 = rx2.try_recv().unwrap();
        assert!(Arc::ptr_eq(&m1, &m2));
    }

    #[tokio::test]
    async fn broadcast_to_empty_registry_is_fine() {
        let (_registry, broadcaster) = setup().await;
        broadcaster
            .broadcast(&Voxel::new(0, 0, "#f00"), Meta::event("update"))
            .await;
    }
}
