//! Per-session connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use gridcast_core::ResponseEnvelope;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

/// One live client session.
///
/// The handle (`id`) is a uuid-v7 token unique to this connection — never
/// reused across reconnects and never derived from pointer identity. The
/// assigned color is immutable for the session's lifetime.
pub struct SessionHandle {
    /// Unique session handle, the registry key.
    pub id: String,
    /// The user identity this session authenticated as (rate-limit key).
    pub uid: String,
    /// Color assigned at handshake, stamped onto every cell this session writes.
    pub color: String,
    /// Send channel to the session's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has responded since the last ping.
    pub is_alive: AtomicBool,
    /// When the last Pong (or any activity) was received.
    last_pong: Mutex<Instant>,
    /// Count of messages dropped due to a full or closed channel.
    pub dropped_messages: AtomicU64,
}

impl SessionHandle {
    /// Create a handle with a fresh uuid-v7 id.
    pub fn new(uid: String, color: String, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::now_v7().to_string(),
            uid,
            color,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Enqueue a text message for the client.
    ///
    /// Returns `false` when the channel is full or closed, and increments
    /// the dropped message counter.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize an envelope and enqueue it.
    pub fn send_envelope(&self, envelope: &ResponseEnvelope) -> bool {
        match serde_json::to_string(envelope) {
            Ok(json) => self.send(Arc::new(json)),
            Err(_) => false,
        }
    }

    /// Total messages dropped for this session.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong or frame received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last sign of life.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for the ping cycle.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridcast_core::Meta;
    use serde_json::json;

    fn make_session() -> (SessionHandle, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(32);
        (SessionHandle::new("u1".into(), "#ff0000".into(), tx), rx)
    }

    #[test]
    fn fresh_handles_are_unique() {
        let (a, _rxa) = make_session();
        let (b, _rxb) = make_session();
        assert_ne!(a.id, b.id);
        assert!(a.is_alive.load(Ordering::Relaxed));
    }

    #[test]
    fn identity_and_color_bound_at_construction() {
        let (session, _rx) = make_session();
        assert_eq!(session.uid, "u1");
        assert_eq!(session.color, "#ff0000");
    }

    #[tokio::test]
    async fn send_delivers_to_channel() {
        let (session, mut rx) = make_session();
        assert!(session.send(Arc::new("hello".into())));
        assert_eq!(&*rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn send_to_closed_channel_counts_drop() {
        let (tx, rx) = mpsc::channel(32);
        let session = SessionHandle::new("u".into(), "#fff".into(), tx);
        drop(rx);
        assert!(!session.send(Arc::new("hello".into())));
        assert_eq!(session.drop_count(), 1);
    }

    #[tokio::test]
    async fn send_to_full_channel_counts_drop() {
        let (tx, _rx) = mpsc::channel(1);
        let session = SessionHandle::new("u".into(), "#fff".into(), tx);
        assert!(session.send(Arc::new("one".into())));
        assert!(!session.send(Arc::new("two".into())));
        assert_eq!(session.drop_count(), 1);
    }

    #[tokio::test]
    async fn send_envelope_serializes_json() {
        let (session, mut rx) = make_session();
        let envelope =
            gridcast_core::ResponseEnvelope::data(json!({"color": "#ff0000"}), Meta::event("userColor"));
        assert!(session.send_envelope(&envelope));
        let raw = rx.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["data"]["color"], "#ff0000");
        assert_eq!(parsed["meta"]["type"], "userColor");
    }

    #[test]
    fn check_alive_resets_flag() {
        let (session, _rx) = make_session();
        assert!(session.check_alive());
        assert!(!session.check_alive());
        session.mark_alive();
        assert!(session.check_alive());
    }

    #[test]
    fn age_increases() {
        let (session, _rx) = make_session();
        let first = session.age();
        std::thread::sleep(Duration::from_millis(5));
        assert!(session.age() > first);
    }
}
