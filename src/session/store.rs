// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Cache-backed session persistence.
//!
//! Active sessions live in one cache; sessions that reached a terminal
//! state (stopped or expired) are parked in a retention cache so a late
//! `get` can still tell *why* the id is no longer usable. The retention
//! cache is swept by the background validator once entries outlive the
//! configured window, after which the id reads as unknown.
//!
//! Every read validates first: an expired session is transitioned,
//! listeners are notified, and the caller sees
//! [`SessionError::Expired`], never a stale session object.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::cache::{Cache, CacheManager, NoopCache};
use crate::errors::{CacheError, SessionError};
use crate::session::{Session, SessionEvent, SessionListener};

/// Cache names used by the store.
const ACTIVE_CACHE_NAME: &str = "active-sessions";
const RETAINED_CACHE_NAME: &str = "retained-sessions";

/// Creates, reads, updates, stops, and deletes sessions.
pub struct SessionStore {
    active: Arc<dyn Cache<Session>>,
    retained: Arc<dyn Cache<Session>>,
    listeners: Vec<Arc<dyn SessionListener>>,
    default_timeout: Option<Duration>,
    id_counter: AtomicU64,
}

impl SessionStore {
    /// Build a store whose caches come from `manager`.
    ///
    /// `retain_terminal` controls whether stopped/expired sessions are
    /// parked for late reads; with `false` they are dropped immediately
    /// and read back as unknown.
    pub fn new(
        manager: &CacheManager,
        default_timeout: Option<Duration>,
        retain_terminal: bool,
    ) -> Result<Self, CacheError> {
        let active = manager.cache::<Session>(ACTIVE_CACHE_NAME)?;
        let retained: Arc<dyn Cache<Session>> = if retain_terminal {
            manager.cache::<Session>(RETAINED_CACHE_NAME)?
        } else {
            Arc::new(NoopCache::new(RETAINED_CACHE_NAME))
        };
        Ok(Self {
            active,
            retained,
            listeners: Vec::new(),
            default_timeout,
            id_counter: AtomicU64::new(1),
        })
    }

    pub fn add_listener(&mut self, listener: Arc<dyn SessionListener>) {
        self.listeners.push(listener);
    }

    /// Globally unique session id: timestamp, monotonic counter, random
    /// component.
    fn generate_session_id(&self) -> String {
        let counter = self.id_counter.fetch_add(1, Ordering::SeqCst);
        let timestamp = Utc::now().timestamp_millis();
        let random: u32 = rand::random();
        format!("sess_{timestamp}_{counter}_{random:08x}")
    }

    // =========================================================================
    // LIFECYCLE OPERATIONS
    // =========================================================================

    /// Create a new active session and return a snapshot of it.
    pub fn create(&self, host: Option<&str>) -> Session {
        let session = Session::new(
            self.generate_session_id(),
            host.map(str::to_string),
            self.default_timeout,
        );
        self.active.put(session.id(), session.clone());

        let event = SessionEvent::Started {
            session_id: session.id().to_string(),
            host: session.host().map(str::to_string),
            timestamp: session.start_timestamp(),
        };
        tracing::info!("{}", event.to_audit_string());
        for listener in &self.listeners {
            if let Err(e) = listener.on_start(&session) {
                tracing::warn!(error = %e, "session start listener failed");
            }
        }
        session
    }

    /// Read a session, validating it first.
    ///
    /// An expired session is transitioned (listeners notified, moved to
    /// the retention cache) before the error is returned; the caller
    /// never receives a stale active session.
    pub fn get(&self, id: &str) -> Result<Session, SessionError> {
        if let Some(mut session) = self.active.get(id) {
            return match session.validate() {
                Ok(()) => Ok(session),
                Err(SessionError::Expired { .. }) => {
                    self.expire(session);
                    Err(SessionError::Expired { id: id.to_string() })
                }
                Err(other) => {
                    // A stopped session in the active cache means a stop
                    // bypassed the store; repair the caches and report it.
                    self.active.remove(id);
                    self.retained.put(id, session);
                    Err(other)
                }
            };
        }

        match self.retained.get(id) {
            Some(session) if session.is_expired() => {
                Err(SessionError::Expired { id: id.to_string() })
            }
            Some(_) => Err(SessionError::Stopped { id: id.to_string() }),
            None => Err(SessionError::Unknown { id: id.to_string() }),
        }
    }

    /// Refresh a session's last-access timestamp.
    pub fn touch(&self, id: &str) -> Result<(), SessionError> {
        let mut session = self.get(id)?;
        session.touch();
        self.active.put(id, session);
        Ok(())
    }

    /// Persist attribute/timeout changes to a still-active session.
    ///
    /// If the stored session has since stopped or expired, the update is
    /// rejected; an update never resurrects a terminal session.
    pub fn update(&self, session: Session) -> Result<(), SessionError> {
        let id = session.id().to_string();
        // Validate against the *stored* state, not the caller's copy.
        self.get(&id)?;
        if !session.is_valid() {
            // The caller's copy itself went terminal; refuse to write it
            // into the active cache.
            return Err(if session.is_expired() {
                SessionError::Expired { id }
            } else {
                SessionError::Stopped { id }
            });
        }
        self.active.put(&id, session);
        Ok(())
    }

    /// Explicitly stop a session.
    pub fn stop(&self, id: &str) -> Result<(), SessionError> {
        let mut session = self.get(id)?;
        session.stop();
        self.active.remove(id);
        self.retained.put(id, session.clone());

        let event = SessionEvent::Stopped {
            session_id: id.to_string(),
            timestamp: session.stop_timestamp().unwrap_or_else(Utc::now),
        };
        tracing::info!("{}", event.to_audit_string());
        for listener in &self.listeners {
            if let Err(e) = listener.on_stop(&session) {
                tracing::warn!(error = %e, "session stop listener failed");
            }
        }
        Ok(())
    }

    /// Remove a session from every cache, terminal or not. Fires no
    /// notification beyond what stop/expire already fired.
    pub fn delete(&self, id: &str) {
        self.active.remove(id);
        self.retained.remove(id);
    }

    /// Transition an active session to expired: notify, evict from the
    /// active cache, park in the retention cache.
    pub(crate) fn expire(&self, mut session: Session) {
        session.mark_expired();
        let id = session.id().to_string();
        self.active.remove(&id);
        self.retained.put(&id, session.clone());

        let event = SessionEvent::Expired {
            session_id: id,
            idle_secs: session.idle_duration().as_secs(),
            timestamp: Utc::now(),
        };
        tracing::info!("{}", event.to_audit_string());
        for listener in &self.listeners {
            if let Err(e) = listener.on_expiration(&session) {
                tracing::warn!(error = %e, "session expiration listener failed");
            }
        }
    }

    // =========================================================================
    // VALIDATOR SUPPORT
    // =========================================================================

    /// Ids of every session currently tracked as active.
    pub fn active_ids(&self) -> Vec<String> {
        self.active.keys()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Drop retained terminal sessions older than `window`. Returns the
    /// number removed.
    pub(crate) fn sweep_retained(&self, window: Duration) -> usize {
        let now = Utc::now();
        let mut swept = 0;
        for session in self.retained.values() {
            let stopped_at = session.stop_timestamp().unwrap_or(now);
            let age = (now - stopped_at).to_std().unwrap_or(Duration::ZERO);
            if age > window {
                self.retained.remove(session.id());
                swept += 1;
            }
        }
        if swept > 0 {
            tracing::debug!(swept, "swept retained sessions past the retention window");
        }
        swept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread::sleep;

    fn store() -> SessionStore {
        let manager = CacheManager::new();
        SessionStore::new(&manager, Some(Duration::from_secs(60)), true).unwrap()
    }

    #[test]
    fn test_create_and_get() {
        let store = store();
        let session = store.create(Some("10.0.0.5"));
        assert!(session.id().starts_with("sess_"));

        let read = store.get(session.id()).unwrap();
        assert_eq!(read.host(), Some("10.0.0.5"));
        assert_eq!(read.timeout(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_ids_are_unique() {
        let store = store();
        let a = store.create(None);
        let b = store.create(None);
        assert_ne!(a.id(), b.id());
        assert_eq!(store.active_count(), 2);
    }

    #[test]
    fn test_unknown_id() {
        let store = store();
        assert!(matches!(
            store.get("sess_nope"),
            Err(SessionError::Unknown { .. })
        ));
    }

    #[test]
    fn test_attribute_update_roundtrip() {
        let store = store();
        let mut session = store.create(None);
        session.set_attribute("cart", "3 items");
        store.update(session.clone()).unwrap();

        let read = store.get(session.id()).unwrap();
        assert_eq!(read.attribute("cart"), Some("3 items"));
    }

    #[test]
    fn test_expired_on_read() {
        let store = store();
        let mut session = store.create(None);
        session.set_timeout(Some(Duration::from_millis(20)));
        store.update(session.clone()).unwrap();

        sleep(Duration::from_millis(60));
        let err = store.get(session.id()).unwrap_err();
        assert!(matches!(err, SessionError::Expired { .. }));

        // The session left the active cache and the id stays expired,
        // not unknown, while retained.
        assert_eq!(store.active_count(), 0);
        assert!(matches!(
            store.get(session.id()),
            Err(SessionError::Expired { .. })
        ));
    }

    #[test]
    fn test_update_never_resurrects() {
        let store = store();
        let mut session = store.create(None);
        session.set_attribute("k", "v");
        store.stop(session.id()).unwrap();

        let err = store.update(session).unwrap_err();
        assert!(matches!(err, SessionError::Stopped { .. }));
    }

    #[test]
    fn test_stop_then_get_reports_stopped() {
        let store = store();
        let session = store.create(None);
        store.stop(session.id()).unwrap();

        assert!(matches!(
            store.get(session.id()),
            Err(SessionError::Stopped { .. })
        ));
        // Stopping again fails the same way; the transition is terminal.
        assert!(matches!(
            store.stop(session.id()),
            Err(SessionError::Stopped { .. })
        ));
    }

    #[test]
    fn test_delete_is_unconditional() {
        let store = store();
        let session = store.create(None);
        store.stop(session.id()).unwrap();
        store.delete(session.id());

        assert!(matches!(
            store.get(session.id()),
            Err(SessionError::Unknown { .. })
        ));
    }

    #[test]
    fn test_without_retention_terminal_reads_unknown() {
        let manager = CacheManager::new();
        let store = SessionStore::new(&manager, None, false).unwrap();
        let session = store.create(None);
        store.stop(session.id()).unwrap();

        assert!(matches!(
            store.get(session.id()),
            Err(SessionError::Unknown { .. })
        ));
    }

    #[test]
    fn test_sweep_retained() {
        let store = store();
        let session = store.create(None);
        store.stop(session.id()).unwrap();

        // Within the window nothing is swept.
        assert_eq!(store.sweep_retained(Duration::from_secs(3600)), 0);
        assert_eq!(store.sweep_retained(Duration::ZERO), 1);
        assert!(matches!(
            store.get(session.id()),
            Err(SessionError::Unknown { .. })
        ));
    }

    #[test]
    fn test_touch_postpones_store_expiry() {
        let store = store();
        let mut session = store.create(None);
        session.set_timeout(Some(Duration::from_millis(80)));
        store.update(session.clone()).unwrap();

        sleep(Duration::from_millis(50));
        store.touch(session.id()).unwrap();
        sleep(Duration::from_millis(50));
        assert!(store.get(session.id()).is_ok());
    }

    struct CountingListener {
        starts: AtomicUsize,
        stops: AtomicUsize,
        expirations: AtomicUsize,
    }

    impl SessionListener for CountingListener {
        fn on_start(&self, _s: &Session) -> anyhow::Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn on_stop(&self, _s: &Session) -> anyhow::Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("stop listener exploded")
        }
        fn on_expiration(&self, _s: &Session) -> anyhow::Result<()> {
            self.expirations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_listeners_fire_and_errors_are_swallowed() {
        let manager = CacheManager::new();
        let mut store = SessionStore::new(&manager, None, true).unwrap();
        let listener = Arc::new(CountingListener {
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            expirations: AtomicUsize::new(0),
        });
        store.add_listener(listener.clone());

        let session = store.create(None);
        assert_eq!(listener.starts.load(Ordering::SeqCst), 1);

        // The stop listener errors; the stop still succeeds.
        store.stop(session.id()).unwrap();
        assert_eq!(listener.stops.load(Ordering::SeqCst), 1);

        let mut second = store.create(None);
        second.set_timeout(Some(Duration::from_millis(10)));
        store.update(second.clone()).unwrap();
        sleep(Duration::from_millis(30));
        let _ = store.get(second.id());
        assert_eq!(listener.expirations.load(Ordering::SeqCst), 1);
    }
}
