// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session lifecycle.
//!
//! A [`Session`] tracks one authenticated interaction: an opaque id
//! assigned at creation, start and last-access timestamps, an idle
//! timeout, an attribute map, and an optional origin host. Sessions move
//! through three states:
//!
//! ```text
//! active --stop()--> stopped
//! active --idle past timeout--> expired
//! ```
//!
//! Both terminal states are permanent. Expiry is *detected*, not
//! scheduled: a session whose idle time exceeds its timeout reports
//! expired on the next validation, whether that validation happens on
//! access ([`SessionStore::get`](crate::session::store::SessionStore))
//! or during a background scan
//! ([`SessionValidator`](crate::session::validator::SessionValidator)).
//!
//! Per-session mutation is not atomic across threads: two callers doing
//! read-modify-write on the same session id must serialize externally.
//! The store guarantees only that individual reads and writes are
//! consistent.

pub mod store;
pub mod validator;

pub use store::SessionStore;
pub use validator::{ScanReport, SessionValidator};

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::SessionError;

/// Default idle timeout for new sessions: 30 minutes.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// A single authenticated interaction with the application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    id: String,
    start_timestamp: DateTime<Utc>,
    last_access_timestamp: DateTime<Utc>,
    /// `None` or zero means the session never expires from idleness.
    timeout: Option<Duration>,
    stop_timestamp: Option<DateTime<Utc>>,
    expired: bool,
    attributes: HashMap<String, String>,
    host: Option<String>,
}

impl Session {
    /// A new active session. Ids are assigned by the store; this is the
    /// entity constructor only.
    pub(crate) fn new(id: String, host: Option<String>, timeout: Option<Duration>) -> Self {
        let now = Utc::now();
        Self {
            id,
            start_timestamp: now,
            last_access_timestamp: now,
            timeout,
            stop_timestamp: None,
            expired: false,
            attributes: HashMap::new(),
            host,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn start_timestamp(&self) -> DateTime<Utc> {
        self.start_timestamp
    }

    pub fn last_access_timestamp(&self) -> DateTime<Utc> {
        self.last_access_timestamp
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Change the idle timeout. Takes effect at the next validation.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    pub fn stop_timestamp(&self) -> Option<DateTime<Utc>> {
        self.stop_timestamp
    }

    /// Refresh the last-access timestamp, postponing idle expiry.
    pub fn touch(&mut self) {
        self.last_access_timestamp = Utc::now();
    }

    /// Transition to stopped. Idempotent: the first stop timestamp wins.
    pub(crate) fn stop(&mut self) {
        if self.stop_timestamp.is_none() {
            self.stop_timestamp = Some(Utc::now());
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_timestamp.is_some()
    }

    pub(crate) fn mark_expired(&mut self) {
        self.stop();
        self.expired = true;
    }

    /// Whether this session has been invalidated by idle expiry. True
    /// once the expired transition ran, or when idle time already
    /// exceeds a positive timeout.
    pub fn is_expired(&self) -> bool {
        if self.expired {
            return true;
        }
        let Some(timeout) = self.timeout else {
            return false;
        };
        if timeout.is_zero() {
            return false;
        }
        self.idle_duration() > timeout
    }

    /// Active means neither stopped nor expired.
    pub fn is_valid(&self) -> bool {
        !self.is_stopped() && !self.is_expired()
    }

    /// Time since the last access.
    pub fn idle_duration(&self) -> Duration {
        (Utc::now() - self.last_access_timestamp)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Assert this session is still usable.
    ///
    /// A stopped session fails with [`SessionError::Stopped`]; checking
    /// stop before expiry mirrors the transition order: an explicit stop
    /// is authoritative over later idle expiry. A timed-out session is
    /// transitioned to expired here and fails with
    /// [`SessionError::Expired`].
    pub(crate) fn validate(&mut self) -> Result<(), SessionError> {
        if self.is_stopped() && !self.expired {
            return Err(SessionError::Stopped { id: self.id.clone() });
        }
        if self.is_expired() {
            self.mark_expired();
            return Err(SessionError::Expired { id: self.id.clone() });
        }
        Ok(())
    }

    // =========================================================================
    // ATTRIBUTES
    // =========================================================================

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn remove_attribute(&mut self, key: &str) -> Option<String> {
        self.attributes.remove(key)
    }

    pub fn attribute_keys(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }
}

// =============================================================================
// LIFECYCLE EVENTS
// =============================================================================

/// Session lifecycle events, rendered into the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    Started {
        session_id: String,
        host: Option<String>,
        timestamp: DateTime<Utc>,
    },
    Stopped {
        session_id: String,
        timestamp: DateTime<Utc>,
    },
    Expired {
        session_id: String,
        idle_secs: u64,
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Format for the audit log.
    pub fn to_audit_string(&self) -> String {
        match self {
            SessionEvent::Started { session_id, host, timestamp } => format!(
                "{} | SESSION_STARTED | session={} host={}",
                timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                session_id,
                host.as_deref().unwrap_or("-")
            ),
            SessionEvent::Stopped { session_id, timestamp } => format!(
                "{} | SESSION_STOPPED | session={}",
                timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                session_id
            ),
            SessionEvent::Expired { session_id, idle_secs, timestamp } => format!(
                "{} | SESSION_EXPIRED | session={} idle={}s",
                timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                session_id,
                idle_secs
            ),
        }
    }
}

/// Observer of session lifecycle transitions.
///
/// Listener failures are logged by the store and never affect the
/// session operation that triggered them.
pub trait SessionListener: Send + Sync {
    fn on_start(&self, session: &Session) -> anyhow::Result<()> {
        let _ = session;
        Ok(())
    }

    fn on_stop(&self, session: &Session) -> anyhow::Result<()> {
        let _ = session;
        Ok(())
    }

    fn on_expiration(&self, session: &Session) -> anyhow::Result<()> {
        let _ = session;
        Ok(())
    }
}
