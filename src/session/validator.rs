// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Background session validation.
//!
//! The [`SessionValidator`] periodically enumerates every active session
//! and validates it, reaping the expired ones exactly as an on-access
//! check would (same transition, same notifications). It runs on its own
//! thread, sleeping between scans on a condvar so that [`disable`]
//! (`SessionValidator::disable`) can wake it immediately and join the
//! thread instead of leaking it.
//!
//! Two scans never run concurrently against the same store: the scan
//! body is guarded by a mutex, and a trigger that finds a scan already
//! in progress skips rather than queueing behind it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::errors::SessionError;
use crate::locks::{resilient_lock, try_resilient_lock};
use crate::session::store::SessionStore;

/// Default interval between background scans: one hour.
pub const DEFAULT_VALIDATION_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Outcome of a single validation scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Sessions enumerated.
    pub checked: usize,
    /// Sessions found expired and reaped in this scan.
    pub expired: usize,
    /// Sessions that were already stopped when examined.
    pub stopped: usize,
    /// Retained terminal sessions dropped for outliving the window.
    pub swept: usize,
}

struct ValidatorShared {
    store: Arc<SessionStore>,
    interval: Duration,
    retention_window: Duration,
    /// `true` requests the background thread to exit.
    shutdown: Mutex<bool>,
    wake: Condvar,
    /// Held for the duration of a scan; concurrent triggers skip.
    scan_guard: Mutex<()>,
    expired_total: AtomicU64,
    stopped_total: AtomicU64,
    scans_completed: AtomicU64,
}

impl ValidatorShared {
    /// Run one scan, unless one is already running.
    fn scan(&self) -> Option<ScanReport> {
        let _guard = try_resilient_lock(&self.scan_guard)?;

        let ids = self.store.active_ids();
        let mut report = ScanReport { checked: ids.len(), ..ScanReport::default() };

        for id in &ids {
            // `get` validates and performs the expiration transition
            // itself, firing the same notifications an on-access
            // detection would.
            match self.store.get(id) {
                Ok(_) => {}
                Err(SessionError::Expired { .. }) => report.expired += 1,
                Err(SessionError::Stopped { .. }) => report.stopped += 1,
                Err(SessionError::Unknown { .. }) => {
                    // Deleted between enumeration and validation; nothing
                    // to count.
                }
            }
        }

        report.swept = self.store.sweep_retained(self.retention_window);

        self.expired_total.fetch_add(report.expired as u64, Ordering::SeqCst);
        self.stopped_total.fetch_add(report.stopped as u64, Ordering::SeqCst);
        self.scans_completed.fetch_add(1, Ordering::SeqCst);

        tracing::info!(
            checked = report.checked,
            expired = report.expired,
            stopped = report.stopped,
            swept = report.swept,
            "session validation scan finished"
        );
        Some(report)
    }

    fn run_loop(&self) {
        loop {
            {
                let mut shutdown = resilient_lock(&self.shutdown);
                if *shutdown {
                    break;
                }
                let (guard, timeout) = match self.wake.wait_timeout(shutdown, self.interval) {
                    Ok(pair) => pair,
                    Err(poisoned) => poisoned.into_inner(),
                };
                shutdown = guard;
                if *shutdown {
                    break;
                }
                if !timeout.timed_out() {
                    // Spurious wake-up; go back to sleep for a full
                    // interval.
                    continue;
                }
            }
            // Scan without holding the shutdown lock so disable() is
            // never blocked behind a scan.
            self.scan();
        }
        tracing::debug!("session validator thread exiting");
    }
}

/// Schedulable background reaper for expired sessions.
pub struct SessionValidator {
    shared: Arc<ValidatorShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SessionValidator {
    pub fn new(
        store: Arc<SessionStore>,
        interval: Duration,
        retention_window: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(ValidatorShared {
                store,
                interval,
                retention_window,
                shutdown: Mutex::new(false),
                wake: Condvar::new(),
                scan_guard: Mutex::new(()),
                expired_total: AtomicU64::new(0),
                stopped_total: AtomicU64::new(0),
                scans_completed: AtomicU64::new(0),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Start the background thread. Idempotent: enabling a running
    /// validator is a no-op.
    pub fn enable(&self) {
        let mut handle = resilient_lock(&self.handle);
        if handle.is_some() {
            return;
        }
        *resilient_lock(&self.shared.shutdown) = false;

        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name("warden-session-validator".into())
            .spawn(move || shared.run_loop());
        match spawned {
            Ok(join_handle) => {
                *handle = Some(join_handle);
                tracing::info!(
                    interval_secs = self.shared.interval.as_secs(),
                    "session validation enabled"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to spawn session validator thread");
            }
        }
    }

    /// Stop the background thread and wait for it to exit.
    ///
    /// Safe to call concurrently with an in-flight scan: the thread
    /// finishes (or skips) its current cycle, then exits and is joined,
    /// so no thread is leaked. Idempotent.
    pub fn disable(&self) {
        // Hold the handle lock across the join so a concurrent enable()
        // cannot spawn a second thread while this one is still exiting.
        let mut handle = resilient_lock(&self.handle);
        {
            let mut shutdown = resilient_lock(&self.shared.shutdown);
            *shutdown = true;
        }
        self.shared.wake.notify_all();

        if let Some(join_handle) = handle.take() {
            if join_handle.join().is_err() {
                tracing::error!("session validator thread panicked");
            }
            tracing::info!("session validation disabled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        resilient_lock(&self.handle).is_some()
    }

    /// Run a scan right now, on the caller's thread.
    ///
    /// Returns `None` if a scan is already in progress (the concurrent
    /// scan covers the same sessions; running a second would double the
    /// notifications).
    pub fn validate_now(&self) -> Option<ScanReport> {
        self.shared.scan()
    }

    /// Sessions reaped as expired across all scans.
    pub fn expired_count(&self) -> u64 {
        self.shared.expired_total.load(Ordering::SeqCst)
    }

    /// Already-stopped sessions encountered across all scans.
    pub fn stopped_count(&self) -> u64 {
        self.shared.stopped_total.load(Ordering::SeqCst)
    }

    pub fn scans_completed(&self) -> u64 {
        self.shared.scans_completed.load(Ordering::SeqCst)
    }
}

impl Drop for SessionValidator {
    fn drop(&mut self) {
        self.disable();
    }
}
