// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Poison-recovering lock helpers.
//!
//! Every shared structure in the kernel (cache registries, session stores,
//! realm tables) sits behind a standard-library lock. A thread that panics
//! while holding one of those locks poisons it, and the default behavior of
//! unwrapping the guard would turn a single panic into a denial of service
//! for every authentication and session lookup that follows.
//!
//! These helpers recover the guard instead: the poisoning is logged as a
//! security event and the caller proceeds with the data as-is. For the
//! kernel's structures that trade-off is sound because every write is a
//! whole-value insert or remove, so a partially applied mutation cannot be
//! observed through the recovered guard.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Acquire a read lock, recovering from poisoning if necessary.
///
/// Poisoning is logged under the `warden::locks` target so an operator can
/// trace the original panic; the guard is handed back either way.
#[inline]
pub fn resilient_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                target: "warden::locks",
                event = "LOCK_POISONED_READ",
                "RwLock poisoned during read acquisition; recovering. A thread \
                 panicked while holding this lock. Investigate the panic cause."
            );
            poisoned.into_inner()
        }
    }
}

/// Acquire a write lock, recovering from poisoning if necessary.
#[inline]
pub fn resilient_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                target: "warden::locks",
                event = "LOCK_POISONED_WRITE",
                "RwLock poisoned during write acquisition; recovering. A thread \
                 panicked while holding this lock. Investigate the panic cause."
            );
            poisoned.into_inner()
        }
    }
}

/// Acquire a mutex, recovering from poisoning if necessary.
///
/// Used by the session validator for its scan guard and wake-up signal.
#[inline]
pub fn resilient_lock<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                target: "warden::locks",
                event = "LOCK_POISONED_MUTEX",
                "Mutex poisoned during acquisition; recovering."
            );
            poisoned.into_inner()
        }
    }
}

/// Try to acquire a mutex without blocking.
///
/// Returns `None` if the lock is currently held. Recovers from poisoning.
/// The session validator uses this to skip a scan when one is already in
/// progress rather than queueing a second scan behind it.
#[inline]
pub fn try_resilient_lock<T>(lock: &Mutex<T>) -> Option<MutexGuard<'_, T>> {
    match lock.try_lock() {
        Ok(guard) => Some(guard),
        Err(std::sync::TryLockError::Poisoned(poisoned)) => {
            tracing::error!(
                target: "warden::locks",
                event = "LOCK_POISONED_TRY_MUTEX",
                "Mutex poisoned during try_lock; recovering."
            );
            Some(poisoned.into_inner())
        }
        Err(std::sync::TryLockError::WouldBlock) => None,
    }
}
