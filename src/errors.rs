// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Typed failure taxonomy for the kernel.
//!
//! Every decision the kernel makes surfaces to the caller as a typed
//! outcome: authentication attempts, permission checks, and session
//! lookups each have their own error enum so callers can react to the
//! precise condition (retry a login, re-establish an expired session,
//! hard-fail an unknown one) without string matching.
//!
//! Listener and notification callbacks are the one exception: their errors
//! are logged and swallowed at the notification site so they can never
//! mask the primary result.

use thiserror::Error;

/// Why an authentication attempt failed.
///
/// All variants are terminal for the attempt; the kernel never retries on
/// its own. Retry policy, if any, belongs to the caller.
#[derive(Debug, Error)]
pub enum AuthenticationError {
    /// No configured realm recognizes the submitted token kind.
    #[error("no realm supports token kind '{kind}'")]
    NoApplicableSource { kind: String },

    /// Every applicable realm was consulted and none holds an account for
    /// the submitted principal.
    #[error("unknown account '{principal}'")]
    UnknownAccount { principal: String },

    /// An account was found but the submitted credential does not match
    /// the stored one.
    #[error("submitted credentials for '{principal}' did not match")]
    CredentialMismatch { principal: String },

    /// A realm backend failed while looking up the account. Distinct from
    /// [`AuthenticationError::UnknownAccount`]: the account may exist, the
    /// source just could not answer.
    #[error("realm '{realm}' failed during authentication: {source}")]
    SourceUnavailable {
        realm: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Why an authorization check was denied.
///
/// A denial is always surfaced, never downgraded to an allow.
#[derive(Debug, Error)]
pub enum AuthorizationError {
    /// The acting principals do not hold a permission implying the
    /// requested one.
    #[error("permission denied: {permission}")]
    PermissionDenied { permission: String },

    /// The acting principals do not satisfy the required role check.
    #[error("role requirement not met: {roles:?}")]
    RoleDenied { roles: Vec<String> },
}

/// Why a session operation failed.
///
/// The three variants are deliberately distinguishable so callers can
/// transparently re-establish a session on expiry while hard-failing an
/// id that was never issued.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No session with this id is tracked in any cache.
    #[error("unknown session id '{id}'")]
    Unknown { id: String },

    /// The session exceeded its idle timeout and has been invalidated.
    #[error("session '{id}' has expired")]
    Expired { id: String },

    /// The session was explicitly stopped; no further interaction under
    /// this id is allowed.
    #[error("session '{id}' has been stopped")]
    Stopped { id: String },
}

/// Cache registry failures.
///
/// A cache miss is not an error (`get` returns `None`); this type only
/// covers configuration and programming errors, which fail fast.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A named cache was first registered with a different value type.
    /// This is a wiring bug, not a runtime condition.
    #[error("cache '{name}' is already registered with a different value type")]
    TypeMismatch { name: String },

    /// The manager was asked for a cache after `destroy()` tore down the
    /// registry.
    #[error("cache manager has been destroyed")]
    Destroyed,
}

/// Permission string parse failures.
#[derive(Debug, Error)]
pub enum PermissionError {
    /// Empty or whitespace-only permission string.
    #[error("permission string cannot be empty")]
    Empty,

    /// A string consisting only of part/token dividers, e.g. `":,:"`.
    #[error("permission string '{input}' contains only dividers")]
    OnlyDividers { input: String },
}

/// Umbrella error for the kernel facade.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Permission(#[from] PermissionError),
}
