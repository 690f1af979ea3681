// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Credential sources.
//!
//! A [`Realm`] is a pluggable backend that can answer two questions: what
//! account (principals + stored credential) backs a submitted token, and
//! what roles/permissions an authenticated identity holds. The kernel
//! orchestrates realms; it never knows where their data lives. Backends
//! such as LDAP or a database implement this trait outside the kernel;
//! the in-memory [`MemoryRealm`] ships with it.

pub mod memory;

pub use memory::MemoryRealm;

use crate::credential::{CredentialMatcher, PlainCredentialMatcher};
use crate::types::{Account, AuthenticationToken, AuthorizationRecord, PrincipalCollection};

/// A source of authentication and authorization data.
///
/// Lookup outcomes are three-valued on purpose:
/// - `Ok(Some(account))`: the source holds an account for the token
/// - `Ok(None)`: the source is certain it holds no such account
/// - `Err(_)`: the source could not answer (backend failure); callers
///   treat this as distinct from an unknown account
pub trait Realm: Send + Sync {
    /// Unique name of this realm. Principals and merged accounts are
    /// keyed by it.
    fn name(&self) -> &str;

    /// Whether this realm understands the submitted token kind. Realms
    /// that return `false` are skipped during authentication, not failed.
    fn supports(&self, token: &AuthenticationToken) -> bool;

    /// The account this realm holds for the token's principal, if any.
    fn account(&self, token: &AuthenticationToken) -> anyhow::Result<Option<Account>>;

    /// Roles and permissions this realm asserts for the given principals.
    /// Realms only answer for principals they themselves asserted
    /// (scoped by realm name); `Ok(None)` means "no data here".
    fn authorization(
        &self,
        principals: &PrincipalCollection,
    ) -> anyhow::Result<Option<AuthorizationRecord>>;

    /// The matcher used to verify submitted credentials against this
    /// realm's stored ones. Plain constant-time comparison by default.
    fn credential_matcher(&self) -> &dyn CredentialMatcher {
        &PlainCredentialMatcher
    }
}
