// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared data types for authentication and authorization.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::permission::WildcardPermission;

/// Token kind understood by password-style realms. Realms advertise which
/// kinds they support; unrecognized kinds are skipped, not failed.
pub const PASSWORD_TOKEN_KIND: &str = "password";

// =============================================================================
// CREDENTIALS
// =============================================================================

/// Credential material, submitted or stored.
///
/// Whatever form a credential arrives in, matching always operates on raw
/// bytes obtained through [`Credential::as_bytes`]: text converts as its
/// UTF-8 encoding, byte credentials pass through untouched. This is the
/// single conversion point for the whole kernel; matchers additionally
/// decode hex/base64 *stored* text when configured to.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Text(String),
    Bytes(Vec<u8>),
}

impl Credential {
    /// The raw bytes of this credential. Text is its UTF-8 encoding.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Credential::Text(s) => s.as_bytes(),
            Credential::Bytes(b) => b,
        }
    }

    /// The credential as text, when it was submitted as text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Credential::Text(s) => Some(s),
            Credential::Bytes(_) => None,
        }
    }
}

impl From<&str> for Credential {
    fn from(s: &str) -> Self {
        Credential::Text(s.to_string())
    }
}

impl From<String> for Credential {
    fn from(s: String) -> Self {
        Credential::Text(s)
    }
}

impl From<Vec<u8>> for Credential {
    fn from(b: Vec<u8>) -> Self {
        Credential::Bytes(b)
    }
}

// Credentials never appear in logs or debug output.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Text(_) => write!(f, "Credential::Text(<redacted>)"),
            Credential::Bytes(_) => write!(f, "Credential::Bytes(<redacted>)"),
        }
    }
}

/// A credential as a realm stores it, with its optional salt.
#[derive(Debug, Clone)]
pub struct StoredCredential {
    pub value: Credential,
    pub salt: Option<Vec<u8>>,
}

impl StoredCredential {
    pub fn plain(value: impl Into<Credential>) -> Self {
        Self { value: value.into(), salt: None }
    }

    pub fn salted(value: impl Into<Credential>, salt: Vec<u8>) -> Self {
        Self { value: value.into(), salt: Some(salt) }
    }
}

// =============================================================================
// TOKENS
// =============================================================================

/// A submitted authentication request: who claims to be asking, the
/// credential backing the claim, and where the request originated.
#[derive(Clone)]
pub struct AuthenticationToken {
    kind: String,
    principal: String,
    credential: Credential,
    host: Option<String>,
}

impl AuthenticationToken {
    /// A username/password token, the common case.
    pub fn password(principal: impl Into<String>, password: impl Into<Credential>) -> Self {
        Self {
            kind: PASSWORD_TOKEN_KIND.to_string(),
            principal: principal.into(),
            credential: password.into(),
            host: None,
        }
    }

    /// A token of an arbitrary kind, for custom realm integrations.
    pub fn new(
        kind: impl Into<String>,
        principal: impl Into<String>,
        credential: impl Into<Credential>,
    ) -> Self {
        Self {
            kind: kind.into(),
            principal: principal.into(),
            credential: credential.into(),
            host: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }
}

impl fmt::Debug for AuthenticationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationToken")
            .field("kind", &self.kind)
            .field("principal", &self.principal)
            .field("credential", &"<redacted>")
            .field("host", &self.host)
            .finish()
    }
}

// =============================================================================
// PRINCIPALS
// =============================================================================

/// Identity attributes of an authenticated entity, grouped by the realm
/// that asserted them.
///
/// Entries are realm-scoped and never deduplicated across realms: the
/// same username asserted by two realms remains two distinct entries. The
/// *primary* principal is the first principal of the first entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalCollection {
    entries: Vec<RealmPrincipals>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RealmPrincipals {
    realm: String,
    principals: Vec<String>,
}

impl PrincipalCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// A collection holding a single principal from a single realm.
    pub fn single(realm: impl Into<String>, principal: impl Into<String>) -> Self {
        let mut collection = Self::new();
        collection.add(realm, principal);
        collection
    }

    /// Add a principal under the given realm. Duplicate values within one
    /// realm entry are collapsed; across realms they are kept distinct.
    pub fn add(&mut self, realm: impl Into<String>, principal: impl Into<String>) {
        let realm = realm.into();
        let principal = principal.into();
        if let Some(entry) = self.entries.iter_mut().find(|e| e.realm == realm) {
            if !entry.principals.contains(&principal) {
                entry.principals.push(principal);
            }
        } else {
            self.entries.push(RealmPrincipals { realm, principals: vec![principal] });
        }
    }

    /// Fold another collection into this one, preserving realm scoping.
    pub fn merge(&mut self, other: &PrincipalCollection) {
        for entry in &other.entries {
            for principal in &entry.principals {
                self.add(entry.realm.clone(), principal.clone());
            }
        }
    }

    /// The primary principal: the first principal asserted by the first
    /// realm, if any.
    pub fn primary(&self) -> Option<&str> {
        self.entries
            .first()
            .and_then(|e| e.principals.first())
            .map(String::as_str)
    }

    /// Principals asserted by a specific realm.
    pub fn from_realm(&self, realm: &str) -> &[String] {
        self.entries
            .iter()
            .find(|e| e.realm == realm)
            .map(|e| e.principals.as_slice())
            .unwrap_or(&[])
    }

    /// Every principal across all realms, in insertion order.
    pub fn all(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .flat_map(|e| e.principals.iter().map(String::as_str))
    }

    pub fn realm_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.realm.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stable key for caching authorization data for this identity.
    pub fn cache_key(&self) -> String {
        let mut key = String::new();
        for entry in &self.entries {
            key.push_str(&entry.realm);
            key.push('=');
            key.push_str(&entry.principals.join(","));
            key.push(';');
        }
        key
    }
}

// =============================================================================
// ACCOUNTS
// =============================================================================

/// The claim a realm makes about a login attempt: the principals it
/// asserts and the credential it has on record, tagged with the realm's
/// name. A merged account (all-success aggregation) carries the entries
/// of every matching realm.
#[derive(Debug, Clone)]
pub struct Account {
    principals: PrincipalCollection,
    credentials: Vec<(String, StoredCredential)>,
}

impl Account {
    pub fn new(
        realm: impl Into<String>,
        principal: impl Into<String>,
        credential: StoredCredential,
    ) -> Self {
        let realm = realm.into();
        Self {
            principals: PrincipalCollection::single(realm.clone(), principal),
            credentials: vec![(realm, credential)],
        }
    }

    pub fn principals(&self) -> &PrincipalCollection {
        &self.principals
    }

    /// The stored credential asserted by the named realm, if any.
    pub fn credential_from(&self, realm: &str) -> Option<&StoredCredential> {
        self.credentials
            .iter()
            .find(|(r, _)| r == realm)
            .map(|(_, c)| c)
    }

    /// The stored credential of the realm that produced this (unmerged)
    /// account.
    pub fn credential(&self) -> Option<&StoredCredential> {
        self.credentials.first().map(|(_, c)| c)
    }

    /// Fold another realm's claim into this one, keyed by source.
    pub fn merge(&mut self, other: &Account) {
        self.principals.merge(&other.principals);
        for (realm, credential) in &other.credentials {
            if !self.credentials.iter().any(|(r, _)| r == realm) {
                self.credentials.push((realm.clone(), credential.clone()));
            }
        }
    }
}

// =============================================================================
// AUTHORIZATION DATA
// =============================================================================

/// Roles and permissions a realm asserts for a set of principals.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationRecord {
    pub roles: HashSet<String>,
    pub permissions: Vec<WildcardPermission>,
}

impl AuthorizationRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn with_permission(mut self, permission: WildcardPermission) -> Self {
        self.permissions.push(permission);
        self
    }

    /// Merge another record into this one (used when several realms
    /// contribute authorization data for the same identity).
    pub fn merge(&mut self, other: &AuthorizationRecord) {
        self.roles.extend(other.roles.iter().cloned());
        self.permissions.extend(other.permissions.iter().cloned());
    }
}
