// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory realm.
//!
//! Holds user and role definition tables behind a single `RwLock`. A bulk
//! [`MemoryRealm::load`] replaces both tables under one write-lock hold,
//! so a concurrent authentication or authorization read either sees the
//! complete old tables or the complete new ones, never a partial reload.
//! Incremental `define_user` / `define_role` calls take the same write
//! lock.
//!
//! Authorization lookups can optionally be cached through a
//! [`CacheManager`](crate::cache::CacheManager)-provided cache, keyed by
//! principal identity; any mutation of the tables invalidates it.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::cache::{Cache, CacheManager};
use crate::credential::{CredentialMatcher, PlainCredentialMatcher};
use crate::errors::{CacheError, PermissionError};
use crate::locks::{resilient_read, resilient_write};
use crate::permission::WildcardPermission;
use crate::realm::Realm;
use crate::types::{
    Account, AuthenticationToken, AuthorizationRecord, PrincipalCollection, StoredCredential,
    PASSWORD_TOKEN_KIND,
};

#[derive(Clone)]
struct UserEntry {
    credential: StoredCredential,
    roles: HashSet<String>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<String, UserEntry>,
    roles: HashMap<String, Vec<WildcardPermission>>,
}

/// A user definition for bulk loading: name, stored credential, role
/// names.
pub struct UserDefinition {
    pub name: String,
    pub credential: StoredCredential,
    pub roles: Vec<String>,
}

/// A role definition for bulk loading: name plus permission strings.
pub struct RoleDefinition {
    pub name: String,
    pub permissions: Vec<String>,
}

/// Realm backed by in-process user/role tables.
pub struct MemoryRealm {
    name: String,
    tables: RwLock<Tables>,
    matcher: Box<dyn CredentialMatcher>,
    authorization_cache: Option<Arc<dyn Cache<AuthorizationRecord>>>,
}

impl MemoryRealm {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: RwLock::new(Tables::default()),
            matcher: Box::new(PlainCredentialMatcher),
            authorization_cache: None,
        }
    }

    /// Replace the default plain matcher, e.g. with a
    /// [`HashedCredentialMatcher`](crate::credential::HashedCredentialMatcher)
    /// when the tables hold digests instead of cleartext.
    pub fn with_matcher(mut self, matcher: Box<dyn CredentialMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    /// Cache authorization lookups in a cache obtained from `manager`.
    ///
    /// The realm borrows the manager only long enough to obtain its cache
    /// handle; it does not own the manager.
    pub fn with_authorization_cache(mut self, manager: &CacheManager) -> Result<Self, CacheError> {
        let cache = manager.cache::<AuthorizationRecord>(&format!("{}-authorization", self.name))?;
        self.authorization_cache = Some(cache);
        Ok(self)
    }

    /// Define (or redefine) a user with its stored credential and roles.
    pub fn define_user(
        &self,
        name: impl Into<String>,
        credential: StoredCredential,
        roles: &[&str],
    ) {
        let name = name.into();
        {
            let mut tables = resilient_write(&self.tables);
            tables.users.insert(
                name.clone(),
                UserEntry {
                    credential,
                    roles: roles.iter().map(|r| r.to_string()).collect(),
                },
            );
        }
        self.invalidate_authorization_cache();
        tracing::debug!(realm = %self.name, user = %name, "defined user");
    }

    /// Define (or redefine) a role as a set of permission strings.
    pub fn define_role(
        &self,
        name: impl Into<String>,
        permissions: &[&str],
    ) -> Result<(), PermissionError> {
        let name = name.into();
        let parsed = permissions
            .iter()
            .map(|p| WildcardPermission::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        {
            let mut tables = resilient_write(&self.tables);
            tables.roles.insert(name.clone(), parsed);
        }
        self.invalidate_authorization_cache();
        tracing::debug!(realm = %self.name, role = %name, "defined role");
        Ok(())
    }

    /// Atomically replace both tables.
    ///
    /// Permission strings are parsed before the write lock is taken: a
    /// parse error leaves the current tables untouched, and concurrent
    /// readers block only for the swap itself, never observing a realm
    /// with new users but old roles.
    pub fn load(
        &self,
        users: Vec<UserDefinition>,
        roles: Vec<RoleDefinition>,
    ) -> Result<(), PermissionError> {
        let mut new_roles = HashMap::with_capacity(roles.len());
        for role in roles {
            let parsed = role
                .permissions
                .iter()
                .map(|p| WildcardPermission::new(p))
                .collect::<Result<Vec<_>, _>>()?;
            new_roles.insert(role.name, parsed);
        }

        let mut new_users = HashMap::with_capacity(users.len());
        for user in users {
            new_users.insert(
                user.name,
                UserEntry {
                    credential: user.credential,
                    roles: user.roles.into_iter().collect(),
                },
            );
        }

        let (user_count, role_count) = (new_users.len(), new_roles.len());
        {
            let mut tables = resilient_write(&self.tables);
            tables.users = new_users;
            tables.roles = new_roles;
        }
        self.invalidate_authorization_cache();
        tracing::info!(
            realm = %self.name,
            users = user_count,
            roles = role_count,
            "realm definitions reloaded"
        );
        Ok(())
    }

    pub fn user_count(&self) -> usize {
        resilient_read(&self.tables).users.len()
    }

    fn invalidate_authorization_cache(&self) {
        if let Some(cache) = &self.authorization_cache {
            cache.clear();
        }
    }

    fn build_record(&self, tables: &Tables, usernames: &[String]) -> Option<AuthorizationRecord> {
        let mut record = AuthorizationRecord::new();
        let mut found = false;
        for username in usernames {
            let Some(user) = tables.users.get(username) else {
                continue;
            };
            found = true;
            for role in &user.roles {
                record.roles.insert(role.clone());
                if let Some(permissions) = tables.roles.get(role) {
                    record.permissions.extend(permissions.iter().cloned());
                }
            }
        }
        found.then_some(record)
    }
}

impl Realm for MemoryRealm {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, token: &AuthenticationToken) -> bool {
        token.kind() == PASSWORD_TOKEN_KIND
    }

    fn account(&self, token: &AuthenticationToken) -> anyhow::Result<Option<Account>> {
        let tables = resilient_read(&self.tables);
        Ok(tables.users.get(token.principal()).map(|user| {
            Account::new(self.name.as_str(), token.principal(), user.credential.clone())
        }))
    }

    fn authorization(
        &self,
        principals: &PrincipalCollection,
    ) -> anyhow::Result<Option<AuthorizationRecord>> {
        let usernames = principals.from_realm(&self.name);
        if usernames.is_empty() {
            return Ok(None);
        }

        let cache_key = principals.cache_key();
        if let Some(cache) = &self.authorization_cache {
            if let Some(record) = cache.get(&cache_key) {
                return Ok(Some(record));
            }
        }

        let record = {
            let tables = resilient_read(&self.tables);
            self.build_record(&tables, usernames)
        };

        if let (Some(cache), Some(record)) = (&self.authorization_cache, &record) {
            cache.put(&cache_key, record.clone());
        }
        Ok(record)
    }

    fn credential_matcher(&self) -> &dyn CredentialMatcher {
        self.matcher.as_ref()
    }
}
