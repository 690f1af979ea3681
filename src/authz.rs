// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Authorization engine.
//!
//! The [`Authorizer`] answers role and permission questions for an
//! authenticated identity by merging the [`AuthorizationRecord`]s of
//! every configured realm and evaluating wildcard implication over the
//! result. Boolean queries (`is_permitted`, `has_role`) return plain
//! bools; `check_*` variants surface a typed [`AuthorizationError`] so
//! call sites can `?` a denial. A denial is never downgraded to an
//! allow: a realm that fails during lookup simply contributes nothing.

use std::sync::Arc;

use crate::errors::AuthorizationError;
use crate::permission::{Logical, WildcardPermission};
use crate::realm::Realm;
use crate::types::{AuthorizationRecord, PrincipalCollection};

/// Role/permission evaluation over an ordered realm list.
pub struct Authorizer {
    realms: Vec<Arc<dyn Realm>>,
}

impl Authorizer {
    pub fn new(realms: Vec<Arc<dyn Realm>>) -> Self {
        Self { realms }
    }

    /// Merge the authorization data every realm asserts for these
    /// principals. A realm backend failure is logged and contributes no
    /// data: it can narrow the result, never widen it.
    fn collect(&self, principals: &PrincipalCollection) -> AuthorizationRecord {
        let mut merged = AuthorizationRecord::new();
        for realm in &self.realms {
            match realm.authorization(principals) {
                Ok(Some(record)) => merged.merge(&record),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        realm = realm.name(),
                        error = %e,
                        "realm failed during authorization lookup; treating as no data"
                    );
                }
            }
        }
        merged
    }

    // =========================================================================
    // PERMISSIONS
    // =========================================================================

    /// Does any held permission imply the requested one?
    ///
    /// A malformed permission string can never be granted; it is logged
    /// and evaluates to `false`.
    pub fn is_permitted(&self, principals: &PrincipalCollection, permission: &str) -> bool {
        match WildcardPermission::new(permission) {
            Ok(requested) => self.is_permitted_parsed(principals, &requested),
            Err(e) => {
                tracing::warn!(permission, error = %e, "malformed permission in check");
                false
            }
        }
    }

    /// [`Authorizer::is_permitted`] for an already-parsed permission.
    pub fn is_permitted_parsed(
        &self,
        principals: &PrincipalCollection,
        requested: &WildcardPermission,
    ) -> bool {
        let record = self.collect(principals);
        record.permissions.iter().any(|held| held.implies(requested))
    }

    /// Are all of the requested permissions held?
    pub fn is_permitted_all(&self, principals: &PrincipalCollection, permissions: &[&str]) -> bool {
        let record = self.collect(principals);
        permissions.iter().all(|permission| {
            match WildcardPermission::new(permission) {
                Ok(requested) => record.permissions.iter().any(|held| held.implies(&requested)),
                Err(e) => {
                    tracing::warn!(permission, error = %e, "malformed permission in check");
                    false
                }
            }
        })
    }

    /// Assert a single permission, failing with
    /// [`AuthorizationError::PermissionDenied`] otherwise.
    pub fn check_permission(
        &self,
        principals: &PrincipalCollection,
        permission: &str,
    ) -> Result<(), AuthorizationError> {
        if self.is_permitted(principals, permission) {
            Ok(())
        } else {
            tracing::info!(
                "AUTHZ_DENIED | principal={} permission={}",
                principals.primary().unwrap_or("<none>"),
                permission
            );
            Err(AuthorizationError::PermissionDenied {
                permission: permission.to_string(),
            })
        }
    }

    /// Assert several permissions, combined with AND or OR.
    ///
    /// AND stops at the first missing permission, OR at the first held
    /// one.
    pub fn check_permissions(
        &self,
        principals: &PrincipalCollection,
        permissions: &[&str],
        logical: Logical,
    ) -> Result<(), AuthorizationError> {
        match logical {
            Logical::And => {
                for permission in permissions {
                    self.check_permission(principals, permission)?;
                }
                Ok(())
            }
            Logical::Or => {
                if permissions
                    .iter()
                    .any(|permission| self.is_permitted(principals, permission))
                {
                    Ok(())
                } else {
                    Err(AuthorizationError::PermissionDenied {
                        permission: permissions.join(" | "),
                    })
                }
            }
        }
    }

    // =========================================================================
    // ROLES
    // =========================================================================

    /// Does the identity hold the named role?
    pub fn has_role(&self, principals: &PrincipalCollection, role: &str) -> bool {
        self.collect(principals).roles.contains(role)
    }

    /// AND over role names.
    pub fn has_all_roles(&self, principals: &PrincipalCollection, roles: &[&str]) -> bool {
        let record = self.collect(principals);
        roles.iter().all(|role| record.roles.contains(*role))
    }

    /// OR over role names.
    pub fn has_any_role(&self, principals: &PrincipalCollection, roles: &[&str]) -> bool {
        let record = self.collect(principals);
        roles.iter().any(|role| record.roles.contains(*role))
    }

    /// Assert role membership with an explicit AND/OR combinator.
    ///
    /// AND short-circuits at the first missing role, OR at the first
    /// held one.
    pub fn check_roles(
        &self,
        principals: &PrincipalCollection,
        roles: &[&str],
        logical: Logical,
    ) -> Result<(), AuthorizationError> {
        let record = self.collect(principals);
        let satisfied = match logical {
            Logical::And => roles.iter().all(|role| record.roles.contains(*role)),
            Logical::Or => roles.iter().any(|role| record.roles.contains(*role)),
        };
        if satisfied {
            Ok(())
        } else {
            tracing::info!(
                "AUTHZ_DENIED | principal={} roles={:?}",
                principals.primary().unwrap_or("<none>"),
                roles
            );
            Err(AuthorizationError::RoleDenied {
                roles: roles.iter().map(|r| r.to_string()).collect(),
            })
        }
    }
}
