// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The assembled security kernel.
//!
//! [`SecurityKernel`] wires realms, the authenticator, the authorizer,
//! and the session subsystem behind one handle. It is the surface an
//! embedding application talks to; each piece remains usable on its own
//! for applications that need only a slice of it.
//!
//! The kernel holds no ambient "current user" state. Every operation
//! takes the acting identity (a [`PrincipalCollection`]) or session id
//! explicitly; an application that wants thread-local convenience can
//! layer it on top.

use std::sync::Arc;

use crate::auth::{AuthenticationListener, Authenticator};
use crate::authz::Authorizer;
use crate::cache::CacheManager;
use crate::config::KernelConfig;
use crate::errors::{AuthenticationError, AuthorizationError, CacheError, SessionError};
use crate::permission::Logical;
use crate::realm::Realm;
use crate::session::validator::ScanReport;
use crate::session::{Session, SessionListener, SessionStore, SessionValidator};
use crate::types::{Account, AuthenticationToken, PrincipalCollection};

/// Builder for a [`SecurityKernel`].
pub struct KernelBuilder {
    config: KernelConfig,
    realms: Vec<Arc<dyn Realm>>,
    authentication_listeners: Vec<Box<dyn AuthenticationListener>>,
    session_listeners: Vec<Arc<dyn SessionListener>>,
}

impl KernelBuilder {
    pub fn new(config: KernelConfig) -> Self {
        Self {
            config,
            realms: Vec::new(),
            authentication_listeners: Vec::new(),
            session_listeners: Vec::new(),
        }
    }

    /// Append a realm. Order matters: authentication consults realms in
    /// registration order.
    pub fn realm(mut self, realm: Arc<dyn Realm>) -> Self {
        self.realms.push(realm);
        self
    }

    pub fn authentication_listener(mut self, listener: Box<dyn AuthenticationListener>) -> Self {
        self.authentication_listeners.push(listener);
        self
    }

    pub fn session_listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
        self.session_listeners.push(listener);
        self
    }

    pub fn build(self) -> Result<SecurityKernel, CacheError> {
        let cache_manager = Arc::new(if self.config.caching_enabled {
            CacheManager::new()
        } else {
            CacheManager::disabled()
        });

        let mut authenticator = Authenticator::new(self.realms.clone(), self.config.strategy);
        for listener in self.authentication_listeners {
            authenticator.add_listener(listener);
        }
        let authorizer = Authorizer::new(self.realms.clone());

        // Session storage must be real even when caching is disabled;
        // sessions have nowhere else to live. The session store gets its
        // own always-on manager in that case.
        let session_cache_manager: Arc<CacheManager> = if self.config.caching_enabled {
            Arc::clone(&cache_manager)
        } else {
            Arc::new(CacheManager::new())
        };
        let retain = !self.config.terminal_session_retention.is_zero();
        let mut store = SessionStore::new(
            &session_cache_manager,
            self.config.session_timeout,
            retain,
        )?;
        for listener in self.session_listeners {
            store.add_listener(listener);
        }
        let store = Arc::new(store);
        let validator = SessionValidator::new(
            Arc::clone(&store),
            self.config.validation_interval,
            self.config.terminal_session_retention,
        );
        if self.config.validation_enabled {
            validator.enable();
        }

        Ok(SecurityKernel {
            cache_manager,
            session_cache_manager,
            authenticator,
            authorizer,
            store,
            validator,
        })
    }
}

/// One handle over authentication, authorization, and sessions.
pub struct SecurityKernel {
    cache_manager: Arc<CacheManager>,
    session_cache_manager: Arc<CacheManager>,
    authenticator: Authenticator,
    authorizer: Authorizer,
    store: Arc<SessionStore>,
    validator: SessionValidator,
}

impl SecurityKernel {
    pub fn builder(config: KernelConfig) -> KernelBuilder {
        KernelBuilder::new(config)
    }

    /// The cache manager realms may borrow for their own lookup caches.
    pub fn cache_manager(&self) -> &Arc<CacheManager> {
        &self.cache_manager
    }

    // =========================================================================
    // AUTHENTICATION
    // =========================================================================

    /// Verify a submitted token against the configured realms.
    pub fn authenticate(
        &self,
        token: &AuthenticationToken,
    ) -> Result<Account, AuthenticationError> {
        self.authenticator.authenticate(token)
    }

    // =========================================================================
    // AUTHORIZATION
    // =========================================================================

    pub fn is_permitted(&self, principals: &PrincipalCollection, permission: &str) -> bool {
        self.authorizer.is_permitted(principals, permission)
    }

    pub fn is_permitted_all(
        &self,
        principals: &PrincipalCollection,
        permissions: &[&str],
    ) -> bool {
        self.authorizer.is_permitted_all(principals, permissions)
    }

    pub fn check_permission(
        &self,
        principals: &PrincipalCollection,
        permission: &str,
    ) -> Result<(), AuthorizationError> {
        self.authorizer.check_permission(principals, permission)
    }

    pub fn check_permissions(
        &self,
        principals: &PrincipalCollection,
        permissions: &[&str],
        logical: Logical,
    ) -> Result<(), AuthorizationError> {
        self.authorizer.check_permissions(principals, permissions, logical)
    }

    pub fn has_role(&self, principals: &PrincipalCollection, role: &str) -> bool {
        self.authorizer.has_role(principals, role)
    }

    pub fn has_all_roles(&self, principals: &PrincipalCollection, roles: &[&str]) -> bool {
        self.authorizer.has_all_roles(principals, roles)
    }

    pub fn has_any_role(&self, principals: &PrincipalCollection, roles: &[&str]) -> bool {
        self.authorizer.has_any_role(principals, roles)
    }

    pub fn check_roles(
        &self,
        principals: &PrincipalCollection,
        roles: &[&str],
        logical: Logical,
    ) -> Result<(), AuthorizationError> {
        self.authorizer.check_roles(principals, roles, logical)
    }

    // =========================================================================
    // SESSIONS
    // =========================================================================

    /// Create a session, optionally tagged with the requesting host.
    pub fn create_session(&self, host: Option<&str>) -> Session {
        self.store.create(host)
    }

    /// Read a session by id, validating it first.
    pub fn get_session(&self, id: &str) -> Result<Session, SessionError> {
        self.store.get(id)
    }

    /// Refresh a session's last-access time.
    pub fn touch_session(&self, id: &str) -> Result<(), SessionError> {
        self.store.touch(id)
    }

    /// Persist changes to a still-active session.
    pub fn update_session(&self, session: Session) -> Result<(), SessionError> {
        self.store.update(session)
    }

    /// Explicitly stop a session.
    pub fn stop_session(&self, id: &str) -> Result<(), SessionError> {
        self.store.stop(id)
    }

    /// Remove a session unconditionally.
    pub fn delete_session(&self, id: &str) {
        self.store.delete(id)
    }

    pub fn active_session_count(&self) -> usize {
        self.store.active_count()
    }

    // =========================================================================
    // MAINTENANCE
    // =========================================================================

    pub fn enable_session_validation(&self) {
        self.validator.enable();
    }

    pub fn disable_session_validation(&self) {
        self.validator.disable();
    }

    /// Run a validation scan on the caller's thread. `None` if a scan is
    /// already in progress.
    pub fn validate_sessions(&self) -> Option<ScanReport> {
        self.validator.validate_now()
    }

    pub fn expired_session_count(&self) -> u64 {
        self.validator.expired_count()
    }

    /// Stop background validation and tear down every cache. The kernel
    /// is not usable afterwards; sessions and cached authorization data
    /// are gone.
    pub fn shutdown(&self) {
        self.validator.disable();
        self.cache_manager.destroy();
        self.session_cache_manager.destroy();
        tracing::info!("security kernel shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realm::MemoryRealm;
    use crate::types::StoredCredential;
    use std::time::Duration;

    fn kernel() -> SecurityKernel {
        let realm = MemoryRealm::new("users");
        realm.define_role("guest", &["printer:print"]).unwrap();
        realm.define_user("guest", StoredCredential::plain("guest"), &["guest"]);

        let config = KernelConfig {
            validation_enabled: false,
            ..KernelConfig::default()
        };
        SecurityKernel::builder(config)
            .realm(Arc::new(realm))
            .build()
            .unwrap()
    }

    #[test]
    fn test_authenticate_and_authorize() {
        let kernel = kernel();
        let account = kernel
            .authenticate(&AuthenticationToken::password("guest", "guest"))
            .unwrap();

        let principals = account.principals();
        assert!(kernel.has_role(principals, "guest"));
        assert!(kernel.is_permitted(principals, "printer:print"));
        assert!(!kernel.is_permitted(principals, "file:write"));
        assert!(kernel.check_permission(principals, "printer:print").is_ok());
        assert!(kernel.check_permission(principals, "file:write").is_err());
    }

    #[test]
    fn test_session_lifecycle_through_kernel() {
        let kernel = kernel();
        let mut session = kernel.create_session(Some("127.0.0.1"));
        session.set_attribute("k", "v");
        kernel.update_session(session.clone()).unwrap();

        let read = kernel.get_session(session.id()).unwrap();
        assert_eq!(read.attribute("k"), Some("v"));

        kernel.stop_session(session.id()).unwrap();
        assert!(matches!(
            kernel.get_session(session.id()),
            Err(SessionError::Stopped { .. })
        ));

        kernel.delete_session(session.id());
        assert!(matches!(
            kernel.get_session(session.id()),
            Err(SessionError::Unknown { .. })
        ));
    }

    #[test]
    fn test_kernel_with_caching_disabled_still_sessions() {
        let realm = MemoryRealm::new("users");
        realm.define_user("guest", StoredCredential::plain("guest"), &[]);

        let config = KernelConfig {
            caching_enabled: false,
            validation_enabled: false,
            ..KernelConfig::default()
        };
        let kernel = SecurityKernel::builder(config)
            .realm(Arc::new(realm))
            .build()
            .unwrap();

        // Sessions must work even with the shared cache manager off.
        let session = kernel.create_session(None);
        assert!(kernel.get_session(session.id()).is_ok());
        assert!(kernel
            .authenticate(&AuthenticationToken::password("guest", "guest"))
            .is_ok());
    }

    #[test]
    fn test_shutdown_disables_validation_and_caches() {
        let realm = MemoryRealm::new("users");
        let config = KernelConfig {
            validation_interval: Duration::from_millis(50),
            ..KernelConfig::default()
        };
        let kernel = SecurityKernel::builder(config)
            .realm(Arc::new(realm))
            .build()
            .unwrap();

        let session = kernel.create_session(None);
        kernel.shutdown();

        // The session cache is gone along with everything in it.
        assert!(matches!(
            kernel.get_session(session.id()),
            Err(SessionError::Unknown { .. })
        ));
    }
}
