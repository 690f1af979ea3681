// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Multi-realm authentication engine.
//!
//! The [`Authenticator`] walks an ordered list of realms for each
//! submitted token. Realms that do not recognize the token kind are
//! skipped. For the rest, the configured [`Strategy`] decides how
//! per-realm outcomes combine into one result:
//!
//! - [`Strategy::FirstSuccess`]: the first realm whose stored credential
//!   matches wins; remaining realms are not consulted.
//! - [`Strategy::AllSuccess`]: every applicable realm must hold a
//!   matching account; the principal sets of all of them are merged into
//!   one authenticated identity.
//!
//! Registered listeners are told about every success and failure. A
//! listener error is logged and swallowed; it can never change the
//! authentication result.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::AuthenticationError;
use crate::realm::Realm;
use crate::types::{Account, AuthenticationToken};

/// How per-realm outcomes aggregate into one authentication result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Succeed as soon as one applicable realm matches.
    #[default]
    FirstSuccess,
    /// Require every applicable realm to match; merge their claims.
    AllSuccess,
}

/// Observer of authentication outcomes.
///
/// Implementations may fail; failures are logged at the notification
/// site and never surface to the caller.
pub trait AuthenticationListener: Send + Sync {
    fn on_success(&self, account: &Account) -> anyhow::Result<()> {
        let _ = account;
        Ok(())
    }

    fn on_failure(
        &self,
        token: &AuthenticationToken,
        error: &AuthenticationError,
    ) -> anyhow::Result<()> {
        let _ = (token, error);
        Ok(())
    }
}

/// Orchestrates realms, credential matching, and listener notification.
pub struct Authenticator {
    realms: Vec<Arc<dyn Realm>>,
    strategy: Strategy,
    listeners: Vec<Box<dyn AuthenticationListener>>,
}

impl Authenticator {
    pub fn new(realms: Vec<Arc<dyn Realm>>, strategy: Strategy) -> Self {
        Self {
            realms,
            strategy,
            listeners: Vec::new(),
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn AuthenticationListener>) {
        self.listeners.push(listener);
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Authenticate a submitted token.
    ///
    /// On failure the error identifies the failure class: no applicable
    /// realm, unknown account, credential mismatch, or a realm backend
    /// error. When several realms fail differently, a credential
    /// mismatch is reported over a backend error, which is reported over
    /// an unknown account. The most specific evidence wins.
    pub fn authenticate(
        &self,
        token: &AuthenticationToken,
    ) -> Result<Account, AuthenticationError> {
        let result = self.attempt(token);
        match &result {
            Ok(account) => {
                tracing::info!(
                    "AUTHC_SUCCESS | principal={} realms={}",
                    token.principal(),
                    account.principals().realm_names().collect::<Vec<_>>().join(",")
                );
                for listener in &self.listeners {
                    if let Err(e) = listener.on_success(account) {
                        tracing::warn!(error = %e, "authentication success listener failed");
                    }
                }
            }
            Err(error) => {
                tracing::info!(
                    "AUTHC_FAILURE | principal={} reason={}",
                    token.principal(),
                    error
                );
                for listener in &self.listeners {
                    if let Err(e) = listener.on_failure(token, error) {
                        tracing::warn!(error = %e, "authentication failure listener failed");
                    }
                }
            }
        }
        result
    }

    fn attempt(&self, token: &AuthenticationToken) -> Result<Account, AuthenticationError> {
        let applicable: Vec<&Arc<dyn Realm>> =
            self.realms.iter().filter(|r| r.supports(token)).collect();
        if applicable.is_empty() {
            return Err(AuthenticationError::NoApplicableSource {
                kind: token.kind().to_string(),
            });
        }

        match self.strategy {
            Strategy::FirstSuccess => self.first_success(token, &applicable),
            Strategy::AllSuccess => self.all_success(token, &applicable),
        }
    }

    fn first_success(
        &self,
        token: &AuthenticationToken,
        realms: &[&Arc<dyn Realm>],
    ) -> Result<Account, AuthenticationError> {
        let mut mismatch = false;
        let mut source_error: Option<AuthenticationError> = None;

        for realm in realms {
            match realm.account(token) {
                Ok(Some(account)) => {
                    let Some(stored) = account.credential_from(realm.name()) else {
                        continue;
                    };
                    if realm.credential_matcher().matches(token, stored) {
                        return Ok(account);
                    }
                    tracing::debug!(
                        realm = realm.name(),
                        principal = token.principal(),
                        "credential mismatch, trying next realm"
                    );
                    mismatch = true;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        realm = realm.name(),
                        principal = token.principal(),
                        error = %e,
                        "realm failed during authentication, trying next realm"
                    );
                    source_error.get_or_insert(AuthenticationError::SourceUnavailable {
                        realm: realm.name().to_string(),
                        source: e,
                    });
                }
            }
        }

        if mismatch {
            Err(AuthenticationError::CredentialMismatch {
                principal: token.principal().to_string(),
            })
        } else if let Some(error) = source_error {
            Err(error)
        } else {
            Err(AuthenticationError::UnknownAccount {
                principal: token.principal().to_string(),
            })
        }
    }

    fn all_success(
        &self,
        token: &AuthenticationToken,
        realms: &[&Arc<dyn Realm>],
    ) -> Result<Account, AuthenticationError> {
        let mut merged: Option<Account> = None;

        for realm in realms {
            let account = match realm.account(token) {
                Ok(Some(account)) => account,
                Ok(None) => {
                    return Err(AuthenticationError::UnknownAccount {
                        principal: token.principal().to_string(),
                    });
                }
                Err(e) => {
                    return Err(AuthenticationError::SourceUnavailable {
                        realm: realm.name().to_string(),
                        source: e,
                    });
                }
            };

            let Some(stored) = account.credential_from(realm.name()) else {
                return Err(AuthenticationError::UnknownAccount {
                    principal: token.principal().to_string(),
                });
            };
            if !realm.credential_matcher().matches(token, stored) {
                return Err(AuthenticationError::CredentialMismatch {
                    principal: token.principal().to_string(),
                });
            }

            match &mut merged {
                Some(aggregate) => aggregate.merge(&account),
                None => merged = Some(account),
            }
        }

        // `realms` is non-empty (checked by the caller), so merged is set.
        merged.ok_or(AuthenticationError::NoApplicableSource {
            kind: token.kind().to_string(),
        })
    }
}
