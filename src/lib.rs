// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! warden - embeddable security kernel
//!
//! Authentication, authorization, and session management behind one
//! small, explicit API. No transport, no container, no global state:
//! your application submits tokens, asks permission questions, and
//! manages sessions; warden answers.
//!
//! # Core Modules
//!
//! - [`kernel`] - the assembled [`SecurityKernel`] facade
//! - [`auth`] - multi-realm authentication with pluggable aggregation
//! - [`authz`] - role checks and wildcard permission evaluation
//! - [`session`] - session lifecycle, storage, and background validation
//! - [`realm`] - the credential-source SPI and the in-memory realm
//! - [`credential`] - salted/iterated hash credential matching
//! - [`permission`] - the wildcard permission representation
//! - [`cache`] - named caches backing sessions and authorization lookups
//! - [`errors`] - the typed failure taxonomy
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use warden::{
//!     AuthenticationToken, KernelConfig, MemoryRealm, SecurityKernel, StoredCredential,
//! };
//!
//! let realm = MemoryRealm::new("users");
//! realm.define_role("guest", &["lobby:enter"]).unwrap();
//! realm.define_user("guest", StoredCredential::plain("guest"), &["guest"]);
//!
//! let kernel = SecurityKernel::builder(KernelConfig {
//!     validation_enabled: false,
//!     ..KernelConfig::default()
//! })
//! .realm(Arc::new(realm))
//! .build()
//! .unwrap();
//!
//! let account = kernel
//!     .authenticate(&AuthenticationToken::password("guest", "guest"))
//!     .unwrap();
//! assert!(kernel.has_role(account.principals(), "guest"));
//! assert!(kernel.is_permitted(account.principals(), "lobby:enter"));
//! ```

pub mod auth;
pub mod authz;
pub mod cache;
pub mod config;
pub mod credential;
pub mod errors;
pub mod kernel;
pub mod locks;
pub mod permission;
pub mod realm;
pub mod session;
pub mod types;

// Re-export the kernel facade and its configuration
pub use config::KernelConfig;
pub use kernel::{KernelBuilder, SecurityKernel};

// Re-export authentication types
pub use auth::{AuthenticationListener, Authenticator, Strategy};
pub use types::{
    Account, AuthenticationToken, Credential, PrincipalCollection, StoredCredential,
    PASSWORD_TOKEN_KIND,
};

// Re-export authorization types
pub use authz::Authorizer;
pub use permission::{Logical, WildcardPermission};
pub use types::AuthorizationRecord;

// Re-export realm SPI
pub use realm::{memory::RoleDefinition, memory::UserDefinition, MemoryRealm, Realm};

// Re-export credential matching
pub use credential::{
    constant_time_eq, hash_credential, CredentialMatcher, HashAlgorithm,
    HashedCredentialMatcher, PlainCredentialMatcher, StoredEncoding,
};

// Re-export session types
pub use session::{
    ScanReport, Session, SessionListener, SessionStore, SessionValidator,
    DEFAULT_SESSION_TIMEOUT,
};

// Re-export cache types
pub use cache::{Cache, CacheManager, MemoryCache, NoopCache};

// Re-export the error taxonomy
pub use errors::{
    AuthenticationError, AuthorizationError, CacheError, KernelError, PermissionError,
    SessionError,
};
