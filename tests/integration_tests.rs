// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Integration tests for the assembled security kernel.
//!
//! These walk the full flow an embedding application would: define a
//! realm, authenticate, ask authorization questions, and drive a session
//! through its lifecycle.

use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use warden::{
    AuthenticationError, AuthenticationToken, KernelConfig, Logical, MemoryRealm,
    PrincipalCollection, SecurityKernel, SessionError, StoredCredential, Strategy,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn guest_kernel() -> SecurityKernel {
    init_tracing();
    let realm = MemoryRealm::new("users");
    realm.define_role("guest", &["printer:print,query"]).unwrap();
    realm.define_user("guest", StoredCredential::plain("guest"), &["guest"]);

    SecurityKernel::builder(KernelConfig {
        validation_enabled: false,
        ..KernelConfig::default()
    })
    .realm(Arc::new(realm))
    .build()
    .expect("kernel builds")
}

// =============================================================================
// End-to-End Scenario
// =============================================================================

#[test]
fn test_guest_end_to_end() {
    let kernel = guest_kernel();

    // Authenticate with the guest/guest token.
    let account = kernel
        .authenticate(&AuthenticationToken::password("guest", "guest"))
        .expect("guest authenticates");
    let principals = account.principals().clone();
    assert_eq!(principals.primary(), Some("guest"));

    // Role and permission checks.
    assert!(kernel.has_role(&principals, "guest"));
    assert!(!kernel.has_role(&principals, "admin"));
    assert!(kernel.is_permitted(&principals, "printer:print"));
    assert!(!kernel.is_permitted(&principals, "file:write"));

    // Session: create, set an attribute, read it back.
    let mut session = kernel.create_session(Some("192.0.2.10"));
    session.set_attribute("k", "v");
    kernel.update_session(session.clone()).expect("update works");
    let read = kernel.get_session(session.id()).expect("session readable");
    assert_eq!(read.attribute("k"), Some("v"));
    assert_eq!(read.host(), Some("192.0.2.10"));

    // Shrink the timeout, idle past it, and the next read reports
    // expiry instead of returning a stale session.
    let mut short_lived = kernel.get_session(session.id()).unwrap();
    short_lived.set_timeout(Some(Duration::from_millis(1)));
    kernel.update_session(short_lived).unwrap();
    sleep(Duration::from_millis(30));
    assert!(matches!(
        kernel.get_session(session.id()),
        Err(SessionError::Expired { .. })
    ));

    // A replacement session gets a fresh id; the old one is not reused.
    let replacement = kernel.create_session(None);
    assert_ne!(replacement.id(), session.id());
}

#[test]
fn test_wrong_password_is_mismatch() {
    let kernel = guest_kernel();
    let err = kernel
        .authenticate(&AuthenticationToken::password("guest", "wrong"))
        .unwrap_err();
    assert!(matches!(err, AuthenticationError::CredentialMismatch { .. }));
}

#[test]
fn test_unknown_user_is_unknown_account() {
    let kernel = guest_kernel();
    let err = kernel
        .authenticate(&AuthenticationToken::password("stranger", "guest"))
        .unwrap_err();
    assert!(matches!(err, AuthenticationError::UnknownAccount { .. }));
}

// =============================================================================
// Aggregation Strategies
// =============================================================================

fn two_realm_kernel(strategy: Strategy) -> SecurityKernel {
    // Realm A matches the guest password, realm B holds a different one.
    let realm_a = MemoryRealm::new("realm-a");
    realm_a.define_user("guest", StoredCredential::plain("guest"), &[]);
    let realm_b = MemoryRealm::new("realm-b");
    realm_b.define_user("guest", StoredCredential::plain("different"), &[]);

    SecurityKernel::builder(KernelConfig {
        strategy,
        validation_enabled: false,
        ..KernelConfig::default()
    })
    .realm(Arc::new(realm_a))
    .realm(Arc::new(realm_b))
    .build()
    .expect("kernel builds")
}

#[test]
fn test_first_success_succeeds_where_all_success_fails() {
    let token = AuthenticationToken::password("guest", "guest");

    let first = two_realm_kernel(Strategy::FirstSuccess);
    assert!(first.authenticate(&token).is_ok());

    let all = two_realm_kernel(Strategy::AllSuccess);
    assert!(matches!(
        all.authenticate(&token).unwrap_err(),
        AuthenticationError::CredentialMismatch { .. }
    ));
}

// =============================================================================
// Authorization Combinators
// =============================================================================

#[test]
fn test_role_combinators_through_kernel() {
    let realm = MemoryRealm::new("users");
    realm.define_user(
        "carol",
        StoredCredential::plain("x"),
        &["editor", "reviewer"],
    );
    let kernel = SecurityKernel::builder(KernelConfig {
        validation_enabled: false,
        ..KernelConfig::default()
    })
    .realm(Arc::new(realm))
    .build()
    .unwrap();

    let carol = PrincipalCollection::single("users", "carol");
    assert!(kernel.has_all_roles(&carol, &["editor", "reviewer"]));
    assert!(kernel.has_any_role(&carol, &["admin", "editor"]));
    assert!(kernel.check_roles(&carol, &["editor", "reviewer"], Logical::And).is_ok());
    assert!(kernel.check_roles(&carol, &["admin", "editor"], Logical::Or).is_ok());
    assert!(kernel.check_roles(&carol, &["admin", "editor"], Logical::And).is_err());
    assert!(kernel.check_roles(&carol, &["admin", "root"], Logical::Or).is_err());
}

// =============================================================================
// Background Validation
// =============================================================================

#[test]
fn test_background_validator_reaps_and_notifies_counts() {
    init_tracing();
    let realm = MemoryRealm::new("users");
    let kernel = SecurityKernel::builder(KernelConfig {
        validation_interval: Duration::from_millis(30),
        session_timeout: Some(Duration::from_millis(10)),
        ..KernelConfig::default()
    })
    .realm(Arc::new(realm))
    .build()
    .unwrap();

    let doomed = kernel.create_session(None);
    sleep(Duration::from_millis(200));

    assert!(kernel.expired_session_count() >= 1);
    assert_eq!(kernel.active_session_count(), 0);
    assert!(matches!(
        kernel.get_session(doomed.id()),
        Err(SessionError::Expired { .. })
    ));

    kernel.shutdown();
}

// =============================================================================
// Hashed Credentials End-to-End
// =============================================================================

#[test]
fn test_hashed_realm_end_to_end() {
    use warden::{hash_credential, HashAlgorithm, HashedCredentialMatcher};

    let digest = hash_credential(HashAlgorithm::Sha256, b"s3cret", Some(b"salt"), 1024);
    let realm = MemoryRealm::new("users").with_matcher(Box::new(
        HashedCredentialMatcher::new(HashAlgorithm::Sha256).with_iterations(1024),
    ));
    realm.define_user(
        "alice",
        StoredCredential::salted(hex::encode(digest), b"salt".to_vec()),
        &[],
    );

    let kernel = SecurityKernel::builder(KernelConfig {
        validation_enabled: false,
        ..KernelConfig::default()
    })
    .realm(Arc::new(realm))
    .build()
    .unwrap();

    assert!(kernel
        .authenticate(&AuthenticationToken::password("alice", "s3cret"))
        .is_ok());
    assert!(matches!(
        kernel
            .authenticate(&AuthenticationToken::password("alice", "s3cret!"))
            .unwrap_err(),
        AuthenticationError::CredentialMismatch { .. }
    ));
}
