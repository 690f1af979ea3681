// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Credential matching.
//!
//! A [`CredentialMatcher`] decides whether the credential submitted with
//! an authentication token matches the credential a realm has on record.
//! Two implementations ship with the kernel:
//!
//! - [`PlainCredentialMatcher`] compares raw bytes directly, for realms
//!   that store credentials in the clear (test fixtures, tokens that are
//!   themselves opaque secrets).
//! - [`HashedCredentialMatcher`] recomputes a salted, iterated one-way
//!   hash of the submitted credential and compares it against the stored
//!   digest.
//!
//! All comparisons are constant-time via `subtle`. The system this kernel
//! descends from compared digests with ordinary array equality; the
//! constant-time comparison is an intentional hardening change and the
//! only place observable (timing) behavior deviates.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq;

use crate::types::{AuthenticationToken, Credential, StoredCredential};

/// Digest algorithm used by [`HashedCredentialMatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    fn digest(&self, data: &[u8], salt: Option<&[u8]>) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(data);
                if let Some(salt) = salt {
                    hasher.update(salt);
                }
                hasher.finalize().to_vec()
            }
            HashAlgorithm::Sha512 => {
                let mut hasher = Sha512::new();
                hasher.update(data);
                if let Some(salt) = salt {
                    hasher.update(salt);
                }
                hasher.finalize().to_vec()
            }
        }
    }
}

/// Hash `bytes` (optionally salted) for the given number of iterations.
///
/// The first round digests `bytes ++ salt`; each further round digests
/// the previous digest. At least one round always runs, so `iterations`
/// of 0 behaves like 1.
pub fn hash_credential(
    algorithm: HashAlgorithm,
    bytes: &[u8],
    salt: Option<&[u8]>,
    iterations: u32,
) -> Vec<u8> {
    let mut hashed = algorithm.digest(bytes, salt);
    for _ in 1..iterations.max(1) {
        hashed = algorithm.digest(&hashed, None);
    }
    hashed
}

/// Compare two byte strings in constant time.
///
/// Differing lengths compare unequal; `subtle` folds the length check
/// into the constant-time comparison.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// How a realm's stored credential text encodes the underlying bytes.
///
/// Byte-valued stored credentials always pass through raw regardless of
/// this setting; it only governs text-valued ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoredEncoding {
    /// Text is used as its UTF-8 bytes.
    Raw,
    /// Text is a hex rendering of the bytes.
    Hex,
    /// Text is a base64 rendering of the bytes.
    Base64,
}

/// Decides whether a submitted credential matches a stored one.
pub trait CredentialMatcher: Send + Sync {
    fn matches(&self, token: &AuthenticationToken, stored: &StoredCredential) -> bool;
}

// =============================================================================
// PLAIN MATCHER
// =============================================================================

/// Direct byte-for-byte comparison (constant-time) of the submitted
/// credential against the stored value.
#[derive(Debug, Default)]
pub struct PlainCredentialMatcher;

impl CredentialMatcher for PlainCredentialMatcher {
    fn matches(&self, token: &AuthenticationToken, stored: &StoredCredential) -> bool {
        constant_time_eq(token.credential().as_bytes(), stored.value.as_bytes())
    }
}

// =============================================================================
// HASHED MATCHER
// =============================================================================

/// Salted, iterated hash comparison.
///
/// The submitted credential is hashed with the account's stored salt (if
/// any) for the configured number of iterations and compared against the
/// stored digest. Stored digests may arrive raw, hex-encoded, or
/// base64-encoded; see [`StoredEncoding`].
#[derive(Debug)]
pub struct HashedCredentialMatcher {
    algorithm: HashAlgorithm,
    iterations: u32,
    stored_encoding: StoredEncoding,
}

impl HashedCredentialMatcher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            iterations: 1,
            stored_encoding: StoredEncoding::Hex,
        }
    }

    /// Number of hash rounds applied at credential-storage time. Clamped
    /// to a minimum of 1.
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations.max(1);
        self
    }

    pub fn with_stored_encoding(mut self, encoding: StoredEncoding) -> Self {
        self.stored_encoding = encoding;
        self
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    fn decode_stored(&self, stored: &StoredCredential) -> Option<Vec<u8>> {
        match (&stored.value, self.stored_encoding) {
            (Credential::Bytes(b), _) => Some(b.clone()),
            (Credential::Text(s), StoredEncoding::Raw) => Some(s.as_bytes().to_vec()),
            (Credential::Text(s), StoredEncoding::Hex) => match hex::decode(s) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    tracing::warn!(error = %e, "stored credential is not valid hex");
                    None
                }
            },
            (Credential::Text(s), StoredEncoding::Base64) => match BASE64.decode(s) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    tracing::warn!(error = %e, "stored credential is not valid base64");
                    None
                }
            },
        }
    }
}

impl CredentialMatcher for HashedCredentialMatcher {
    fn matches(&self, token: &AuthenticationToken, stored: &StoredCredential) -> bool {
        let Some(stored_digest) = self.decode_stored(stored) else {
            // An undecodable stored credential can never match; the
            // decode failure was already logged.
            return false;
        };
        let submitted_digest = hash_credential(
            self.algorithm,
            token.credential().as_bytes(),
            stored.salt.as_deref(),
            self.iterations,
        );
        constant_time_eq(&submitted_digest, &stored_digest)
    }
}
