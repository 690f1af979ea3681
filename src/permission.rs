// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Hierarchical wildcard permissions.
//!
//! A permission is an ordered list of parts separated by `:`, where each
//! part is a set of tokens separated by `,` and the token `*` means "all"
//! for that part. Examples:
//!
//! - `printer:print`: the `print` action in the `printer` domain
//! - `printer:print,query`: two actions in one grant
//! - `printer:*:lab-3`: any action on the `lab-3` printer instance
//!
//! Matching is positional: part N of a requested permission is only ever
//! compared against part N of a held permission. A held permission with
//! fewer parts than the request implies the missing trailing parts
//! implicitly (`printer:print` implies `printer:print:epsoncolor`), while
//! a held permission with *more* parts only implies a shorter request if
//! every extra part is a wildcard. Tokens are case-insensitive; strings
//! are lowercased when parsed.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::errors::PermissionError;

const WILDCARD_TOKEN: &str = "*";
const PART_DIVIDER: char = ':';
const SUBPART_DIVIDER: char = ',';

/// Whether a multi-element check requires every element or any element.
///
/// `And` short-circuits on the first failure, `Or` on the first success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logical {
    And,
    Or,
}

/// A parsed wildcard permission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardPermission {
    parts: Vec<HashSet<String>>,
}

impl WildcardPermission {
    /// Parse a permission string.
    ///
    /// Fails on empty/whitespace-only input and on any part that contains
    /// no tokens (e.g. `"a::b"` or `":,:"`). A malformed grant is a
    /// configuration error and is rejected up front rather than silently
    /// matching nothing.
    pub fn new(wildcard_string: &str) -> Result<Self, PermissionError> {
        let trimmed = wildcard_string.trim();
        if trimmed.is_empty() {
            return Err(PermissionError::Empty);
        }
        let lowered = trimmed.to_lowercase();

        let mut parts = Vec::new();
        for raw_part in lowered.split(PART_DIVIDER) {
            let tokens: HashSet<String> = raw_part
                .split(SUBPART_DIVIDER)
                .map(|token| token.trim().to_string())
                .filter(|token| !token.is_empty())
                .collect();
            if tokens.is_empty() {
                return Err(PermissionError::OnlyDividers {
                    input: wildcard_string.to_string(),
                });
            }
            parts.push(tokens);
        }

        Ok(Self { parts })
    }

    /// Construct directly from pre-split parts. Test hook for edge cases
    /// the string constructor rejects (such as an empty parts list).
    #[cfg(test)]
    pub(crate) fn from_parts(parts: Vec<HashSet<String>>) -> Self {
        Self { parts }
    }

    /// Does this (held) permission imply the requested one?
    ///
    /// Positional, left-to-right. A held part matches a requested part
    /// when it contains the wildcard token or shares at least one token
    /// with it. A held permission with zero parts implies nothing.
    pub fn implies(&self, requested: &WildcardPermission) -> bool {
        if self.parts.is_empty() {
            return false;
        }

        let mut i = 0;
        for requested_part in &requested.parts {
            // Fewer held parts than requested: everything after the held
            // length is implicitly wildcarded, and all earlier parts have
            // already matched or we would have returned.
            if i >= self.parts.len() {
                return true;
            }
            let held_part = &self.parts[i];
            if !held_part.contains(WILDCARD_TOKEN) && held_part.is_disjoint(requested_part) {
                return false;
            }
            i += 1;
        }

        // More held parts than requested: a more specific grant only
        // implies the shorter request if every trailing part is a
        // wildcard.
        self.parts[i..].iter().all(|part| part.contains(WILDCARD_TOKEN))
    }

    /// Number of parts.
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }
}

impl FromStr for WildcardPermission {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for WildcardPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(f, "{PART_DIVIDER}")?;
            }
            // Tokens are stored in a set; sort for a stable rendering.
            let mut tokens: Vec<&str> = part.iter().map(String::as_str).collect();
            tokens.sort_unstable();
            write!(f, "{}", tokens.join(","))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perm(s: &str) -> WildcardPermission {
        WildcardPermission::new(s).expect("valid permission")
    }

    #[test]
    fn test_reflexivity() {
        for s in ["one", "one:two", "a,b:c,d", "*", "printer:*:epsoncolor"] {
            let p = perm(s);
            assert!(p.implies(&p), "{s} should imply itself");
        }
    }

    #[test]
    fn test_multi_token_part_implies_single() {
        assert!(perm("printer:print,query").implies(&perm("printer:print")));
        assert!(perm("printer:print,query").implies(&perm("printer:query")));
        assert!(!perm("printer:print,query").implies(&perm("printer:manage")));
    }

    #[test]
    fn test_shared_token_is_sufficient() {
        // A single shared token matches the part; the request may carry
        // additional tokens without being rejected.
        assert!(perm("printer:print").implies(&perm("printer:print,query")));
    }

    #[test]
    fn test_wildcard_part_matches_anything() {
        assert!(perm("printer:*").implies(&perm("printer:print:epsoncolor")));
        assert!(perm("*:view").implies(&perm("newsletter:view")));
        assert!(perm("*").implies(&perm("anything")));
        assert!(perm("*").implies(&perm("anything:at:all")));
    }

    #[test]
    fn test_trailing_implicit_wildcard() {
        // Held shorter than requested: missing trailing parts are implied.
        assert!(perm("printer:print").implies(&perm("printer:print:epsoncolor")));
        assert!(perm("printer").implies(&perm("printer:print:epsoncolor")));
    }

    #[test]
    fn test_more_specific_does_not_imply_shorter() {
        assert!(!perm("printer:print:epsoncolor").implies(&perm("printer:print")));
        // Unless the trailing parts are wildcards.
        assert!(perm("printer:print:*").implies(&perm("printer:print")));
        assert!(perm("printer:*:*").implies(&perm("printer")));
        assert!(!perm("printer:*:epsoncolor").implies(&perm("printer")));
    }

    #[test]
    fn test_case_insensitive() {
        assert!(perm("PRINTER:Print").implies(&perm("printer:print")));
        assert!(perm("printer:print").implies(&perm("PRINTER:PRINT")));
    }

    #[test]
    fn test_disjoint_parts_do_not_imply() {
        assert!(!perm("printer:print").implies(&perm("printer:query")));
        assert!(!perm("printer:print").implies(&perm("scanner:print")));
    }

    #[test]
    fn test_empty_held_implies_nothing() {
        let empty = WildcardPermission::from_parts(Vec::new());
        assert!(!empty.implies(&perm("anything")));
        assert!(!empty.implies(&empty));
    }

    #[test]
    fn test_empty_requested_parts() {
        let empty = WildcardPermission::from_parts(Vec::new());
        // Only an all-wildcard held permission implies a zero-part request.
        assert!(perm("*").implies(&empty));
        assert!(perm("*:*").implies(&empty));
        assert!(!perm("printer").implies(&empty));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            WildcardPermission::new(""),
            Err(PermissionError::Empty)
        ));
        assert!(matches!(
            WildcardPermission::new("   "),
            Err(PermissionError::Empty)
        ));
        assert!(matches!(
            WildcardPermission::new(":::"),
            Err(PermissionError::OnlyDividers { .. })
        ));
        assert!(matches!(
            WildcardPermission::new("a::b"),
            Err(PermissionError::OnlyDividers { .. })
        ));
    }

    #[test]
    fn test_display_roundtrip() {
        let p = perm("printer:print,query:lab-3");
        let rendered = p.to_string();
        let reparsed = perm(&rendered);
        assert_eq!(p, reparsed);
    }

    #[test]
    fn test_from_str() {
        let p: WildcardPermission = "printer:print".parse().unwrap();
        assert_eq!(p.part_count(), 2);
    }
}
