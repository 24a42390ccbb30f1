//! Canonical hashing: one SHA-256 wrapper, domain separation mandatory.
//!
//! Output format is always `"sha256:<64 lowercase hex>"`. Raw-byte variants
//! exist for the tape hash chain, where 32-byte links are concatenated
//! directly into the next hash input.

use sha2::{Digest, Sha256};

use crate::proof::canon::is_canonical;
use crate::proof::hash_domain::HashDomain;

/// A content-addressed hash with algorithm identifier.
///
/// Invariant: the inner string is `"<algorithm>:<hex>"` with a lowercase
/// alphanumeric algorithm and non-empty lowercase-hex digest, enforced by
/// [`ContentHash::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash {
    full: String,
    colon: usize,
}

impl ContentHash {
    /// Parse from `"algorithm:hex_digest"` form.
    ///
    /// Returns `None` unless there is exactly one `:`, the algorithm is
    /// non-empty lowercase alphanumeric, and the digest is non-empty
    /// lowercase hex.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let colon = s.find(':')?;
        if s[colon + 1..].contains(':') {
            return None;
        }
        let (algorithm, digest) = (&s[..colon], &s[colon + 1..]);
        if algorithm.is_empty()
            || !algorithm
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        {
            return None;
        }
        if digest.is_empty()
            || !digest
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return None;
        }
        Some(Self {
            full: s.to_string(),
            colon,
        })
    }

    /// The algorithm portion (always `"sha256"` for kernel-produced hashes).
    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.full[..self.colon]
    }

    /// The hex digest portion.
    #[must_use]
    pub fn hex_digest(&self) -> &str {
        &self.full[self.colon + 1..]
    }

    /// The full `"algorithm:hex"` string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.full
    }

    /// Raw 32-byte digest, if this is a full-length SHA-256 hash.
    #[must_use]
    pub fn to_raw_sha256(&self) -> Option<[u8; 32]> {
        if self.algorithm() != "sha256" {
            return None;
        }
        let mut out = [0u8; 32];
        hex::decode_to_slice(self.hex_digest(), &mut out).ok()?;
        Some(out)
    }

    /// Build a `ContentHash` from a raw SHA-256 digest.
    #[must_use]
    pub fn from_raw_sha256(raw: &[u8; 32]) -> Self {
        Self {
            full: format!("sha256:{}", hex::encode(raw)),
            colon: 6,
        }
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full)
    }
}

/// Typed failure for hash-input validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashInputError {
    /// A raw prefix was supplied that is not in the [`HashDomain`] registry.
    UnknownPrefix { prefix_hex: String },
    /// Two registry entries share the same prefix bytes (registry defect).
    DuplicatePrefix { prefix_hex: String },
    /// JSON bytes offered for hashing were not in canonical form.
    NonCanonicalInput { detail: String },
}

impl std::fmt::Display for HashInputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownPrefix { prefix_hex } => {
                write!(f, "unknown hash domain prefix: {prefix_hex}")
            }
            Self::DuplicatePrefix { prefix_hex } => {
                write!(f, "duplicated hash domain prefix: {prefix_hex}")
            }
            Self::NonCanonicalInput { detail } => {
                write!(f, "non-canonical hash input: {detail}")
            }
        }
    }
}

impl std::error::Error for HashInputError {}

/// Compute `sha256(domain_prefix || data)` as a [`ContentHash`].
#[must_use]
pub fn canonical_hash(domain: HashDomain, data: &[u8]) -> ContentHash {
    ContentHash::from_raw_sha256(&raw_hash(domain, data))
}

/// Compute `sha256(domain_prefix || data)` as raw 32 bytes.
///
/// Used where digests feed back into further hashing (tape chain links).
#[must_use]
pub fn raw_hash(domain: HashDomain, data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(domain.as_bytes());
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute `sha256(domain_prefix || a || b)` as raw 32 bytes.
///
/// The tape chain formula `c_i = H(domain, c_{i-1} || event_i)` uses this to
/// avoid concatenating into a scratch buffer per event.
#[must_use]
pub fn raw_hash2(domain: HashDomain, a: &[u8], b: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(domain.as_bytes());
    hasher.update(a);
    hasher.update(b);
    hasher.finalize().into()
}

/// Hash with a caller-supplied raw prefix, validated against the registry.
///
/// External callers that carry prefixes as bytes (bundle reports record the
/// prefix string per artifact) go through this gate; an unlisted prefix is a
/// typed failure, never a silently-new hash surface.
///
/// # Errors
///
/// Returns [`HashInputError::UnknownPrefix`] if `prefix` is not one of the
/// enumerated [`HashDomain`] byte strings.
pub fn hash_with_prefix(prefix: &[u8], data: &[u8]) -> Result<ContentHash, HashInputError> {
    let domain = domain_for_prefix(prefix)?;
    Ok(canonical_hash(domain, data))
}

/// Resolve a raw prefix back to its [`HashDomain`].
///
/// # Errors
///
/// Returns [`HashInputError::UnknownPrefix`] for unlisted prefixes.
pub fn domain_for_prefix(prefix: &[u8]) -> Result<HashDomain, HashInputError> {
    HashDomain::ALL
        .iter()
        .copied()
        .find(|d| d.as_bytes() == prefix)
        .ok_or_else(|| HashInputError::UnknownPrefix {
            prefix_hex: hex::encode(prefix),
        })
}

/// Hash canonical JSON bytes, rejecting non-canonical input.
///
/// The hashed JSON surfaces (headers, snapshots, reports) must be produced by
/// `proof::canon`; this gate makes "hash of the bytes" and "hash of the
/// canonicalized semantics" the same claim.
///
/// # Errors
///
/// Returns [`HashInputError::NonCanonicalInput`] if `json_bytes` are not in
/// canonical form.
pub fn hash_canonical_json(
    domain: HashDomain,
    json_bytes: &[u8],
) -> Result<ContentHash, HashInputError> {
    if !is_canonical(json_bytes) {
        return Err(HashInputError::NonCanonicalInput {
            detail: format!("{domain}: bytes are not canonical JSON"),
        });
    }
    Ok(canonical_hash(domain, json_bytes))
}

/// Validate the domain registry itself: no duplicate prefixes.
///
/// # Errors
///
/// Returns [`HashInputError::DuplicatePrefix`] naming the first collision.
pub fn validate_domain_registry() -> Result<(), HashInputError> {
    let mut seen = std::collections::BTreeSet::new();
    for domain in HashDomain::ALL {
        if !seen.insert(domain.as_bytes()) {
            return Err(HashInputError::DuplicatePrefix {
                prefix_hex: hex::encode(domain.as_bytes()),
            });
        }
    }
    Ok(())
}
