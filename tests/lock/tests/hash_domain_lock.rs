//! Lock on the hash-domain registry: adding, removing, or editing a domain
//! separator must fail here until this list is deliberately updated.

use sha2::{Digest, Sha256};
use sterling_kernel::proof::hash::{
    canonical_hash, domain_for_prefix, validate_domain_registry, HashInputError,
};
use sterling_kernel::proof::hash_domain::HashDomain;

/// The full, ordered separator list. Byte-for-byte.
const LOCKED_PREFIXES: [&[u8]; 12] = [
    b"STERLING::BYTESTATE_IDENTITY::V1\0",
    b"STERLING::BYTESTATE_EVIDENCE::V1\0",
    b"STERLING::BYTESTATE_SCHEMA_BUNDLE::V1\0",
    b"STERLING::BYTETRACE::V1\0",
    b"STERLING::REGISTRY_SNAPSHOT::V1\0",
    b"STERLING::OPERATOR_REGISTRY::V1\0",
    b"STERLING::SEARCH_NODE::V1\0",
    b"STERLING::SEARCH_TAPE::V1\0",
    b"STERLING::SEARCH_GRAPH::V1\0",
    b"STERLING::BUNDLE_ARTIFACT::V1\0",
    b"STERLING::POLICY_SNAPSHOT::V1\0",
    b"STERLING::FIXTURE::V1\0",
];

#[test]
fn domain_list_is_locked() {
    assert_eq!(
        HashDomain::ALL.len(),
        LOCKED_PREFIXES.len(),
        "domain count changed; update the lock deliberately"
    );
    for (domain, locked) in HashDomain::ALL.iter().zip(LOCKED_PREFIXES) {
        assert_eq!(
            domain.as_bytes(),
            locked,
            "separator for {domain} drifted from the locked bytes"
        );
    }
}

#[test]
fn registry_self_validates() {
    validate_domain_registry().unwrap();
}

#[test]
fn every_locked_prefix_resolves() {
    for locked in LOCKED_PREFIXES {
        domain_for_prefix(locked).unwrap();
    }
}

#[test]
fn unlocked_prefix_is_a_typed_error() {
    let err = domain_for_prefix(b"STERLING::SOMETHING_NEW::V1\0").unwrap_err();
    assert!(matches!(err, HashInputError::UnknownPrefix { .. }));
}

#[test]
fn canonical_hash_matches_direct_sha256() {
    // The wrapper must be exactly sha256(prefix || data), nothing more.
    for domain in HashDomain::ALL {
        let data = b"lock-vector";
        let mut hasher = Sha256::new();
        hasher.update(domain.as_bytes());
        hasher.update(data);
        let expected = hex::encode(hasher.finalize());
        assert_eq!(canonical_hash(*domain, data).hex_digest(), expected);
    }
}

#[test]
fn output_format_is_sha256_prefixed_hex() {
    let hash = canonical_hash(HashDomain::ByteTrace, b"");
    assert!(hash.as_str().starts_with("sha256:"));
    assert_eq!(hash.as_str().len(), "sha256:".len() + 64);
}
