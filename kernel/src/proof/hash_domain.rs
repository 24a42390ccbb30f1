//! Enumerated domain separators for canonical hashing.
//!
//! Every hash computed anywhere in the workspace selects its domain from this
//! list. Adding a domain means touching exactly two places: the macro
//! invocation below and the count in the lock test (`tests/lock`), which is
//! the point: new hashed surfaces are a reviewed event, not an accident.

/// Declares the `HashDomain` enum, `as_bytes()`, `ALL`, and `Display` from one list.
macro_rules! declare_domains {
    (
        $(
            $(#[$meta:meta])*
            $variant:ident => $bytes:expr
        ),+ $(,)?
    ) => {
        /// Typed domain separator for [`super::hash::canonical_hash`].
        ///
        /// Each variant maps to a unique null-terminated prefix of the form
        /// `STERLING::<NAME>::V1\0`, at most 38 bytes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum HashDomain {
            $(
                $(#[$meta])*
                $variant,
            )+
        }

        impl HashDomain {
            /// The raw domain-separator bytes (null terminator included).
            #[must_use]
            pub const fn as_bytes(self) -> &'static [u8] {
                match self {
                    $( Self::$variant => $bytes, )+
                }
            }

            /// All domain variants, in declaration order. Generated from the
            /// same macro invocation as the enum, so it cannot go stale.
            pub const ALL: &[HashDomain] = &[
                $( Self::$variant, )+
            ];
        }

        impl core::fmt::Display for HashDomain {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                match self {
                    $( Self::$variant => write!(f, stringify!($variant)), )+
                }
            }
        }
    };
}

declare_domains! {
    // -----------------------------------------------------------------------
    // Carrier
    // -----------------------------------------------------------------------

    /// `ByteStateV1` identity plane (search dedup, state identity).
    BytestateIdentity => b"STERLING::BYTESTATE_IDENTITY::V1\0",

    /// `ByteStateV1` identity + status planes (replay evidence).
    BytestateEvidence => b"STERLING::BYTESTATE_EVIDENCE::V1\0",

    /// `ByteStateSchema` canonical bundle.
    BytestateSchemaBundle => b"STERLING::BYTESTATE_SCHEMA_BUNDLE::V1\0",

    /// `ByteTraceV1` payload (magic through footer, envelope excluded).
    ByteTrace => b"STERLING::BYTETRACE::V1\0",

    /// Registry snapshot (sorted allocation list).
    RegistrySnapshot => b"STERLING::REGISTRY_SNAPSHOT::V1\0",

    /// Operator registry artifact (`operator_registry.v1`).
    OperatorRegistry => b"STERLING::OPERATOR_REGISTRY::V1\0",

    // -----------------------------------------------------------------------
    // Search
    // -----------------------------------------------------------------------

    /// Search node fingerprints (identity bytes under the node namespace).
    SearchNode => b"STERLING::SEARCH_NODE::V1\0",

    /// Search tape: header seed and every chain link.
    SearchTape => b"STERLING::SEARCH_TAPE::V1\0",

    /// Search graph canonical JSON.
    SearchGraph => b"STERLING::SEARCH_GRAPH::V1\0",

    // -----------------------------------------------------------------------
    // Evidence
    // -----------------------------------------------------------------------

    /// Bundle artifact content hashing.
    BundleArtifact => b"STERLING::BUNDLE_ARTIFACT::V1\0",

    /// Policy snapshot canonical JSON.
    PolicySnapshot => b"STERLING::POLICY_SNAPSHOT::V1\0",

    /// Episode fixture (domain payload commitment).
    Fixture => b"STERLING::FIXTURE::V1\0",
}
