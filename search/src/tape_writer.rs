//! Chain-hashed tape writer.
//!
//! # Wire format
//!
//! ```text
//! [magic:4 "STAP"][version:u16le][header_len:u32le][header: canonical JSON]
//! [record_0][record_1]...
//! [footer: record_count:u64le | final_chain:32 | magic:4 "PATS"]
//! ```
//!
//! Records frame as `[tag:u8][payload_len:u32le][payload: canonical JSON]`.
//!
//! # Chain
//!
//! ```text
//! c_{-1} = H(SEARCH_TAPE, header_bytes)
//! c_i    = H(SEARCH_TAPE, c_{i-1} || payload_i)
//! ```
//!
//! One domain for seed and links; the 32-byte previous link is prepended raw.

use sterling_kernel::proof::hash::{raw_hash, raw_hash2};
use sterling_kernel::proof::hash_domain::HashDomain;

use crate::error::SearchError;
use crate::event::{TapeEventV1, TapeHeaderV1, TAPE_FOOTER_MAGIC, TAPE_MAGIC, TAPE_VERSION};

/// Output of a finished tape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapeOutput {
    /// Complete tape bytes, magic through footer.
    pub bytes: Vec<u8>,
    /// Final chain link (also stored in the footer).
    pub final_chain: [u8; 32],
    /// Number of records written.
    pub record_count: u64,
}

/// Append-only tape writer. Events are hashed into the chain as they are
/// appended; `finish()` seals the footer.
#[derive(Debug)]
pub struct TapeWriter {
    buf: Vec<u8>,
    chain: [u8; 32],
    record_count: u64,
    finished: bool,
}

impl TapeWriter {
    /// Start a tape: serializes the header and seeds the chain.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::TapeFailure`] if the header cannot serialize or
    /// exceeds u32 framing.
    pub fn new(header: &TapeHeaderV1) -> Result<Self, SearchError> {
        let header_bytes = header
            .canonical_bytes()
            .map_err(|e| SearchError::TapeFailure {
                detail: format!("header: {e}"),
            })?;
        let header_len =
            u32::try_from(header_bytes.len()).map_err(|_| SearchError::TapeFailure {
                detail: "header exceeds u32 framing".into(),
            })?;

        let mut buf = Vec::with_capacity(4 + 2 + 4 + header_bytes.len());
        buf.extend_from_slice(&TAPE_MAGIC);
        buf.extend_from_slice(&TAPE_VERSION.to_le_bytes());
        buf.extend_from_slice(&header_len.to_le_bytes());
        buf.extend_from_slice(&header_bytes);

        Ok(Self {
            buf,
            chain: raw_hash(HashDomain::SearchTape, &header_bytes),
            record_count: 0,
            finished: false,
        })
    }

    /// Current chain link.
    #[must_use]
    pub fn chain(&self) -> [u8; 32] {
        self.chain
    }

    /// Records written so far.
    #[must_use]
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Append one event: frames it and advances the chain.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::TapeFailure`] after `finish()`, on payload
    /// serialization failure, or if a payload exceeds u32 framing.
    pub fn append(&mut self, event: &TapeEventV1) -> Result<(), SearchError> {
        if self.finished {
            return Err(SearchError::TapeFailure {
                detail: "append after finish".into(),
            });
        }
        let payload = event.payload().map_err(|e| SearchError::TapeFailure {
            detail: format!("{}: {e}", event.kind_str()),
        })?;
        let payload_len =
            u32::try_from(payload.len()).map_err(|_| SearchError::TapeFailure {
                detail: format!("{} payload exceeds u32 framing", event.kind_str()),
            })?;

        self.buf.push(event.tag());
        self.buf.extend_from_slice(&payload_len.to_le_bytes());
        self.buf.extend_from_slice(&payload);
        self.chain = raw_hash2(HashDomain::SearchTape, &self.chain, &payload);
        self.record_count += 1;
        Ok(())
    }

    /// Seal the footer and return the complete tape.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::TapeFailure`] on a second call.
    pub fn finish(mut self) -> Result<TapeOutput, SearchError> {
        if self.finished {
            return Err(SearchError::TapeFailure {
                detail: "finish called twice".into(),
            });
        }
        self.finished = true;
        self.buf.extend_from_slice(&self.record_count.to_le_bytes());
        self.buf.extend_from_slice(&self.chain);
        self.buf.extend_from_slice(&TAPE_FOOTER_MAGIC);
        Ok(TapeOutput {
            bytes: self.buf,
            final_chain: self.chain,
            record_count: self.record_count,
        })
    }
}
