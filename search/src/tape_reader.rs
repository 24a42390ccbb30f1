//! Fail-closed tape reader with chain verification.

use sterling_kernel::proof::canon::is_canonical;
use sterling_kernel::proof::hash::{raw_hash, raw_hash2};
use sterling_kernel::proof::hash_domain::HashDomain;

use crate::event::{
    TapeEventV1, TapeHeaderV1, TAPE_FOOTER_LEN, TAPE_FOOTER_MAGIC, TAPE_MAGIC, TAPE_VERSION,
};

/// Typed tape parse failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapeError {
    /// Shorter than the minimum valid tape.
    TooShort,
    /// Header magic is not `STAP`.
    BadMagic,
    /// Unknown wire version.
    UnsupportedVersion { got: u16 },
    /// Declared header length exceeds the data.
    HeaderTruncated,
    /// Header bytes are not canonical JSON or miss required fields.
    InvalidHeader { detail: String },
    /// A record frame ends past the footer boundary.
    RecordTruncated { record_index: u64 },
    /// A record payload is not canonical JSON.
    NonCanonicalPayload { record_index: u64 },
    /// A record payload does not decode to its tagged event kind.
    InvalidRecord { record_index: u64, detail: String },
    /// Footer magic is not `PATS`.
    BadFooterMagic,
    /// Footer record count disagrees with the decoded count.
    RecordCountMismatch { expected: u64, actual: u64 },
    /// Recomputed chain differs from the footer chain.
    ChainMismatch,
}

impl std::fmt::Display for TapeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for TapeError {}

/// A fully parsed and chain-verified tape.
#[derive(Debug, Clone)]
pub struct SearchTapeV1 {
    pub header: TapeHeaderV1,
    /// Raw canonical header bytes (the chain seed input).
    pub header_bytes: Vec<u8>,
    pub events: Vec<TapeEventV1>,
    pub final_chain: [u8; 32],
}

/// Parse and verify a tape: framing, canonical payloads, chain, footer.
///
/// # Errors
///
/// Returns a typed [`TapeError`]; nothing is exposed on failure.
pub fn parse_tape(data: &[u8]) -> Result<SearchTapeV1, TapeError> {
    // Minimum: magic(4) + version(2) + header_len(4) + footer.
    if data.len() < 4 + 2 + 4 + TAPE_FOOTER_LEN {
        return Err(TapeError::TooShort);
    }
    if data[..4] != TAPE_MAGIC {
        return Err(TapeError::BadMagic);
    }
    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != TAPE_VERSION {
        return Err(TapeError::UnsupportedVersion { got: version });
    }
    let header_len = u32::from_le_bytes([data[6], data[7], data[8], data[9]]) as usize;
    let header_start: usize = 10;
    let records_start = header_start
        .checked_add(header_len)
        .ok_or(TapeError::HeaderTruncated)?;
    if records_start + TAPE_FOOTER_LEN > data.len() {
        return Err(TapeError::HeaderTruncated);
    }
    let header_bytes = &data[header_start..records_start];
    if !is_canonical(header_bytes) {
        return Err(TapeError::InvalidHeader {
            detail: "header bytes are not canonical JSON".into(),
        });
    }
    let header = parse_header(header_bytes)?;

    // Footer.
    let footer_start = data.len() - TAPE_FOOTER_LEN;
    let footer = &data[footer_start..];
    if footer[40..44] != TAPE_FOOTER_MAGIC {
        return Err(TapeError::BadFooterMagic);
    }
    let declared_count = u64::from_le_bytes(
        footer[..8]
            .try_into()
            .map_err(|_| TapeError::TooShort)?,
    );
    let mut declared_chain = [0u8; 32];
    declared_chain.copy_from_slice(&footer[8..40]);

    // Records + chain.
    let mut chain = raw_hash(HashDomain::SearchTape, header_bytes);
    let mut events = Vec::new();
    let mut cursor = records_start;
    let mut record_index: u64 = 0;
    while cursor < footer_start {
        if cursor + 5 > footer_start {
            return Err(TapeError::RecordTruncated { record_index });
        }
        let tag = data[cursor];
        let payload_len = u32::from_le_bytes([
            data[cursor + 1],
            data[cursor + 2],
            data[cursor + 3],
            data[cursor + 4],
        ]) as usize;
        let payload_start = cursor + 5;
        let payload_end = payload_start
            .checked_add(payload_len)
            .ok_or(TapeError::RecordTruncated { record_index })?;
        if payload_end > footer_start {
            return Err(TapeError::RecordTruncated { record_index });
        }
        let payload = &data[payload_start..payload_end];
        if !is_canonical(payload) {
            return Err(TapeError::NonCanonicalPayload { record_index });
        }
        let value: serde_json::Value =
            serde_json::from_slice(payload).map_err(|e| TapeError::InvalidRecord {
                record_index,
                detail: format!("payload parse: {e}"),
            })?;
        let event =
            TapeEventV1::from_payload(tag, &value).map_err(|detail| TapeError::InvalidRecord {
                record_index,
                detail,
            })?;

        chain = raw_hash2(HashDomain::SearchTape, &chain, payload);
        events.push(event);
        cursor = payload_end;
        record_index += 1;
    }

    if record_index != declared_count {
        return Err(TapeError::RecordCountMismatch {
            expected: declared_count,
            actual: record_index,
        });
    }
    if chain != declared_chain {
        return Err(TapeError::ChainMismatch);
    }

    Ok(SearchTapeV1 {
        header,
        header_bytes: header_bytes.to_vec(),
        events,
        final_chain: chain,
    })
}

fn parse_header(bytes: &[u8]) -> Result<TapeHeaderV1, TapeError> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| TapeError::InvalidHeader {
            detail: format!("JSON parse: {e}"),
        })?;
    let obj = value.as_object().ok_or_else(|| TapeError::InvalidHeader {
        detail: "expected JSON object".into(),
    })?;
    let required = |key: &str| -> Result<String, TapeError> {
        obj.get(key)
            .and_then(serde_json::Value::as_str)
            .map(String::from)
            .ok_or_else(|| TapeError::InvalidHeader {
                detail: format!("missing string '{key}'"),
            })
    };
    let optional = |key: &str| -> Result<Option<String>, TapeError> {
        match obj.get(key) {
            None => Ok(None),
            Some(serde_json::Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(TapeError::InvalidHeader {
                detail: format!("'{key}' must be a string when present"),
            }),
        }
    };
    Ok(TapeHeaderV1 {
        domain_id: required("domain_id")?,
        registry_digest: required("registry_digest")?,
        operator_set_digest: required("operator_set_digest")?,
        policy_digest: required("policy_digest")?,
        scorer_digest: optional("scorer_digest")?,
        fixture_hash: required("fixture_hash")?,
        index_digest: optional("index_digest")?,
    })
}
