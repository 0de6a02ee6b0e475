//! Ledger fingerprinting
//!
//! Every fingerprint is SHA-256 over an ordered list of string parts, each
//! encoded as `U32_BE(len) || UTF8_bytes` so that part boundaries cannot be
//! shifted to produce the same preimage. The output is lowercase hex.
//!
//! ```text
//! statement_fingerprint = SHA256(b"LEDGER_STATEMENT_V1" ||
//!                                ENC_STR(statement) ||
//!                                ENC_STR(speaker) ||
//!                                ENC_STR(source_url or ""))
//!
//! block_fingerprint = SHA256(b"LEDGER_BLOCK_V1" ||
//!                            ENC_STR(statement_fingerprint) ||
//!                            ENC_STR(previous_hash) ||
//!                            ENC_STR(append_timestamp_millis))
//! ```
//!
//! The digest has no seed or machine-dependent input, so identical parts
//! produce identical fingerprints across processes and restarts.

use sha2::{Digest, Sha256};

/// Placeholder `previous_hash` of the first entry in the chain.
pub const GENESIS_HASH: &str = "0";

/// Domain prefix for statement content fingerprints
pub const DOMAIN_STATEMENT: &[u8] = b"LEDGER_STATEMENT_V1";

/// Domain prefix for block (chain position) fingerprints
pub const DOMAIN_BLOCK: &[u8] = b"LEDGER_BLOCK_V1";

/// Encode a u32 as 4 bytes big-endian
#[inline]
pub fn u32_be(n: u32) -> [u8; 4] {
    n.to_be_bytes()
}

/// Encode a string as length-prefixed UTF-8 bytes
/// Format: U32_BE(len) || UTF8_bytes
pub fn encode_string(s: &str) -> Vec<u8> {
    let utf8_bytes = s.as_bytes();
    let mut result = Vec::with_capacity(4 + utf8_bytes.len());
    result.extend_from_slice(&u32_be(utf8_bytes.len() as u32));
    result.extend_from_slice(utf8_bytes);
    result
}

fn digest_parts(domain: &[u8], parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    for part in parts {
        hasher.update(encode_string(part));
    }
    hex::encode(hasher.finalize())
}

/// Fingerprint an ordered sequence of strings.
pub fn fingerprint(parts: &[&str]) -> String {
    digest_parts(&[], parts)
}

/// Fingerprint of a statement's content fields.
pub fn statement_fingerprint(statement: &str, speaker: &str, source_url: Option<&str>) -> String {
    digest_parts(
        DOMAIN_STATEMENT,
        &[statement, speaker, source_url.unwrap_or("")],
    )
}

/// Fingerprint of an entry's position in the chain.
pub fn block_fingerprint(
    statement_fingerprint: &str,
    previous_hash: &str,
    appended_at_millis: i64,
) -> String {
    let millis = appended_at_millis.to_string();
    digest_parts(
        DOMAIN_BLOCK,
        &[statement_fingerprint, previous_hash, millis.as_str()],
    )
}

/// True if `value` looks like a fingerprint produced by this module.
pub fn is_fingerprint(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
