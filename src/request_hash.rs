//! Canonical request hashing.
//!
//! Every challenge and proof is bound to a request through a deterministic
//! SHA-256 digest of the request's method, path, canonicalized query, and raw
//! body bytes. The digest is a pure function of those inputs: no clocks, no
//! randomness, no headers, and the body is never parsed.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::{Digest, Sha256};

/// Characters escaped by URI-component encoding: everything except
/// alphanumerics and the unreserved marks. Space encodes as `%20`, not `+`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Computes the canonical request hash as 64 lowercase hex characters.
///
/// The digest covers `METHOD "\n" PATH "\n" CANONICAL_QUERY "\n" BODY`, with
/// the method upper-cased, the path taken verbatim (percent-escapes
/// preserved), and the query canonicalized by [`canonical_query`]. All three
/// separators are present even when the query and body are empty.
pub fn request_hash(method: &str, path: &str, raw_query: &str, body: &[u8]) -> String {
    let query = canonical_query(raw_query);
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(path.as_bytes());
    hasher.update(b"\n");
    hasher.update(query.as_bytes());
    hasher.update(b"\n");
    hasher.update(body);
    hex::encode(hasher.finalize())
}

/// Canonicalizes a raw query string (without the leading `?`).
///
/// Pairs are decoded, stably sorted by key, re-encoded with URI-component
/// escaping, and joined with `&`. Empty input yields the empty string, so
/// `?` and no query hash identically.
pub fn canonical_query(raw_query: &str) -> String {
    if raw_query.is_empty() {
        return String::new();
    }
    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(raw_query.as_bytes())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out = String::with_capacity(raw_query.len());
    for (i, (key, value)) in pairs.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        out.extend(utf8_percent_encode(key, COMPONENT));
        out.push('=');
        out.extend(utf8_percent_encode(value, COMPONENT));
    }
    out
}
