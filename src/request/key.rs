//! Cache Key Derivation
//!
//! Builds the stable string key identifying a logical request.

use sha2::{Digest, Sha256};

use crate::request::FetchRequest;

/// Number of digest hex characters folded into the key.
const DIGEST_PREFIX_LEN: usize = 16;

/// Derives the cache key for a request.
///
/// Identical logical requests always map to the same key: the method is
/// uppercased, header pairs are sorted by lowercased name before hashing,
/// and body and header material is folded into a fixed-width digest so keys
/// stay bounded regardless of payload size.
pub fn derive_cache_key(request: &FetchRequest) -> String {
    let mut key = format!("{}:{}", request.method.to_uppercase(), request.url);

    if request.body.is_none() && request.headers.is_empty() {
        return key;
    }

    let mut hasher = Sha256::new();
    if let Some(body) = &request.body {
        hasher.update(b"body:");
        hasher.update(body.as_bytes());
    }
    let mut pairs: Vec<(String, &str)> = request
        .headers
        .iter()
        .map(|(name, value)| (name.to_lowercase(), value.as_str()))
        .collect();
    pairs.sort();
    for (name, value) in pairs {
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b";");
    }

    let digest = hex::encode(hasher.finalize());
    key.push(':');
    key.push_str(&digest[..DIGEST_PREFIX_LEN]);
    key
}
