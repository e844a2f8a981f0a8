//! Cache key derivation.
//!
//! The key is a SHA-256 digest over a length-prefixed encoding of every
//! descriptor field, in a fixed order. Length prefixes rule out separator
//! collisions (`prompt = "a|b", model = "c"` vs `prompt = "a", model = "b|c"`),
//! and optional fields carry a presence tag so `None` and `Some("")` differ.
//!
//! The dispatcher keys on the route a request actually takes:
//! [`key_for_route`] substitutes the resolved provider for a missing
//! selector and folds in the client's
//! [`cache_tag`](crate::LlmClient::cache_tag).

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::RequestDescriptor;

/// Bumped whenever the encoding below changes, so old entries stop matching.
const KEY_SCHEMA: &str = "slipstream/v2";

/// Hex-encoded SHA-256 digest identifying one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheDigest(String);

impl CacheDigest {
    /// Parse a digest from its hex form (64 lowercase hex characters).
    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        valid.then(|| Self(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the file holding this entry.
    pub fn file_name(&self) -> String {
        format!("{}.json", self.0)
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for CacheDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the cache digest for a descriptor.
///
/// Pure function of the descriptor fields: replaying the same logical
/// request always lands on the same entry.
pub fn key_for(descriptor: &RequestDescriptor) -> CacheDigest {
    digest(descriptor, descriptor.provider.as_deref(), None)
}

/// Digest of `descriptor` as sent through `provider`, a client carrying
/// `client_tag`.
///
/// `key_for_route(d, p, None)` equals `key_for` of `d` with its provider
/// set to `p`.
pub fn key_for_route(
    descriptor: &RequestDescriptor,
    provider: &str,
    client_tag: Option<&str>,
) -> CacheDigest {
    digest(descriptor, Some(provider), client_tag)
}

fn digest(
    descriptor: &RequestDescriptor,
    provider: Option<&str>,
    client_tag: Option<&str>,
) -> CacheDigest {
    let mut key = KeyHasher::new();
    key.field(KEY_SCHEMA.as_bytes());
    key.field(descriptor.prompt.as_bytes());
    key.optional(descriptor.system.as_deref().map(str::as_bytes));
    key.optional(descriptor.payload.as_deref().map(str::as_bytes));
    key.field(descriptor.model.as_bytes());
    key.optional(provider.map(str::as_bytes));
    key.optional(descriptor.run.as_deref().map(str::as_bytes));
    key.field(&descriptor.index.to_le_bytes());

    let params = &descriptor.params;
    key.optional_u32(params.temperature.map(f32::to_bits));
    key.optional_u32(params.max_tokens);
    key.optional_u32(params.top_p.map(f32::to_bits));
    key.optional(client_tag.map(str::as_bytes));

    CacheDigest(hex::encode(key.finish()))
}

struct KeyHasher(Sha256);

impl KeyHasher {
    fn new() -> Self {
        Self(Sha256::new())
    }

    fn field(&mut self, bytes: &[u8]) {
        self.0.update((bytes.len() as u64).to_le_bytes());
        self.0.update(bytes);
    }

    fn optional(&mut self, bytes: Option<&[u8]>) {
        match bytes {
            Some(bytes) => {
                self.0.update([1u8]);
                self.field(bytes);
            }
            None => self.0.update([0u8]),
        }
    }

    fn optional_u32(&mut self, value: Option<u32>) {
        let bytes = value.map(u32::to_le_bytes);
        self.optional(bytes.as_ref().map(|b| b.as_slice()));
    }

    fn finish(self) -> [u8; 32] {
        self.0.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GenerationParams;

    fn base() -> RequestDescriptor {
        RequestDescriptor::new("prompt", "m1").index(0)
    }

    #[test]
    fn digest_is_64_hex_chars() {
        let digest = key_for(&base());
        assert_eq!(digest.as_str().len(), 64);
        assert!(CacheDigest::parse(digest.as_str()).is_some());
    }

    #[test]
    fn separator_shift_does_not_collide() {
        let a = RequestDescriptor::new("a|b", "c");
        let b = RequestDescriptor::new("a", "b|c");
        assert_ne!(key_for(&a), key_for(&b));
    }

    #[test]
    fn absent_differs_from_empty() {
        let absent = base();
        let empty = base().payload("");
        assert_ne!(key_for(&absent), key_for(&empty));
    }

    #[test]
    fn payload_and_system_are_not_interchangeable() {
        let a = base().system("x");
        let b = base().payload("x");
        assert_ne!(key_for(&a), key_for(&b));
    }

    #[test]
    fn params_change_the_digest() {
        let a = base().params(GenerationParams::new().temperature(0.3));
        let b = base().params(GenerationParams::new().temperature(0.7));
        let c = base().params(GenerationParams::new().max_tokens(150));
        assert_ne!(key_for(&a), key_for(&b));
        assert_ne!(key_for(&a), key_for(&c));
        assert_ne!(key_for(&base()), key_for(&c));
    }

    #[test]
    fn route_substitutes_missing_provider() {
        let d = base();
        assert_eq!(
            key_for_route(&d, "martian", None),
            key_for(&base().provider("martian"))
        );
        assert_ne!(
            key_for_route(&d, "martian", None),
            key_for_route(&d, "openrouter", None)
        );
        assert_ne!(key_for_route(&d, "martian", None), key_for(&d));
    }

    #[test]
    fn parse_rejects_non_digests() {
        assert!(CacheDigest::parse("abc").is_none());
        assert!(CacheDigest::parse(&"G".repeat(64)).is_none());
        assert!(CacheDigest::parse(&"A".repeat(64)).is_none());
    }
}
