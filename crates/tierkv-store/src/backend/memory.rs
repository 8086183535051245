//! Tier 4: in-memory fallback.
//!
//! Always available and never persists anything. If the environment
//! carries a cookie-style seed (`k1=v1; k2=v2`, percent-encoded), its
//! entries are loaded so the session does not start completely empty.
//! Bad entries in the seed are skipped one by one.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{Backend, BackendHandle, BackendKind, LoadedCache, NoopPersistence};
use crate::diagnostics::Diagnostics;
use crate::error::TierError;

/// Terminal tier.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    seed: Option<String>,
}

impl MemoryBackend {
    pub fn new(seed: Option<String>) -> Self {
        Self { seed }
    }

    /// Parse the seed and bind no-op persistence. Cannot fail.
    fn seed(&self, diagnostics: &Diagnostics) -> LoadedCache {
        let entries = match &self.seed {
            Some(raw) => {
                let (entries, skipped) = parse_seed(raw);
                for err in &skipped {
                    diagnostics.record(err);
                }
                debug!(
                    loaded = entries.len(),
                    skipped = skipped.len(),
                    "in-memory tier seeded"
                );
                entries
            }
            None => HashMap::new(),
        };

        LoadedCache {
            entries,
            binding: Arc::new(NoopPersistence),
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::InMemory
    }

    async fn probe(&self) -> Result<Box<dyn BackendHandle>, TierError> {
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl BackendHandle for MemoryBackend {
    async fn load(
        self: Box<Self>,
        diagnostics: Arc<Diagnostics>,
    ) -> Result<LoadedCache, TierError> {
        Ok(self.seed(&diagnostics))
    }
}

// ---------------------------------------------------------------------------
// Seed parsing
// ---------------------------------------------------------------------------

/// Parse a `;`-separated list of percent-encoded `key=value` pairs.
///
/// Returns the parsed entries plus one [`TierError::MalformedExternalEntry`]
/// per skipped entry. Empty segments are ignored silently. When a key
/// repeats, the first occurrence wins.
pub fn parse_seed(raw: &str) -> (HashMap<String, String>, Vec<TierError>) {
    let mut entries = HashMap::new();
    let mut skipped = Vec::new();

    for segment in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let malformed = |reason: &'static str| TierError::MalformedExternalEntry {
            entry: segment.to_string(),
            reason,
        };

        let Some((key, value)) = segment.split_once('=') else {
            skipped.push(malformed("missing '='"));
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            skipped.push(malformed("empty key"));
            continue;
        }

        match (percent_decode(key), percent_decode(value.trim())) {
            (Some(key), Some(value)) => {
                entries.entry(key).or_insert(value);
            }
            _ => skipped.push(malformed("invalid percent-encoding")),
        }
    }

    (entries, skipped)
}

/// Decode `%XX` escapes. `None` on a truncated escape or non-UTF-8 result.
fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = input.get(i + 1..i + 3)?;
            if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_pairs() {
        let (entries, skipped) = parse_seed("a=1; b=2");
        assert!(skipped.is_empty());
        assert_eq!(entries["a"], "1");
        assert_eq!(entries["b"], "2");
    }

    #[test]
    fn decodes_percent_escapes() {
        let (entries, _) = parse_seed("greeting=hello%20world;json=%7B%22n%22%3A1%7D;caf%C3%A9=ok");
        assert_eq!(entries["greeting"], "hello world");
        assert_eq!(entries["json"], r#"{"n":1}"#);
        assert_eq!(entries["café"], "ok");
    }

    #[test]
    fn value_may_contain_equals_and_be_empty() {
        let (entries, skipped) = parse_seed("expr=a=b; empty=");
        assert!(skipped.is_empty());
        assert_eq!(entries["expr"], "a=b");
        assert_eq!(entries["empty"], "");
    }

    #[test]
    fn malformed_entries_are_skipped_individually() {
        let (entries, skipped) = parse_seed("good=1; junk; =nokey; bad=%zz; cut=%4; ;;also=2");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries["good"], "1");
        assert_eq!(entries["also"], "2");
        assert_eq!(skipped.len(), 4);
        assert!(skipped
            .iter()
            .all(|e| matches!(e, TierError::MalformedExternalEntry { .. })));
    }

    #[test]
    fn first_duplicate_wins() {
        let (entries, _) = parse_seed("k=first; k=second");
        assert_eq!(entries["k"], "first");
    }

    #[test]
    fn seed_counts_skipped_entries() {
        let diag = Diagnostics::new();
        let loaded = MemoryBackend::new(Some("a=1; nope".into())).seed(&diag);
        assert_eq!(loaded.entries.len(), 1);
        assert_eq!(diag.malformed_entries(), 1);
    }

    #[tokio::test]
    async fn probe_always_succeeds() {
        let backend = MemoryBackend::new(None);
        let loaded = backend
            .probe()
            .await
            .unwrap()
            .load(Arc::new(Diagnostics::new()))
            .await
            .unwrap();
        assert!(loaded.entries.is_empty());
    }
}
