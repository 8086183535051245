//! Tier 3: host bridge.
//!
//! A host application can inject a bridge object under one of a few known
//! global names. Only [`HostBridge::read`] is required; write, remove and
//! clear are optional.
//!
//! # Limitation
//!
//! A bridge has no enumeration primitive, so it cannot be bulk-loaded in
//! full. [`BridgeBackend`] reads only the configured well-known keys. Any
//! other key the bridge holds stays invisible to `get` until this session
//! writes it. This is the documented contract, not a bug.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, trace};

use super::{Backend, BackendHandle, BackendKind, LoadedCache, Persistence};
use crate::diagnostics::Diagnostics;
use crate::error::{StoreError, StoreResult, TierError};

// ---------------------------------------------------------------------------
// Native contract
// ---------------------------------------------------------------------------

/// Object a host exposes for key/value access.
pub trait HostBridge: Send + Sync {
    /// Read one key. `Ok(None)` means the host has no value for it.
    fn read(&self, key: &str) -> StoreResult<Option<String>>;

    fn write(&self, _key: &str, _value: &str) -> StoreResult<()> {
        Err(StoreError::Unsupported("write"))
    }

    fn remove(&self, _key: &str) -> StoreResult<()> {
        Err(StoreError::Unsupported("remove"))
    }

    fn clear(&self) -> StoreResult<()> {
        Err(StoreError::Unsupported("clear"))
    }
}

/// A value found under a global name.
#[derive(Clone)]
pub enum HostValue {
    /// Something that implements the bridge contract.
    Bridge(Arc<dyn HostBridge>),
    /// The name is taken by something that is not a bridge.
    Opaque,
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bridge(_) => f.write_str("Bridge(..)"),
            Self::Opaque => f.write_str("Opaque"),
        }
    }
}

/// The named globals a host exposes to the store.
#[derive(Debug, Clone, Default)]
pub struct HostGlobals {
    values: HashMap<String, HostValue>,
}

impl HostGlobals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bridge under `name`, replacing whatever was there.
    pub fn insert_bridge(&mut self, name: impl Into<String>, bridge: Arc<dyn HostBridge>) {
        self.values.insert(name.into(), HostValue::Bridge(bridge));
    }

    /// Occupy `name` with a value that is not a bridge.
    pub fn insert_opaque(&mut self, name: impl Into<String>) {
        self.values.insert(name.into(), HostValue::Opaque);
    }

    pub fn get(&self, name: &str) -> Option<&HostValue> {
        self.values.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Bundled bridges
// ---------------------------------------------------------------------------

/// In-process bridge over a `HashMap`, supporting every operation.
#[derive(Debug, Default)]
pub struct MapBridge {
    entries: Mutex<HashMap<String, String>>,
}

impl MapBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bridge pre-populated with `entries`.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: Mutex::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Snapshot of the bridge contents.
    pub fn snapshot(&self) -> StoreResult<HashMap<String, String>> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|e| StoreError::TaskJoin(format!("mutex poisoned: {e}")))
    }
}

impl HostBridge for MapBridge {
    fn read(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> StoreResult<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        self.lock()?.clear();
        Ok(())
    }
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Read-only bridge over environment variables.
///
/// Key `rewards.balance` with prefix `APP_` reads `APP_REWARDS_BALANCE`.
pub struct EnvBridge {
    prefix: String,
    lookup: Lookup,
}

impl EnvBridge {
    /// Bridge over the process environment.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_lookup(prefix, |name| std::env::var(name).ok())
    }

    /// Bridge over an arbitrary variable lookup.
    pub fn with_lookup(
        prefix: impl Into<String>,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            lookup: Box::new(lookup),
        }
    }

    /// The variable name `key` maps to.
    pub fn var_name(&self, key: &str) -> String {
        let suffix: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}{suffix}", self.prefix)
    }
}

impl HostBridge for EnvBridge {
    fn read(&self, key: &str) -> StoreResult<Option<String>> {
        Ok((self.lookup)(&self.var_name(key)))
    }
}

// ---------------------------------------------------------------------------
// Tier strategy
// ---------------------------------------------------------------------------

/// Strategy for the host-bridge tier.
///
/// Only `well_known_keys` are read at load time; see the module docs.
pub struct BridgeBackend {
    globals: HostGlobals,
    names: Vec<String>,
    well_known_keys: Vec<String>,
}

impl BridgeBackend {
    pub fn new(globals: HostGlobals, names: Vec<String>, well_known_keys: Vec<String>) -> Self {
        Self {
            globals,
            names,
            well_known_keys,
        }
    }
}

#[async_trait]
impl Backend for BridgeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::HostBridge
    }

    async fn probe(&self) -> Result<Box<dyn BackendHandle>, TierError> {
        for name in &self.names {
            match self.globals.get(name) {
                Some(HostValue::Bridge(bridge)) => {
                    debug!(global = %name, "host bridge found");
                    return Ok(Box::new(BridgeHandle {
                        bridge: Arc::clone(bridge),
                        keys: self.well_known_keys.clone(),
                    }));
                }
                Some(HostValue::Opaque) => {
                    debug!(global = %name, "global present but exposes no read method");
                }
                None => {}
            }
        }
        Err(TierError::unavailable(
            BackendKind::HostBridge,
            format!("no bridge among globals {:?}", self.names),
        ))
    }
}

struct BridgeHandle {
    bridge: Arc<dyn HostBridge>,
    keys: Vec<String>,
}

#[async_trait]
impl BackendHandle for BridgeHandle {
    async fn load(
        self: Box<Self>,
        _diagnostics: Arc<Diagnostics>,
    ) -> Result<LoadedCache, TierError> {
        let mut entries = HashMap::new();
        for key in &self.keys {
            match self.bridge.read(key) {
                Ok(Some(value)) => {
                    entries.insert(key.clone(), value);
                }
                Ok(None) => {}
                Err(e) => debug!(key = %key, error = %e, "bridge read failed, key skipped"),
            }
        }
        debug!(
            requested = self.keys.len(),
            found = entries.len(),
            "host bridge loaded well-known keys"
        );

        Ok(LoadedCache {
            entries,
            binding: Arc::new(BridgePersistence {
                bridge: self.bridge,
            }),
        })
    }
}

/// Forwards mutations to the bridge; missing optional methods are no-ops.
struct BridgePersistence {
    bridge: Arc<dyn HostBridge>,
}

fn tolerate_unsupported(result: StoreResult<()>) -> StoreResult<()> {
    match result {
        Err(StoreError::Unsupported(op)) => {
            trace!(op, "bridge lacks optional method, skipping");
            Ok(())
        }
        other => other,
    }
}

impl Persistence for BridgePersistence {
    fn write(&self, key: &str, value: &str) -> StoreResult<()> {
        tolerate_unsupported(self.bridge.write(key, value))
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        tolerate_unsupported(self.bridge.remove(key))
    }

    fn clear(&self) -> StoreResult<()> {
        tolerate_unsupported(self.bridge.clear())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["HostStorage".into(), "NativeBridge".into()]
    }

    #[tokio::test]
    async fn no_globals_is_unavailable() {
        let backend = BridgeBackend::new(HostGlobals::new(), names(), vec![]);
        assert!(backend.probe().await.is_err());
    }

    #[tokio::test]
    async fn opaque_global_is_skipped() {
        let mut globals = HostGlobals::new();
        globals.insert_opaque("HostStorage");
        let backend = BridgeBackend::new(globals, names(), vec![]);
        assert!(backend.probe().await.is_err());
    }

    #[tokio::test]
    async fn unknown_global_name_is_ignored() {
        let mut globals = HostGlobals::new();
        globals.insert_bridge("SomethingElse", Arc::new(MapBridge::new()));
        let backend = BridgeBackend::new(globals, names(), vec![]);
        assert!(backend.probe().await.is_err());
    }

    #[tokio::test]
    async fn later_name_is_used_when_earlier_is_opaque() {
        let mut globals = HostGlobals::new();
        globals.insert_opaque("HostStorage");
        globals.insert_bridge(
            "NativeBridge",
            Arc::new(MapBridge::with_entries([("known", "1")])),
        );
        let backend = BridgeBackend::new(globals, names(), vec!["known".into()]);
        let loaded = backend
            .probe()
            .await
            .unwrap()
            .load(Arc::new(Diagnostics::new()))
            .await
            .unwrap();
        assert_eq!(loaded.entries["known"], "1");
    }

    #[tokio::test]
    async fn only_well_known_keys_are_loaded() {
        let bridge = Arc::new(MapBridge::with_entries([("x", "9"), ("rewards.balance", "40")]));
        let mut globals = HostGlobals::new();
        globals.insert_bridge("HostStorage", bridge.clone());

        let backend = BridgeBackend::new(
            globals,
            names(),
            vec!["rewards.balance".into(), "rewards.history".into()],
        );
        let loaded = backend
            .probe()
            .await
            .unwrap()
            .load(Arc::new(Diagnostics::new()))
            .await
            .unwrap();

        assert_eq!(loaded.entries.len(), 1);
        assert_eq!(loaded.entries["rewards.balance"], "40");
        assert!(!loaded.entries.contains_key("x"));

        loaded.binding.write("y", "1").unwrap();
        assert_eq!(bridge.read("y").unwrap(), Some("1".to_string()));
    }

    #[test]
    fn env_bridge_maps_key_to_variable() {
        let bridge = EnvBridge::with_lookup("APP_", |name| {
            (name == "APP_REWARDS_BALANCE").then(|| "12".to_string())
        });
        assert_eq!(bridge.var_name("rewards.balance"), "APP_REWARDS_BALANCE");
        assert_eq!(bridge.read("rewards.balance").unwrap(), Some("12".to_string()));
        assert_eq!(bridge.read("rewards.history").unwrap(), None);
    }

    #[test]
    fn read_only_bridge_mutations_are_noops() {
        let persistence = BridgePersistence {
            bridge: Arc::new(EnvBridge::with_lookup("P_", |_| None)),
        };
        assert!(persistence.write("k", "v").is_ok());
        assert!(persistence.delete("k").is_ok());
        assert!(persistence.clear().is_ok());
    }
}
