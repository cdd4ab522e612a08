//! Process-wide registry of tuple store drivers.
//!
//! Same rules as the KV registries: explicit registration at process
//! start, panics on duplicates, read-mostly afterwards. A hierarchical KV
//! driver can be bridged in under `kv.<name>` with [`register_kv`], which
//! composes its opener with the [`TupleKv`](crate::kv::TupleKv) engine.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::RwLock;

use once_cell::sync::Lazy;
use strata_core::DriverInfo;

use crate::errors::from_kv;
use crate::kv::TupleKv;
use crate::Store;
use crate::TupleError;

/// Opener for a tuple driver. `None` means in-memory.
pub type OpenStore =
    Arc<dyn Fn(Option<&Path>) -> Result<Box<dyn Store + Send + Sync>, TupleError> + Send + Sync>;

/// A tuple driver registration.
#[derive(Clone)]
pub struct Registration {
    pub info: DriverInfo,
    pub open: OpenStore,
}

static REGISTRY: Lazy<RwLock<BTreeMap<String, Registration>>> =
    Lazy::new(|| RwLock::new(BTreeMap::new()));

/// Register a tuple driver.
///
/// Panics when the name is empty or already registered.
pub fn register(reg: Registration) {
    assert!(!reg.info.name.is_empty(), "driver name cannot be empty");
    let mut registry = REGISTRY.write().expect("tuple registry lock");
    assert!(
        !registry.contains_key(&reg.info.name),
        "tuple driver already registered: {}",
        reg.info.name
    );
    tracing::debug!(name = %reg.info.name, "registering tuple driver");
    registry.insert(reg.info.name.clone(), reg);
}

/// Register a hierarchical KV driver as the tuple driver `kv.<name>`.
pub fn register_kv(reg: strata_kv::registry::Registration) {
    let open_kv = reg.open.clone();
    register(Registration {
        info: reg.info.scoped("kv"),
        open: Arc::new(move |path| {
            let db = open_kv(path).map_err(from_kv)?;
            Ok(Box::new(TupleKv::new(db)) as Box<dyn Store + Send + Sync>)
        }),
    });
}

/// All tuple drivers, sorted by name.
pub fn list() -> Vec<Registration> {
    REGISTRY.read().expect("tuple registry lock").values().cloned().collect()
}

/// Look up a tuple driver by name.
pub fn by_name(name: &str) -> Option<Registration> {
    REGISTRY.read().expect("tuple registry lock").get(name).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kv_bridge_opens_a_working_store() {
        let kv_reg = strata_kv::registry::Registration {
            info: DriverInfo {
                name: "tuple-bridge-test".to_string(),
                title: "Test".to_string(),
                local: true,
                volatile: true,
            },
            open: Arc::new(|path| {
                if path.is_some() {
                    return Err(strata_kv::KvError::Volatile);
                }
                Ok(Box::new(strata_kv::upgrade(strata_kv::mem::MemKv::new())))
            }),
        };
        register_kv(kv_reg);

        let reg = by_name("kv.tuple-bridge-test").expect("bridged driver");
        assert!(reg.info.volatile);

        let store = (reg.open)(None).unwrap();
        let header = crate::Header {
            name: "t".to_string(),
            key: vec![crate::KeyField {
                name: "k".to_string(),
                ty: strata_values::SortableType::String,
                auto: false,
            }],
            data: Vec::new(),
        };
        crate::update(&store, |tx| {
            tx.create_table(header.clone())?;
            Ok(())
        })
        .unwrap();
        assert_eq!(store.table("t").unwrap(), header);
    }
}
