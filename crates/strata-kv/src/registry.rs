//! Process-wide driver registries for the flat and hierarchical layers.
//!
//! Drivers register themselves once at process start (there is no implicit
//! registration; applications call each driver's `register` function).
//! After that phase the maps are effectively read-only; lookups take a read
//! lock and return clones. Registering a duplicate name is a programming
//! error and panics.
//!
//! Registering a flat driver automatically registers it in the
//! hierarchical registry as `flat.<name>` with the
//! [`upgrade`](crate::upgrade) adapter composed over its opener.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::RwLock;

use once_cell::sync::Lazy;
use strata_core::DriverInfo;

use crate::errors::KvError;
use crate::flat::FlatStore;
use crate::store::Store;
use crate::upgrade::upgrade;

/// Opener for a flat driver. `None` means in-memory; a volatile driver must
/// reject `Some(path)` with [`KvError::Volatile`].
pub type OpenFlat =
    Arc<dyn Fn(Option<&Path>) -> Result<Box<dyn FlatStore + Send + Sync>, KvError> + Send + Sync>;

/// Opener for a hierarchical driver.
pub type OpenStore =
    Arc<dyn Fn(Option<&Path>) -> Result<Box<dyn Store + Send + Sync>, KvError> + Send + Sync>;

/// A flat driver registration.
#[derive(Clone)]
pub struct FlatRegistration {
    pub info: DriverInfo,
    pub open: OpenFlat,
}

/// A hierarchical driver registration.
#[derive(Clone)]
pub struct Registration {
    pub info: DriverInfo,
    pub open: OpenStore,
}

static FLAT: Lazy<RwLock<BTreeMap<String, FlatRegistration>>> =
    Lazy::new(|| RwLock::new(BTreeMap::new()));
static HIER: Lazy<RwLock<BTreeMap<String, Registration>>> =
    Lazy::new(|| RwLock::new(BTreeMap::new()));

/// Register a flat driver, and its upgraded form under `flat.<name>` in the
/// hierarchical registry.
///
/// Panics when the name is empty or already registered.
pub fn register_flat(reg: FlatRegistration) {
    assert!(!reg.info.name.is_empty(), "driver name cannot be empty");

    let hier_info = reg.info.scoped("flat");
    let open_flat = reg.open.clone();
    let hier = Registration {
        info: hier_info,
        open: Arc::new(move |path| {
            let flat = open_flat(path)?;
            Ok(Box::new(upgrade(flat)) as Box<dyn Store + Send + Sync>)
        }),
    };

    {
        let mut flat = FLAT.write().expect("flat registry lock");
        assert!(
            !flat.contains_key(&reg.info.name),
            "flat driver already registered: {}",
            reg.info.name
        );
        tracing::debug!(name = %reg.info.name, "registering flat kv driver");
        flat.insert(reg.info.name.clone(), reg);
    }
    register(hier);
}

/// Register a hierarchical driver.
///
/// Panics when the name is empty or already registered.
pub fn register(reg: Registration) {
    assert!(!reg.info.name.is_empty(), "driver name cannot be empty");
    let mut hier = HIER.write().expect("kv registry lock");
    assert!(
        !hier.contains_key(&reg.info.name),
        "kv driver already registered: {}",
        reg.info.name
    );
    tracing::debug!(name = %reg.info.name, "registering kv driver");
    hier.insert(reg.info.name.clone(), reg);
}

/// All flat drivers, sorted by name.
pub fn list_flat() -> Vec<FlatRegistration> {
    FLAT.read().expect("flat registry lock").values().cloned().collect()
}

/// All hierarchical drivers, sorted by name.
pub fn list() -> Vec<Registration> {
    HIER.read().expect("kv registry lock").values().cloned().collect()
}

/// Look up a flat driver by name.
pub fn flat_by_name(name: &str) -> Option<FlatRegistration> {
    FLAT.read().expect("flat registry lock").get(name).cloned()
}

/// Look up a hierarchical driver by name.
pub fn by_name(name: &str) -> Option<Registration> {
    HIER.read().expect("kv registry lock").get(name).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registration(name: &str) -> FlatRegistration {
        FlatRegistration {
            info: DriverInfo {
                name: name.to_string(),
                title: "Test".to_string(),
                local: true,
                volatile: true,
            },
            open: Arc::new(|path| {
                if path.is_some() {
                    return Err(KvError::Volatile);
                }
                Ok(Box::new(crate::mem::MemKv::new()))
            }),
        }
    }

    #[test]
    fn flat_registration_creates_upgraded_entry() {
        register_flat(test_registration("test-upgraded"));

        assert!(flat_by_name("test-upgraded").is_some());
        let hier = by_name("flat.test-upgraded").expect("upgraded driver");
        assert_eq!(hier.info.title, "Test");

        // The upgraded opener produces a working hierarchical store.
        let store = (hier.open)(None).unwrap();
        let store_ref = &store;
        crate::store::update(store_ref, |tx| {
            tx.put(&crate::Key::from_strings(["a", "b"]), b"1")
        })
        .unwrap();
        crate::store::view(store_ref, |tx| {
            assert_eq!(tx.get(&crate::Key::from_strings(["a", "b"])).unwrap(), b"1");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn volatile_driver_rejects_path() {
        register_flat(test_registration("test-volatile"));
        let reg = flat_by_name("test-volatile").unwrap();
        assert!(matches!(
            (reg.open)(Some(Path::new("/nope"))),
            Err(KvError::Volatile)
        ));
    }

    #[test]
    fn lists_are_sorted() {
        register_flat(test_registration("test-list-b"));
        register_flat(test_registration("test-list-a"));
        let names: Vec<_> = list_flat().into_iter().map(|r| r.info.name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_name_panics() {
        register_flat(test_registration("test-dup"));
        register_flat(test_registration("test-dup"));
    }
}
