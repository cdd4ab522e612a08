//! Shared driver metadata for the strata storage layers.
//!
//! Every layer (flat KV, hierarchical KV, tuple store) keeps a process-wide
//! registry of named drivers. The registries themselves live in the layer
//! crates because their opener signatures differ; this crate holds the
//! metadata they have in common.

use serde::Deserialize;
use serde::Serialize;

/// Name separator used when one layer re-exports another layer's driver
/// (e.g. a flat driver registered as `flat.btree` in the hierarchical
/// registry).
pub const REGISTRY_SEP: &str = ".";

/// Common information about a registered database driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverInfo {
    /// Unique name within a registry.
    pub name: String,
    /// Human-readable name.
    pub title: String,
    /// Stores data on local disk (as opposed to a remote service).
    pub local: bool,
    /// Keeps data in memory only; open must not receive a path.
    pub volatile: bool,
}

impl DriverInfo {
    /// Prefix the driver name for registration in another layer's registry.
    pub fn scoped(&self, scope: &str) -> DriverInfo {
        DriverInfo {
            name: format!("{scope}{REGISTRY_SEP}{}", self.name),
            title: self.title.clone(),
            local: self.local,
            volatile: self.volatile,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_prefixes_name() {
        let info = DriverInfo {
            name: "btree".to_string(),
            title: "B-Tree".to_string(),
            local: true,
            volatile: true,
        };
        let scoped = info.scoped("flat");
        assert_eq!(scoped.name, "flat.btree");
        assert_eq!(scoped.title, info.title);
        assert_eq!(scoped.local, info.local);
        assert_eq!(scoped.volatile, info.volatile);
    }

    #[test]
    fn driver_info_serialization_roundtrip() {
        let info = DriverInfo {
            name: "btree".to_string(),
            title: "B-Tree".to_string(),
            local: true,
            volatile: true,
        };
        let json = serde_json::to_string(&info).unwrap();
        let back: DriverInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(info, back);
    }
}
