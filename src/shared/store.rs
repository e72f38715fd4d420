//! Named backing store for shared containers.
//!
//! A store is a named region holding the root of a container tree. The
//! orchestrator creates it once; workers attach by name and never receive the
//! tree by value. Unlinking removes the name and poisons every outstanding
//! handle with `BackingStoreGone`.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

use super::access::AccessMode;
use super::dict::{DictNode, SharedDict};
use crate::error::{OrchestraError, Result};

pub(crate) struct StoreRegion {
    pub(crate) name: String,
    pub(crate) root: Arc<DictNode>,
    pub(crate) unlinked: AtomicBool,
    pub(crate) access_sealed: AtomicBool,
}

fn registry() -> &'static DashMap<String, Arc<StoreRegion>> {
    static REGISTRY: OnceLock<DashMap<String, Arc<StoreRegion>>> = OnceLock::new();
    REGISTRY.get_or_init(DashMap::new)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreRole {
    /// Created the region; responsible for unlinking it
    Creator,
    /// Attached by name; must never unlink
    Attached,
}

/// Handle to a named backing store
#[derive(Clone)]
pub struct SharedStore {
    region: Arc<StoreRegion>,
    role: StoreRole,
}

impl SharedStore {
    /// Open a store by name. `create=true` registers a fresh region and fails
    /// if the name is taken; `create=false` attaches to an existing one.
    pub fn open(name: &str, create: bool) -> Result<Self> {
        if create {
            Self::create(name)
        } else {
            Self::attach(name)
        }
    }

    pub fn create(name: &str) -> Result<Self> {
        let region = Arc::new(StoreRegion {
            name: name.to_string(),
            root: DictNode::new(name, AccessMode::Open),
            unlinked: AtomicBool::new(false),
            access_sealed: AtomicBool::new(false),
        });

        match registry().entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(OrchestraError::init(
                    "shared store",
                    format!("a store named '{name}' already exists"),
                ));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(region.clone());
            }
        }

        info!(store = %name, "🗄️ STORE: Created shared store");
        Ok(Self {
            region,
            role: StoreRole::Creator,
        })
    }

    pub fn attach(name: &str) -> Result<Self> {
        let region = registry()
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| OrchestraError::BackingStoreGone(name.to_string()))?;

        if region.unlinked.load(Ordering::Acquire) {
            return Err(OrchestraError::BackingStoreGone(name.to_string()));
        }

        debug!(store = %name, "STORE: Attached to shared store");
        Ok(Self {
            region,
            role: StoreRole::Attached,
        })
    }

    pub fn name(&self) -> &str {
        &self.region.name
    }

    pub fn role(&self) -> StoreRole {
        self.role
    }

    pub fn is_unlinked(&self) -> bool {
        self.region.unlinked.load(Ordering::Acquire)
    }

    /// Root container of the tree
    pub fn root(&self) -> Result<SharedDict> {
        if self.is_unlinked() {
            return Err(OrchestraError::BackingStoreGone(self.region.name.clone()));
        }
        Ok(SharedDict::from_parts(
            self.region.clone(),
            self.region.root.clone(),
        ))
    }

    /// Nested container stored under `name` in the root
    pub fn compartment(&self, name: &str) -> Result<SharedDict> {
        match self.root()?.get(name)? {
            super::Value::Dict(dict) => Ok(dict),
            other => Err(OrchestraError::KeyType(format!(
                "compartment '{name}' holds a {} instead of a container",
                other.type_name()
            ))),
        }
    }

    /// Forbid further `set_access` calls on every container in this store
    pub fn seal_access(&self) {
        self.region.access_sealed.store(true, Ordering::Release);
    }

    pub fn is_access_sealed(&self) -> bool {
        self.region.access_sealed.load(Ordering::Acquire)
    }

    /// Remove the region. Returns `Ok(false)` when it was already unlinked.
    pub fn unlink(&self) -> Result<bool> {
        if self.role != StoreRole::Creator {
            return Err(OrchestraError::AccessPolicy {
                container: self.region.name.clone(),
                reason: "only the creating orchestrator may unlink the store".to_string(),
            });
        }

        if self.region.unlinked.swap(true, Ordering::AcqRel) {
            debug!(store = %self.region.name, "STORE: Unlink of already unlinked store ignored");
            return Ok(false);
        }

        registry().remove_if(&self.region.name, |_, region| {
            Arc::ptr_eq(region, &self.region)
        });
        self.region.root.detach_subtree();

        info!(store = %self.region.name, "🗑️ STORE: Unlinked shared store");
        Ok(true)
    }
}

impl std::fmt::Debug for SharedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStore")
            .field("name", &self.region.name)
            .field("role", &self.role)
            .field("unlinked", &self.is_unlinked())
            .finish()
    }
}
