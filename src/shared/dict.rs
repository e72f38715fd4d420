//! # SharedDict
//!
//! A keyed container living in a named [`SharedStore`](super::SharedStore).
//!
//! Every container owns a re-entrant lock; each operation holds it for the
//! duration of the call, and composite operations (`update`, `setdefault`,
//! `popitem`) commit under a single acquisition. Callers that need several
//! operations to be atomic use [`SharedDict::with_lock`].
//!
//! Nested containers are created by assigning a plain mapping. They share the
//! parent's backing store, and a read of a nested slot returns a handle to
//! it rather than a copy. Assigning an existing container handle deep-copies
//! it, so every node has exactly one parent.
//!
//! Lock order is parent before child. A mutation never takes a lock on an
//! unrelated container while holding its own.

use indexmap::IndexMap;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::access::{AccessMode, Mutation};
use super::guarded::GuardedAttribute;
use super::store::StoreRegion;
use super::value::{IntoKey, Value};
use crate::error::{OrchestraError, Result};

pub(crate) enum Slot {
    Leaf(Value),
    Nested(Arc<DictNode>),
}

pub(crate) struct NodeState {
    name: GuardedAttribute<String>,
    access: GuardedAttribute<AccessMode>,
    entries: IndexMap<String, Slot>,
}

pub(crate) struct DictNode {
    lock: ReentrantMutex<RefCell<NodeState>>,
    detached: AtomicBool,
}

impl DictNode {
    pub(crate) fn new(name: &str, access: AccessMode) -> Arc<Self> {
        Arc::new(Self {
            lock: ReentrantMutex::new(RefCell::new(NodeState {
                name: GuardedAttribute::new::<SharedDict>("name", name.to_string()),
                access: GuardedAttribute::new::<SharedDict>("access", access),
                entries: IndexMap::new(),
            })),
            detached: AtomicBool::new(false),
        })
    }

    /// Mark this node and everything below it as gone
    pub(crate) fn detach_subtree(&self) {
        self.detached.store(true, Ordering::Release);
        let guard = self.lock.lock();
        let mut state = guard.borrow_mut();
        for (_, slot) in state.entries.drain(..) {
            if let Slot::Nested(child) = slot {
                child.detach_subtree();
            }
        }
    }

    fn snapshot(&self) -> Value {
        let guard = self.lock.lock();
        let state = guard.borrow();
        let map = state
            .entries
            .iter()
            .map(|(key, slot)| {
                let value = match slot {
                    Slot::Leaf(value) => value.clone(),
                    Slot::Nested(child) => child.snapshot(),
                };
                (key.clone(), value)
            })
            .collect::<BTreeMap<_, _>>();
        Value::Map(map)
    }

    fn set_access_deep(&self, mode: AccessMode) -> Result<()> {
        let guard = self.lock.lock();
        let mut state = guard.borrow_mut();
        state.access.set::<SharedDict>(mode)?;
        for slot in state.entries.values() {
            if let Slot::Nested(child) = slot {
                child.set_access_deep(mode)?;
            }
        }
        Ok(())
    }
}

/// Handle to a container in a shared store. Cloning the handle aliases the
/// same container.
#[derive(Clone)]
pub struct SharedDict {
    region: Arc<StoreRegion>,
    node: Arc<DictNode>,
}

type NodeGuard<'a> = ReentrantMutexGuard<'a, RefCell<NodeState>>;

impl SharedDict {
    pub(crate) fn from_parts(region: Arc<StoreRegion>, node: Arc<DictNode>) -> Self {
        Self { region, node }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.region.unlinked.load(Ordering::Acquire) || self.node.detached.load(Ordering::Acquire)
        {
            return Err(OrchestraError::BackingStoreGone(self.region.name.clone()));
        }
        Ok(())
    }

    fn guard(&self) -> Result<NodeGuard<'_>> {
        self.ensure_live()?;
        let guard = self.node.lock.lock();
        self.ensure_live()?;
        Ok(guard)
    }

    fn handle(&self, node: &Arc<DictNode>) -> SharedDict {
        SharedDict {
            region: self.region.clone(),
            node: node.clone(),
        }
    }

    fn read_slot(&self, slot: &Slot) -> Value {
        match slot {
            Slot::Leaf(value) => value.clone(),
            Slot::Nested(node) => Value::Dict(self.handle(node)),
        }
    }

    /// Turn a removed slot into a plain value and release its subtree
    fn take_slot(slot: Slot) -> Value {
        match slot {
            Slot::Leaf(value) => value,
            Slot::Nested(node) => {
                let plain = node.snapshot();
                node.detach_subtree();
                plain
            }
        }
    }

    fn release_slot(slot: Slot) {
        if let Slot::Nested(node) = slot {
            node.detach_subtree();
        }
    }

    /// Build the stored form of `value` without holding any lock of ours
    fn materialize(path: &str, value: Value) -> Result<Slot> {
        match value {
            Value::Map(map) => {
                let node = DictNode::new(path, AccessMode::Open);
                {
                    let guard = node.lock.lock();
                    let mut state = guard.borrow_mut();
                    for (key, child) in map {
                        let child_path = format!("{path}.{key}");
                        let slot = Self::materialize(&child_path, child)?;
                        state.entries.insert(key, slot);
                    }
                }
                Ok(Slot::Nested(node))
            }
            Value::Dict(dict) => Self::materialize(path, dict.snapshot()?),
            leaf => Ok(Slot::Leaf(leaf)),
        }
    }

    fn check(state: &NodeState, mutation: Mutation, operation: &str) -> Result<()> {
        let access = *state.access.get();
        if access.permits(mutation) {
            Ok(())
        } else {
            Err(OrchestraError::structural(state.name.get(), access, operation))
        }
    }

    fn missing(state: &NodeState, key: &str) -> OrchestraError {
        OrchestraError::KeyMissing {
            container: state.name.get().clone(),
            key: key.to_string(),
        }
    }

    pub fn store_name(&self) -> &str {
        &self.region.name
    }

    pub fn name(&self) -> Result<String> {
        let guard = self.guard()?;
        let name = guard.borrow().name.get().clone();
        Ok(name)
    }

    pub fn access(&self) -> Result<AccessMode> {
        let guard = self.guard()?;
        let access = *guard.borrow().access.get();
        Ok(access)
    }

    pub fn get<K: IntoKey>(&self, key: K) -> Result<Value> {
        let key = key.into_key()?;
        let guard = self.guard()?;
        let state = guard.borrow();
        match state.entries.get(&key) {
            Some(slot) => Ok(self.read_slot(slot)),
            None => Err(Self::missing(&state, &key)),
        }
    }

    /// Like [`get`](Self::get) but maps a missing key to `None`
    pub fn get_opt<K: IntoKey>(&self, key: K) -> Result<Option<Value>> {
        let key = key.into_key()?;
        let guard = self.guard()?;
        let state = guard.borrow();
        Ok(state.entries.get(&key).map(|slot| self.read_slot(slot)))
    }

    /// Nested container under `key`
    pub fn dict<K: IntoKey>(&self, key: K) -> Result<SharedDict> {
        let key = key.into_key()?;
        match self.get(key.as_str())? {
            Value::Dict(dict) => Ok(dict),
            other => Err(OrchestraError::KeyType(format!(
                "'{key}' holds a {} instead of a container",
                other.type_name()
            ))),
        }
    }

    pub fn set<K: IntoKey, V: Into<Value>>(&self, key: K, value: V) -> Result<()> {
        let key = key.into_key()?;
        let path = format!("{}.{key}", self.name()?);
        let slot = Self::materialize(&path, value.into())?;

        let guard = self.guard()?;
        let mut state = guard.borrow_mut();
        let mutation = if state.entries.contains_key(&key) {
            Mutation::Overwrite
        } else {
            Mutation::Insert
        };
        Self::check(&state, mutation, "set")?;
        if let Some(previous) = state.entries.insert(key, slot) {
            Self::release_slot(previous);
        }
        Ok(())
    }

    pub fn delete<K: IntoKey>(&self, key: K) -> Result<()> {
        let key = key.into_key()?;
        let guard = self.guard()?;
        let mut state = guard.borrow_mut();
        Self::check(&state, Mutation::Remove, "delete")?;
        match state.entries.shift_remove(&key) {
            Some(slot) => {
                Self::release_slot(slot);
                Ok(())
            }
            None => Err(Self::missing(&state, &key)),
        }
    }

    pub fn clear(&self) -> Result<()> {
        let guard = self.guard()?;
        let mut state = guard.borrow_mut();
        Self::check(&state, Mutation::Remove, "clear")?;
        for (_, slot) in state.entries.drain(..) {
            Self::release_slot(slot);
        }
        Ok(())
    }

    /// Remove `key` and return its value, or `default` when it is absent.
    /// A popped nested container is returned as a plain snapshot.
    pub fn pop<K: IntoKey>(&self, key: K, default: Option<Value>) -> Result<Value> {
        let key = key.into_key()?;
        let guard = self.guard()?;
        let mut state = guard.borrow_mut();
        Self::check(&state, Mutation::Remove, "pop")?;
        match state.entries.shift_remove(&key) {
            Some(slot) => Ok(Self::take_slot(slot)),
            None => default.ok_or_else(|| Self::missing(&state, &key)),
        }
    }

    /// Remove and return the most recently inserted entry.
    ///
    /// Fails with `StructuralLock` on tightened and locked containers even
    /// when they are empty.
    pub fn popitem(&self) -> Result<(String, Value)> {
        let guard = self.guard()?;
        let mut state = guard.borrow_mut();
        Self::check(&state, Mutation::Remove, "popitem")?;
        match state.entries.pop() {
            Some((key, slot)) => Ok((key, Self::take_slot(slot))),
            None => Err(OrchestraError::KeyMissing {
                container: state.name.get().clone(),
                key: "<popitem on empty container>".to_string(),
            }),
        }
    }

    /// Apply every pair or none of them
    pub fn update<I, K, V>(&self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: IntoKey,
        V: Into<Value>,
    {
        let name = self.name()?;
        let mut prepared = Vec::new();
        for (key, value) in items {
            let key = key.into_key()?;
            let slot = Self::materialize(&format!("{name}.{key}"), value.into())?;
            prepared.push((key, slot));
        }

        let guard = self.guard()?;
        let mut state = guard.borrow_mut();
        for (key, _) in &prepared {
            let mutation = if state.entries.contains_key(key) {
                Mutation::Overwrite
            } else {
                Mutation::Insert
            };
            Self::check(&state, mutation, "update")?;
        }
        for (key, slot) in prepared {
            if let Some(previous) = state.entries.insert(key, slot) {
                Self::release_slot(previous);
            }
        }
        Ok(())
    }

    /// Return the value under `key`, inserting `default` first when absent.
    /// Idempotent on present keys in every access mode.
    pub fn setdefault<K: IntoKey, V: Into<Value>>(&self, key: K, default: V) -> Result<Value> {
        let key = key.into_key()?;
        let path = format!("{}.{key}", self.name()?);
        let slot = Self::materialize(&path, default.into())?;

        let guard = self.guard()?;
        let mut state = guard.borrow_mut();
        if let Some(existing) = state.entries.get(&key) {
            let value = self.read_slot(existing);
            drop(state);
            Self::release_slot(slot);
            return Ok(value);
        }
        Self::check(&state, Mutation::Insert, "setdefault")?;
        let value = self.read_slot(&slot);
        state.entries.insert(key, slot);
        Ok(value)
    }

    /// Add `delta` to the integer under `key` and return the new value. A
    /// missing key counts as 0 and is inserted when the access mode allows.
    pub fn increment<K: IntoKey>(&self, key: K, delta: i64) -> Result<i64> {
        let key = key.into_key()?;
        let guard = self.guard()?;
        let mut state = guard.borrow_mut();
        let current = match state.entries.get(&key) {
            Some(Slot::Leaf(Value::Int(n))) => Some(*n),
            Some(Slot::Leaf(Value::Null)) => Some(0),
            Some(_) => {
                return Err(OrchestraError::KeyType(format!(
                    "'{key}' does not hold an integer"
                )))
            }
            None => None,
        };
        let mutation = if current.is_some() {
            Mutation::Overwrite
        } else {
            Mutation::Insert
        };
        Self::check(&state, mutation, "increment")?;
        let next = current.unwrap_or(0).checked_add(delta).ok_or_else(|| {
            OrchestraError::KeyType(format!("'{key}' would overflow an integer"))
        })?;
        state.entries.insert(key, Slot::Leaf(Value::Int(next)));
        Ok(next)
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        let guard = self.guard()?;
        let keys = guard.borrow().entries.keys().cloned().collect();
        Ok(keys)
    }

    pub fn items(&self) -> Result<Vec<(String, Value)>> {
        let guard = self.guard()?;
        let state = guard.borrow();
        Ok(state
            .entries
            .iter()
            .map(|(key, slot)| (key.clone(), self.read_slot(slot)))
            .collect())
    }

    pub fn contains<K: IntoKey>(&self, key: K) -> Result<bool> {
        let key = key.into_key()?;
        let guard = self.guard()?;
        let present = guard.borrow().entries.contains_key(&key);
        Ok(present)
    }

    pub fn len(&self) -> Result<usize> {
        let guard = self.guard()?;
        let len = guard.borrow().entries.len();
        Ok(len)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Run `block` while holding this container's lock. Operations on `self`
    /// inside the block re-enter the lock; other processes block until the
    /// block returns.
    pub fn with_lock<R>(&self, block: impl FnOnce(&SharedDict) -> Result<R>) -> Result<R> {
        let _guard = self.guard()?;
        block(self)
    }

    /// Change the access mode of this container only.
    ///
    /// Permitted during construction and orchestrator init; once the store
    /// is sealed every call fails with `AccessPolicy`.
    pub fn set_access(&self, mode: AccessMode) -> Result<()> {
        self.ensure_unsealed()?;
        let guard = self.guard()?;
        let mut state = guard.borrow_mut();
        state.access.set::<SharedDict>(mode)
    }

    /// Change the access mode of this container and everything nested in it
    pub fn set_access_deep(&self, mode: AccessMode) -> Result<()> {
        self.ensure_unsealed()?;
        self.ensure_live()?;
        self.node.set_access_deep(mode)
    }

    fn ensure_unsealed(&self) -> Result<()> {
        if self.region.access_sealed.load(Ordering::Acquire) {
            return Err(OrchestraError::AccessPolicy {
                container: self.name().unwrap_or_default(),
                reason: "access modes are fixed after initialization".to_string(),
            });
        }
        Ok(())
    }

    /// Re-assign the container name on behalf of writer type `W`.
    /// Only the owning type may do so.
    pub fn rename_as<W: ?Sized>(&self, name: &str) -> Result<()> {
        let guard = self.guard()?;
        let mut state = guard.borrow_mut();
        state.name.set::<W>(name.to_string())
    }

    /// Identity attributes can never be removed
    pub fn delete_attribute(&self, attribute: &str) -> Result<()> {
        let guard = self.guard()?;
        let mut state = guard.borrow_mut();
        match attribute {
            "access" => state.access.delete(),
            _ => state.name.delete().map_err(|_| {
                OrchestraError::DeletionForbidden(attribute.to_string())
            }),
        }
    }

    /// Consistent point-in-time deep copy as a plain [`Value::Map`]
    pub fn snapshot(&self) -> Result<Value> {
        let _guard = self.guard()?;
        Ok(self.node.snapshot())
    }
}

impl PartialEq for SharedDict {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl fmt::Debug for SharedDict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedDict")
            .field("store", &self.region.name)
            .field("node", &Arc::as_ptr(&self.node))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::shared::SharedStore;

    fn fresh_store() -> SharedStore {
        SharedStore::create(&format!("dict-{}", uuid::Uuid::new_v4().simple())).unwrap()
    }

    fn map(pairs: &[(&str, i64)]) -> Value {
        Value::Map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), Value::Int(*v)))
                .collect(),
        )
    }

    #[test]
    fn test_set_then_get_round_trips() {
        let store = fresh_store();
        let root = store.root().unwrap();
        root.set("k", "v").unwrap();
        assert_eq!(root.get("k").unwrap(), Value::from("v"));
        assert_eq!(
            root.get("absent").unwrap_err().kind(),
            ErrorKind::KeyMissing
        );
        assert_eq!(
            root.get(Value::Int(1)).unwrap_err().kind(),
            ErrorKind::KeyType
        );
    }

    #[test]
    fn test_mapping_assignment_nests_and_shares() {
        let store = fresh_store();
        let root = store.root().unwrap();
        root.set("run", map(&[("a", 1)])).unwrap();

        let nested = root.dict("run").unwrap();
        nested.set("b", 2).unwrap();

        // A second read observes the mutation made through the first handle
        let again = root.dict("run").unwrap();
        assert_eq!(again.get("b").unwrap(), Value::Int(2));
        assert_eq!(again.name().unwrap(), format!("{}.run", store.name()));
        assert_eq!(nested, again);
    }

    #[test]
    fn test_assigning_a_handle_copies_it() {
        let store = fresh_store();
        let root = store.root().unwrap();
        root.set("a", map(&[("x", 1)])).unwrap();
        let a = root.dict("a").unwrap();
        root.set("b", Value::Dict(a.clone())).unwrap();

        a.set("x", 99).unwrap();
        assert_eq!(root.dict("b").unwrap().get("x").unwrap(), Value::Int(1));
    }

    #[test]
    fn test_tightened_forbids_structural_changes() {
        let store = fresh_store();
        let root = store.root().unwrap();
        root.update([("a", 1), ("b", 2)]).unwrap();
        root.set_access(AccessMode::Tightened).unwrap();

        root.set("a", 10).unwrap();
        assert_eq!(root.get("a").unwrap(), Value::Int(10));

        for err in [
            root.set("new_key", 1).unwrap_err(),
            root.delete("a").unwrap_err(),
            root.clear().unwrap_err(),
            root.pop("a", None).unwrap_err(),
            root.popitem().unwrap_err(),
            root.setdefault("c", 3).unwrap_err(),
            root.update([("a", 5), ("z", 6)]).unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::StructuralLock);
        }

        // Failed update committed nothing
        assert_eq!(root.get("a").unwrap(), Value::Int(10));
        assert_eq!(root.keys().unwrap(), vec!["a", "b"]);
        // setdefault on a present key is permitted and idempotent
        assert_eq!(root.setdefault("b", 7).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_locked_forbids_every_mutation() {
        let store = fresh_store();
        let root = store.root().unwrap();
        root.set("a", 1).unwrap();
        root.set_access(AccessMode::Locked).unwrap();

        assert_eq!(root.set("a", 2).unwrap_err().kind(), ErrorKind::StructuralLock);
        assert_eq!(root.increment("a", 1).unwrap_err().kind(), ErrorKind::StructuralLock);
        assert_eq!(root.update([("a", 3)]).unwrap_err().kind(), ErrorKind::StructuralLock);
        assert_eq!(root.items().unwrap(), vec![("a".to_string(), Value::Int(1))]);
    }

    #[test]
    fn test_popitem_on_empty_containers() {
        let store = fresh_store();
        let root = store.root().unwrap();
        assert_eq!(root.popitem().unwrap_err().kind(), ErrorKind::KeyMissing);
        root.set_access(AccessMode::Tightened).unwrap();
        assert_eq!(root.popitem().unwrap_err().kind(), ErrorKind::StructuralLock);
        root.set_access(AccessMode::Locked).unwrap();
        assert_eq!(root.popitem().unwrap_err().kind(), ErrorKind::StructuralLock);
    }

    #[test]
    fn test_popitem_is_lifo_and_pop_default() {
        let store = fresh_store();
        let root = store.root().unwrap();
        root.set("first", 1).unwrap();
        root.set("second", 2).unwrap();
        assert_eq!(root.popitem().unwrap(), ("second".to_string(), Value::Int(2)));
        assert_eq!(root.pop("missing", Some(Value::Int(0))).unwrap(), Value::Int(0));
        assert_eq!(root.pop("first", None).unwrap(), Value::Int(1));
        assert!(root.is_empty().unwrap());
    }

    #[test]
    fn test_removed_nested_handle_goes_stale() {
        let store = fresh_store();
        let root = store.root().unwrap();
        root.set("child", map(&[("x", 1)])).unwrap();
        let child = root.dict("child").unwrap();

        let popped = root.pop("child", None).unwrap();
        assert_eq!(popped, map(&[("x", 1)]));
        assert_eq!(child.get("x").unwrap_err().kind(), ErrorKind::BackingStoreGone);
    }

    #[test]
    fn test_access_is_sealed_after_init() {
        let store = fresh_store();
        let root = store.root().unwrap();
        root.set_access(AccessMode::Tightened).unwrap();
        store.seal_access();
        assert_eq!(
            root.set_access(AccessMode::Open).unwrap_err().kind(),
            ErrorKind::AccessPolicy
        );
        assert_eq!(root.access().unwrap(), AccessMode::Tightened);
    }

    #[test]
    fn test_set_access_deep_reaches_nested_containers() {
        let store = fresh_store();
        let root = store.root().unwrap();
        root.set("conf", map(&[("a", 1)])).unwrap();
        root.dict("conf").unwrap().set("inner", map(&[("b", 2)])).unwrap();
        root.dict("conf").unwrap().set_access_deep(AccessMode::Locked).unwrap();

        let inner = root.dict("conf").unwrap().dict("inner").unwrap();
        assert_eq!(inner.access().unwrap(), AccessMode::Locked);
        assert_eq!(inner.set("b", 3).unwrap_err().kind(), ErrorKind::StructuralLock);
    }

    #[test]
    fn test_identity_attributes_are_guarded() {
        struct Compartment;

        let store = fresh_store();
        let root = store.root().unwrap();
        assert_eq!(
            root.rename_as::<Compartment>("other").unwrap_err().kind(),
            ErrorKind::OwnershipViolation
        );
        root.rename_as::<SharedDict>("renamed").unwrap();
        assert_eq!(root.name().unwrap(), "renamed");
        assert_eq!(
            root.delete_attribute("name").unwrap_err().kind(),
            ErrorKind::DeletionForbidden
        );
        assert_eq!(
            root.delete_attribute("access").unwrap_err().kind(),
            ErrorKind::DeletionForbidden
        );
    }

    #[test]
    fn test_with_lock_reenters() {
        let store = fresh_store();
        let root = store.root().unwrap();
        root.set("n", 1).unwrap();
        let total = root
            .with_lock(|d| {
                let n = d.get("n")?.as_int().unwrap_or(0);
                d.set("n", n + 1)?;
                d.increment("n", 10)
            })
            .unwrap();
        assert_eq!(total, 12);
    }

    #[test]
    fn test_concurrent_updates_are_atomic() {
        let store = fresh_store();
        let root = store.root().unwrap();
        root.set("shared", Value::Map(BTreeMap::new())).unwrap();
        let target = root.dict("shared").unwrap();

        let left = target.clone();
        let right = target.clone();
        let t1 = std::thread::spawn(move || left.update([("a", 1), ("b", 2)]).unwrap());
        let t2 = std::thread::spawn(move || right.update([("b", 3), ("c", 4)]).unwrap());
        t1.join().unwrap();
        t2.join().unwrap();

        assert_eq!(target.get("a").unwrap(), Value::Int(1));
        assert_eq!(target.get("c").unwrap(), Value::Int(4));
        let b = target.get("b").unwrap();
        assert!(b == Value::Int(2) || b == Value::Int(3));
    }

    #[test]
    fn test_snapshot_is_a_deep_copy() {
        let store = fresh_store();
        let root = store.root().unwrap();
        root.set("nested", map(&[("x", 1)])).unwrap();
        let snapshot = root.snapshot().unwrap();
        root.dict("nested").unwrap().set("x", 2).unwrap();

        let Value::Map(top) = snapshot else {
            panic!("snapshot must be a plain map");
        };
        assert_eq!(top["nested"], map(&[("x", 1)]));
    }
}
