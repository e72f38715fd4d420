//! Proptest strategies for heap and dictionary properties

use mproc_core::shared::{AccessMode, SharedDict, Value};
use proptest::prelude::*;

/// Application priorities, kept small so ties are common
pub fn priority_strategy() -> impl Strategy<Value = i64> {
    0i64..8
}

pub fn priorities_strategy() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(priority_strategy(), 1..40)
}

pub fn key_strategy() -> impl Strategy<Value = String> {
    "[a-f]"
}

pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        (-1_000i64..1_000).prop_map(Value::Int),
        any::<bool>().prop_map(Value::Bool),
        "[a-z]{0,8}".prop_map(Value::Str),
        Just(Value::Null),
    ]
}

pub fn access_mode_strategy() -> impl Strategy<Value = AccessMode> {
    prop_oneof![
        Just(AccessMode::Open),
        Just(AccessMode::Tightened),
        Just(AccessMode::Locked),
    ]
}

/// One mutating dictionary call
#[derive(Debug, Clone)]
pub enum DictOp {
    Set(String, Value),
    Delete(String),
    Pop(String),
    PopItem,
    Update(Vec<(String, Value)>),
    SetDefault(String, Value),
    Increment(String, i64),
    Clear,
}

impl DictOp {
    /// Apply the call, ignoring its result
    pub fn apply(&self, dict: &SharedDict) {
        let _ = match self {
            DictOp::Set(key, value) => dict.set(key, value.clone()),
            DictOp::Delete(key) => dict.delete(key),
            DictOp::Pop(key) => dict.pop(key, Some(Value::Null)).map(|_| ()),
            DictOp::PopItem => dict.popitem().map(|_| ()),
            DictOp::Update(items) => dict.update(items.clone()),
            DictOp::SetDefault(key, value) => dict.setdefault(key, value.clone()).map(|_| ()),
            DictOp::Increment(key, delta) => dict.increment(key, *delta).map(|_| ()),
            DictOp::Clear => dict.clear(),
        };
    }
}

pub fn dict_op_strategy() -> impl Strategy<Value = DictOp> {
    prop_oneof![
        (key_strategy(), scalar_strategy()).prop_map(|(k, v)| DictOp::Set(k, v)),
        key_strategy().prop_map(DictOp::Delete),
        key_strategy().prop_map(DictOp::Pop),
        Just(DictOp::PopItem),
        prop::collection::vec((key_strategy(), scalar_strategy()), 0..4).prop_map(DictOp::Update),
        (key_strategy(), scalar_strategy()).prop_map(|(k, v)| DictOp::SetDefault(k, v)),
        (key_strategy(), -5i64..5).prop_map(|(k, d)| DictOp::Increment(k, d)),
        Just(DictOp::Clear),
    ]
}

pub fn dict_ops_strategy() -> impl Strategy<Value = Vec<DictOp>> {
    prop::collection::vec(dict_op_strategy(), 0..24)
}

/// Initial integer contents keyed from the same alphabet as the ops
pub fn seed_strategy() -> impl Strategy<Value = Vec<(String, i64)>> {
    prop::collection::vec((key_strategy(), -100i64..100), 0..6)
}
