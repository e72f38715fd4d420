//! # Shared State
//!
//! The process-shared container and its building blocks: guarded identity
//! attributes, access modes, the value model, and the named backing store.

pub mod access;
pub mod dict;
pub mod guarded;
pub mod store;
pub mod value;

pub use access::AccessMode;
pub use dict::SharedDict;
pub use guarded::GuardedAttribute;
pub use store::{SharedStore, StoreRole};
pub use value::{IntoKey, Value};
