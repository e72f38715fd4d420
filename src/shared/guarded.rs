//! Guarded attributes bind a field's mutability to a named owner type.
//!
//! Reads are unrestricted. A write succeeds only when the writer's runtime
//! type name equals the owner recorded at construction; deletion always fails.
//! Wrapping a container in another type therefore cannot rebind its identity
//! fields.

use std::any::type_name;
use std::fmt;

use crate::error::{OrchestraError, Result};

#[derive(Clone, PartialEq)]
pub struct GuardedAttribute<T> {
    attribute: &'static str,
    owner: &'static str,
    value: T,
}

impl<T> GuardedAttribute<T> {
    /// Bind `attribute` to the owner type `O`
    pub fn new<O: ?Sized>(attribute: &'static str, value: T) -> Self {
        Self {
            attribute,
            owner: type_name::<O>(),
            value,
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn attribute(&self) -> &'static str {
        self.attribute
    }

    pub fn owner(&self) -> &'static str {
        self.owner
    }

    /// Write as writer type `W`
    pub fn set<W: ?Sized>(&mut self, value: T) -> Result<()> {
        self.set_as(type_name::<W>(), value)
    }

    /// Write on behalf of the writer named `writer`
    pub fn set_as(&mut self, writer: &str, value: T) -> Result<()> {
        if writer != self.owner {
            return Err(OrchestraError::OwnershipViolation {
                attribute: self.attribute.to_string(),
                owner: self.owner.to_string(),
                writer: writer.to_string(),
            });
        }
        self.value = value;
        Ok(())
    }

    pub fn delete(&mut self) -> Result<()> {
        Err(OrchestraError::DeletionForbidden(self.attribute.to_string()))
    }
}

impl<T: fmt::Debug> fmt::Debug for GuardedAttribute<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedAttribute")
            .field("attribute", &self.attribute)
            .field("owner", &self.owner)
            .field("value", &self.value)
            .finish()
    }
}
