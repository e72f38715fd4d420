use serde::{Deserialize, Serialize};
use std::fmt;

/// Mutation rights of a [`SharedDict`](super::SharedDict).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// Every operation is permitted
    Open,
    /// Keys are fixed; values of existing keys may change
    Tightened,
    /// No mutation at all
    Locked,
}

/// Structural effect of a mutating operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mutation {
    Overwrite,
    Insert,
    Remove,
}

impl AccessMode {
    pub(crate) fn permits(self, mutation: Mutation) -> bool {
        match self {
            AccessMode::Open => true,
            AccessMode::Tightened => mutation == Mutation::Overwrite,
            AccessMode::Locked => false,
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessMode::Open => "open",
            AccessMode::Tightened => "tightened",
            AccessMode::Locked => "locked",
        };
        f.write_str(name)
    }
}
