//! Core types for the record store

use serde::{Deserialize, Serialize};
use std::fmt;

/// Snapshot generation (strictly increasing across publishes)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Generation(pub u64);

impl Generation {
    /// Generation of the empty store a database starts with
    pub const INITIAL: Generation = Generation(0);

    pub fn new(generation: u64) -> Self {
        Self(generation)
    }

    /// The following generation, or `None` once the counter is exhausted
    pub fn next(&self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen_{}", self.0)
    }
}

/// Dense position of a record inside a store
pub type RecordNo = u32;
