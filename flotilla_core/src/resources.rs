//! Scalar resource vectors used in offers and task descriptions.

use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Serialize};

/// A scalar cpu/memory resource vector.
///
/// Enough arithmetic for first-fit packing of tasks into offers: an offer's
/// resources shrink by [`checked_sub`](Resources::checked_sub) as tasks are
/// placed, and placement stops when the remainder no longer
/// [`contains`](Resources::contains) one task's worth.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Resources {
    /// Number of cpus (fractional allowed).
    pub cpus: f64,
    /// Memory in MiB.
    pub mem: f64,
}

impl Resources {
    /// Create a resource vector.
    #[must_use]
    pub const fn new(cpus: f64, mem: f64) -> Self {
        Self { cpus, mem }
    }

    /// Whether `other` fits entirely within these resources.
    #[must_use]
    pub fn contains(&self, other: &Resources) -> bool {
        self.cpus >= other.cpus && self.mem >= other.mem
    }

    /// Subtract `other`, returning `None` when it does not fit.
    #[must_use]
    pub fn checked_sub(&self, other: &Resources) -> Option<Resources> {
        if self.contains(other) {
            Some(Resources {
                cpus: self.cpus - other.cpus,
                mem: self.mem - other.mem,
            })
        } else {
            None
        }
    }
}

impl Add for Resources {
    type Output = Resources;

    fn add(self, rhs: Resources) -> Resources {
        Resources {
            cpus: self.cpus + rhs.cpus,
            mem: self.mem + rhs.mem,
        }
    }
}

impl fmt::Display for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpus:{};mem:{}", self.cpus, self.mem)
    }
}
