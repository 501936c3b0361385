//! Resource algebra for CPU/memory vectors
//!
//! ## Table of Contents
//! - **ResourceVector**: fixed-arity (milli CPU, memory bytes, ephemeral
//!   storage) vector with add/sub/scale/compare operations

use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// A fixed-arity resource vector.
///
/// All values are non-negative. Addition overflow is a programmer error;
/// subtraction saturates at zero. The ephemeral-storage dimension defaults
/// to zero and only participates in comparisons when a pod or node actually
/// carries it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceVector {
    /// CPU in millicores (1000 = 1 core)
    pub milli_cpu: u64,
    /// Memory in bytes
    pub memory: u64,
    /// Ephemeral storage in bytes
    #[serde(default)]
    pub ephemeral_storage: u64,
}

impl ResourceVector {
    /// Create a CPU/memory vector with no ephemeral storage
    pub fn new(milli_cpu: u64, memory: u64) -> Self {
        Self {
            milli_cpu,
            memory,
            ephemeral_storage: 0,
        }
    }

    /// The zero vector
    pub fn zero() -> Self {
        Self::default()
    }

    /// Set ephemeral storage
    pub fn with_ephemeral_storage(mut self, bytes: u64) -> Self {
        self.ephemeral_storage = bytes;
        self
    }

    /// Elementwise subtraction, saturating at zero
    pub fn saturating_sub(&self, other: &ResourceVector) -> Self {
        Self {
            milli_cpu: self.milli_cpu.saturating_sub(other.milli_cpu),
            memory: self.memory.saturating_sub(other.memory),
            ephemeral_storage: self
                .ephemeral_storage
                .saturating_sub(other.ephemeral_storage),
        }
    }

    /// Elementwise scalar multiply, rounding toward zero.
    ///
    /// `factor` must be non-negative.
    pub fn scale(&self, factor: f64) -> Self {
        debug_assert!(factor >= 0.0, "scale factor must be non-negative");
        Self {
            milli_cpu: (self.milli_cpu as f64 * factor) as u64,
            memory: (self.memory as f64 * factor) as u64,
            ephemeral_storage: (self.ephemeral_storage as f64 * factor) as u64,
        }
    }

    /// Elementwise `self_i <= other_i`
    pub fn le(&self, other: &ResourceVector) -> bool {
        self.le_with_factor(other, 1.0)
    }

    /// Elementwise `self_i <= other_i * factor`.
    ///
    /// The slack factor lets callers express headroom checks
    /// (`factor < 1.0`) and oversubscribed capacity (`factor > 1.0`) with
    /// the same comparison.
    pub fn le_with_factor(&self, other: &ResourceVector, factor: f64) -> bool {
        self.milli_cpu as f64 <= other.milli_cpu as f64 * factor
            && self.memory as f64 <= other.memory as f64 * factor
            && self.ephemeral_storage as f64 <= other.ephemeral_storage as f64 * factor
    }

    /// Whether every dimension is zero
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

impl Add for ResourceVector {
    type Output = ResourceVector;

    fn add(self, rhs: ResourceVector) -> Self::Output {
        Self {
            milli_cpu: self.milli_cpu + rhs.milli_cpu,
            memory: self.memory + rhs.memory,
            ephemeral_storage: self.ephemeral_storage + rhs.ephemeral_storage,
        }
    }
}

impl AddAssign for ResourceVector {
    fn add_assign(&mut self, rhs: ResourceVector) {
        *self = *self + rhs;
    }
}
