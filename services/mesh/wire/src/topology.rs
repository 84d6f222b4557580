//! Link-state advertisement structures for the wire protocol.

use crate::message::NodeAddress;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Largest integer an `f64` holds exactly
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Edge weight between two directly connected nodes.
///
/// Any non-negative finite number. Integral costs are written to the wire as
/// JSON integers, fractional ones as JSON floats.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cost(f64);

/// Rejected cost value
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("cost must be a non-negative finite number, got {0}")]
pub struct InvalidCost(pub f64);

impl Cost {
    /// Zero cost
    pub const ZERO: Cost = Cost(0.0);
    /// Largest representable cost, used for unreachable distances
    pub const MAX: Cost = Cost(f64::MAX);

    /// Validate `value` as a link cost
    pub fn new(value: f64) -> Result<Self, InvalidCost> {
        if !value.is_finite() || value < 0.0 {
            return Err(InvalidCost(value));
        }
        // Normalizes -0.0
        Ok(Cost(value + 0.0))
    }

    /// Cost as a float
    pub fn value(self) -> f64 {
        self.0
    }

    /// Sum of two costs, clamped to [`Cost::MAX`]
    pub fn saturating_add(self, other: Cost) -> Cost {
        let sum = self.0 + other.0;
        if sum.is_finite() {
            Cost(sum)
        } else {
            Cost::MAX
        }
    }

    fn as_integer(self) -> Option<u64> {
        (self.0.fract() == 0.0 && self.0 <= MAX_EXACT_INTEGER).then_some(self.0 as u64)
    }
}

impl From<u32> for Cost {
    fn from(value: u32) -> Self {
        Cost(f64::from(value))
    }
}

impl PartialEq for Cost {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Cost {}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cost {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for Cost {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_integer() {
            Some(integer) => write!(f, "{}", integer),
            None => write!(f, "{}", self.0),
        }
    }
}

impl Serialize for Cost {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_integer() {
            Some(integer) => serializer.serialize_u64(integer),
            None => serializer.serialize_f64(self.0),
        }
    }
}

impl<'de> Deserialize<'de> for Cost {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Cost::new(value).map_err(serde::de::Error::custom)
    }
}

/// Direct neighbor costs advertised by one node
pub type NeighborCosts = BTreeMap<NodeAddress, Cost>;

/// Link-state advertisement carried in the body of an `info` message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advertisement {
    /// Per-origin sequence number; also embedded in the message id
    pub sequence: u64,
    /// Direct neighbors of the originator and the cost to reach each
    pub costs: NeighborCosts,
}

impl Advertisement {
    /// Create a new advertisement
    pub fn new(sequence: u64, costs: NeighborCosts) -> Self {
        Self { sequence, costs }
    }

    /// Check if this advertisement is newer than another based on sequence number
    pub fn is_newer_than(&self, other_seq: u64) -> bool {
        // Handle sequence number wraparound using signed comparison
        let diff = self.sequence.wrapping_sub(other_seq) as i64;
        diff > 0
    }

    /// Parse the JSON cost map used as an `info` payload
    pub fn parse_costs(payload: &str) -> Result<NeighborCosts, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Render the cost map as an `info` payload
    pub fn costs_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.costs)
    }
}
