//! Chain points
//!
//! A point identifies a position on the chain: a slot number paired with the
//! hash of the block header minted in that slot, or the distinguished origin.
//! Points are totally ordered by slot; the origin sorts before everything.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Absolute slot number.
pub type Slot = u64;

/// Length of a block header hash, in hex digits.
pub const HEADER_HASH_HEX_LEN: usize = 64;

/// A position on the chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Point {
    /// The start of the chain, before any block.
    Origin,
    /// A concrete block position.
    At {
        /// Absolute slot of the block.
        slot_no: Slot,
        /// Hex-encoded hash of the block header.
        header_hash: String,
    },
}

/// Error raised when parsing a point from its text form.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed point: expected 'origin' or '<slot>.<64-digit hex hash>'")]
pub struct MalformedPoint;

impl Point {
    /// Build a concrete point from a slot and a hex header hash.
    pub fn at(slot_no: Slot, header_hash: impl Into<String>) -> Self {
        Point::At {
            slot_no,
            header_hash: header_hash.into().to_lowercase(),
        }
    }

    /// Slot of this point; origin has no slot.
    pub fn slot_no(&self) -> Option<Slot> {
        match self {
            Point::Origin => None,
            Point::At { slot_no, .. } => Some(*slot_no),
        }
    }

    /// Slot of this point, treating origin as slot 0.
    pub fn slot_or_zero(&self) -> Slot {
        self.slot_no().unwrap_or(0)
    }

    /// Header hash of this point, if any.
    pub fn header_hash(&self) -> Option<&str> {
        match self {
            Point::Origin => None,
            Point::At { header_hash, .. } => Some(header_hash),
        }
    }
}

impl Ord for Point {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Point::Origin, Point::Origin) => Ordering::Equal,
            (Point::Origin, Point::At { .. }) => Ordering::Less,
            (Point::At { .. }, Point::Origin) => Ordering::Greater,
            (Point::At { slot_no: a, .. }, Point::At { slot_no: b, .. }) => a.cmp(b),
        }
    }
}

impl PartialOrd for Point {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Point::Origin => write!(f, "origin"),
            Point::At {
                slot_no,
                header_hash,
            } => write!(f, "{}.{}", slot_no, header_hash),
        }
    }
}

impl FromStr for Point {
    type Err = MalformedPoint;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "origin" {
            return Ok(Point::Origin);
        }
        let (slot, hash) = s.split_once('.').ok_or(MalformedPoint)?;
        let slot_no: Slot = slot.parse().map_err(|_| MalformedPoint)?;
        if hash.len() != HEADER_HASH_HEX_LEN || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(MalformedPoint);
        }
        Ok(Point::at(slot_no, hash))
    }
}

impl Serialize for Point {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Point {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
