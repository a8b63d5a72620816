//! Time-sortable identifiers.
//!
//! An [`Id`] packs milliseconds since [`EPOCH_MS`] into the upper 42 bits and a
//! 21-bit suffix into the lower bits, leaving the sign bit clear so the value
//! fits a SQLite INTEGER. Numeric order is creation order.
//!
//! Real IDs always carry a non-zero suffix. Suffix zero is reserved for
//! boundary IDs built with [`Id::boundary`], which mark "the start of this
//! millisecond" for range queries and never collide with a stored row.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// 2020-01-01T00:00:00Z in Unix milliseconds.
pub const EPOCH_MS: i64 = 1_577_836_800_000;

const SUFFIX_BITS: u32 = 21;
const SUFFIX_MASK: u64 = (1 << SUFFIX_BITS) - 1;
const TIMESTAMP_BITS: u32 = 42;
const MAX_TIMESTAMP: u64 = (1 << TIMESTAMP_BITS) - 1;

/// Fresh IDs start in the lower half of the suffix space so the per-process
/// increment has room before spilling into the next millisecond.
const RANDOM_SUFFIX_MAX: u64 = SUFFIX_MASK >> 1;

static GLOBAL: IdGenerator = IdGenerator::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Id(u64);

impl Id {
    /// Generate a new ID for a record created now.
    pub fn generate() -> Self {
        GLOBAL.next()
    }

    /// Boundary ID for `at`: greater than every ID from an earlier millisecond,
    /// less than every real ID from the same or a later millisecond.
    pub fn boundary(at: DateTime<Utc>) -> Self {
        Self(millis_since_epoch(at) << SUFFIX_BITS)
    }

    /// Sync watermark for now. Never lower than one already handed out, and
    /// never below the millisecond of the newest generated ID, even if the
    /// wall clock steps backwards.
    pub fn watermark() -> Self {
        GLOBAL.watermark()
    }

    /// The lowest possible ID, used as "beginning of time".
    pub const fn zero() -> Self {
        Self(0)
    }

    pub fn is_boundary(&self) -> bool {
        self.0 & SUFFIX_MASK == 0
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        let ms = (self.0 >> SUFFIX_BITS) as i64 + EPOCH_MS;
        DateTime::from_timestamp_millis(ms).unwrap_or_default()
    }

    pub fn as_i64(&self) -> i64 {
        self.0 as i64
    }

    /// Rebuild from a stored column value.
    pub fn from_i64(raw: i64) -> Self {
        Self(raw as u64)
    }
}

fn millis_since_epoch(at: DateTime<Utc>) -> u64 {
    (at.timestamp_millis() - EPOCH_MS).clamp(0, MAX_TIMESTAMP as i64) as u64
}

/// Lock-free ID source. Each generator hands out strictly increasing IDs;
/// independent generators agree on order whenever their clocks do.
#[derive(Debug)]
pub struct IdGenerator {
    last: AtomicU64,
}

impl IdGenerator {
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    pub fn next(&self) -> Id {
        self.next_at(Utc::now())
    }

    pub fn next_at(&self, at: DateTime<Utc>) -> Id {
        let base = millis_since_epoch(at) << SUFFIX_BITS;
        let candidate = base | rand::rng().random_range(1..=RANDOM_SUFFIX_MAX);

        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let mut next = candidate.max(last + 1);
            if next & SUFFIX_MASK == 0 {
                // rolled into the next millisecond's boundary slot
                next += 1;
            }
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return Id(next),
                Err(actual) => last = actual,
            }
        }
    }

    pub fn watermark(&self) -> Id {
        self.watermark_at(Utc::now())
    }

    /// Boundary for `at`, clamped up to the millisecond of the highest ID or
    /// watermark this generator has produced. The result is recorded so later
    /// IDs sort above it.
    pub fn watermark_at(&self, at: DateTime<Utc>) -> Id {
        let fresh = millis_since_epoch(at) << SUFFIX_BITS;

        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let ack = fresh.max(last & !SUFFIX_MASK);
            match self.last.compare_exchange_weak(
                last,
                last.max(ack),
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Id(ack),
                Err(actual) => last = actual,
            }
        }
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid id {0:?}")]
pub struct ParseIdError(pub String);

impl FromStr for Id {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // digits only: `u64::from_str` would also take a leading `+`
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseIdError(s.to_string()));
        }
        let raw: u64 = s.parse().map_err(|_| ParseIdError(s.to_string()))?;
        if raw > i64::MAX as u64 {
            return Err(ParseIdError(s.to_string()));
        }
        Ok(Self(raw))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// IDs travel as decimal strings; 63-bit integers do not survive JSON numbers
// in most clients.
impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor;

        impl Visitor<'_> for IdVisitor {
            type Value = Id;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a decimal id string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Id, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Id, E> {
                v.to_string().parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}
