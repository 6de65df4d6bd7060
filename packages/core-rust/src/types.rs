use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Returns the current wall-clock time as milliseconds since the Unix epoch.
///
/// Millisecond timestamps fit comfortably in i64 until the year 292 million.
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Store-assigned, monotonically increasing numeric identifier.
///
/// Used for cursoring through a kind's records in id order. For kinds
/// without a natural key it doubles as the lookup key.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SurrogateId(pub u64);

impl SurrogateId {
    /// Placeholder for records the store has not assigned an id to yet.
    /// Stores hand out ids starting at 1.
    pub const UNASSIGNED: Self = Self(0);

    /// Returns the raw numeric value.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    /// Returns the id that follows this one.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for SurrogateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SurrogateId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// The six kinds of durable record managed by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Player,
    Ban,
    Session,
    Share,
    Ip,
    IpData,
}

impl EntityKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Player,
        Self::Ban,
        Self::Session,
        Self::Share,
        Self::Ip,
        Self::IpData,
    ];

    /// Stable lowercase name used for table names, log fields and metric labels.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Ban => "ban",
            Self::Session => "session",
            Self::Share => "share",
            Self::Ip => "ip",
            Self::IpData => "ip_data",
        }
    }

    /// Whether records of this kind are looked up by their surrogate id
    /// rather than by a natural key.
    #[must_use]
    pub fn keyed_by_surrogate(self) -> bool {
        !matches!(self, Self::Player | Self::Ip)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
