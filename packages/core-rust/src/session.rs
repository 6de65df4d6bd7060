//! Play sessions, keyed by surrogate id.

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::types::{EntityKind, SurrogateId};

/// One continuous connection of a player from one IP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub player: SurrogateId,
    pub ip: SurrogateId,
    pub joined: i64,
    /// `None` while the player is still online.
    pub left: Option<i64>,
}

impl Session {
    #[must_use]
    pub fn begin(player: SurrogateId, ip: SurrogateId, joined: i64) -> Self {
        Self {
            player,
            ip,
            joined,
            left: None,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.left.is_none()
    }

    /// Closes the session. A session already closed keeps its first end time.
    pub fn end(&mut self, now: i64) {
        if self.left.is_none() {
            self.left = Some(now.max(self.joined));
        }
    }

    /// Whether the two sessions were online at the same time.
    /// Open sessions extend to infinity.
    #[must_use]
    pub fn overlaps(&self, other: &Session) -> bool {
        let self_end = self.left.unwrap_or(i64::MAX);
        let other_end = other.left.unwrap_or(i64::MAX);
        self.joined < other_end && other.joined < self_end
    }
}

impl Entity for Session {
    type Key = SurrogateId;
    const KIND: EntityKind = EntityKind::Session;

    fn key(&self, id: SurrogateId) -> SurrogateId {
        id
    }
}
