//! Shared-connection records, keyed by surrogate id.

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::types::{EntityKind, SurrogateId};

/// Two players seen on the same connection during overlapping sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Share {
    pub first_player: SurrogateId,
    pub second_player: SurrogateId,
    pub first_session: SurrogateId,
    pub second_session: SurrogateId,
    pub created: i64,
    pub pardoned: Option<i64>,
}

impl Share {
    #[must_use]
    pub fn new(
        (first_player, first_session): (SurrogateId, SurrogateId),
        (second_player, second_session): (SurrogateId, SurrogateId),
        created: i64,
    ) -> Self {
        Self {
            first_player,
            second_player,
            first_session,
            second_session,
            created,
            pardoned: None,
        }
    }

    #[must_use]
    pub fn is_pardoned(&self) -> bool {
        self.pardoned.is_some()
    }

    /// Marks the share as pardoned. Returns `false` if it already was.
    pub fn pardon(&mut self, now: i64) -> bool {
        if self.pardoned.is_some() {
            return false;
        }
        self.pardoned = Some(now);
        true
    }

    #[must_use]
    pub fn involves(&self, player: SurrogateId) -> bool {
        self.first_player == player || self.second_player == player
    }
}

impl Entity for Share {
    type Key = SurrogateId;
    const KIND: EntityKind = EntityKind::Share;

    fn key(&self, id: SurrogateId) -> SurrogateId {
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn share() -> Share {
        Share::new(
            (SurrogateId(1), SurrogateId(10)),
            (SurrogateId(2), SurrogateId(20)),
            500,
        )
    }

    #[test]
    fn pardon_once() {
        let mut s = share();
        assert!(s.pardon(600));
        assert!(!s.pardon(700));
        assert_eq!(s.pardoned, Some(600));
    }

    #[test]
    fn involves_either_player() {
        let s = share();
        assert!(s.involves(SurrogateId(1)));
        assert!(s.involves(SurrogateId(2)));
        assert!(!s.involves(SurrogateId(3)));
    }
}
