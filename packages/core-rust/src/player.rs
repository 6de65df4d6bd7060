//! Players, keyed by their account UUID.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::Entity;
use crate::types::{EntityKind, SurrogateId};

/// A player who has joined at least once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    uuid: Uuid,
    /// Last known display name.
    pub name: String,
    /// When the player was first recorded (millis since epoch).
    pub first_seen: i64,
    /// Ban currently applied to this player, if any.
    pub ban: Option<SurrogateId>,
    /// Exempts the player from IP bans until this time.
    pub ip_pardon_time: Option<i64>,
    /// Exempts the player from proxy bans until this time.
    pub proxy_pardon_time: Option<i64>,
    /// Exempts the player from shared-connection bans until this time.
    pub shared_pardon_time: Option<i64>,
}

impl Player {
    /// Creates an unbanned, unpardoned player.
    #[must_use]
    pub fn new(uuid: Uuid, name: impl Into<String>, first_seen: i64) -> Self {
        Self {
            uuid,
            name: name.into(),
            first_seen,
            ban: None,
            ip_pardon_time: None,
            proxy_pardon_time: None,
            shared_pardon_time: None,
        }
    }

    /// Account identity. Fixed at construction; it is the cache key.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    #[must_use]
    pub fn is_banned(&self) -> bool {
        self.ban.is_some()
    }

    /// Applies or lifts a ban. Returns the previous ban.
    pub fn set_ban(&mut self, ban: Option<SurrogateId>) -> Option<SurrogateId> {
        std::mem::replace(&mut self.ban, ban)
    }

    /// Pardons the player from IP bans until `until`.
    pub fn pardon_ip(&mut self, until: i64) {
        self.ip_pardon_time = Some(until);
    }

    /// Whether an IP pardon is in effect at `now`.
    #[must_use]
    pub fn ip_pardoned_at(&self, now: i64) -> bool {
        self.ip_pardon_time.is_some_and(|until| now < until)
    }
}

impl Entity for Player {
    type Key = Uuid;
    const KIND: EntityKind = EntityKind::Player;

    fn key(&self, _id: SurrogateId) -> Uuid {
        self.uuid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_key_is_uuid() {
        let uuid = Uuid::new_v4();
        let player = Player::new(uuid, "steve", 1_000);
        assert_eq!(player.key(SurrogateId(9)), uuid);
        assert_eq!(player.natural_key(), Some(uuid.to_string()));
    }

    #[test]
    fn uuid_survives_encoding_while_private() {
        let player = Player::new(Uuid::new_v4(), "steve", 1_000);
        let bytes = rmp_serde::to_vec_named(&player).unwrap();
        let decoded: Player = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(decoded.uuid(), player.uuid());
        assert_eq!(decoded, player);
    }

    #[test]
    fn set_ban_returns_previous() {
        let mut player = Player::new(Uuid::new_v4(), "alex", 1_000);
        assert!(!player.is_banned());
        assert_eq!(player.set_ban(Some(SurrogateId(3))), None);
        assert!(player.is_banned());
        assert_eq!(player.set_ban(None), Some(SurrogateId(3)));
        assert!(!player.is_banned());
    }

    #[test]
    fn ip_pardon_expires() {
        let mut player = Player::new(Uuid::new_v4(), "alex", 1_000);
        assert!(!player.ip_pardoned_at(2_000));
        player.pardon_ip(5_000);
        assert!(player.ip_pardoned_at(4_999));
        assert!(!player.ip_pardoned_at(5_000));
    }
}
