//! Bans, keyed by surrogate id.

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::types::{EntityKind, SurrogateId};

/// A ban, optionally tied to the IP, proxy record, or shared connection
/// that caused it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ban {
    pub created: i64,
    pub ip: Option<SurrogateId>,
    pub proxy: Option<SurrogateId>,
    pub share: Option<SurrogateId>,
    /// Issued by hand rather than by an automatic rule.
    pub admin: bool,
    pub message: Option<String>,
    /// `None` means permanent.
    pub ends: Option<i64>,
}

impl Ban {
    /// Creates a permanent manual ban with a message.
    #[must_use]
    pub fn admin(created: i64, message: impl Into<String>) -> Self {
        Self {
            created,
            ip: None,
            proxy: None,
            share: None,
            admin: true,
            message: Some(message.into()),
            ends: None,
        }
    }

    /// Creates an automatic ban against an IP record.
    #[must_use]
    pub fn for_ip(created: i64, ip: SurrogateId, ends: Option<i64>) -> Self {
        Self {
            created,
            ip: Some(ip),
            proxy: None,
            share: None,
            admin: false,
            message: None,
            ends,
        }
    }

    /// Whether the ban still applies at `now`.
    #[must_use]
    pub fn is_active(&self, now: i64) -> bool {
        !matches!(self.ends, Some(ends) if now >= ends)
    }

    /// Sets the end time.
    pub fn expire_at(&mut self, when: i64) {
        self.ends = Some(when);
    }
}

impl Entity for Ban {
    type Key = SurrogateId;
    const KIND: EntityKind = EntityKind::Ban;

    fn key(&self, id: SurrogateId) -> SurrogateId {
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_ban_is_always_active() {
        let ban = Ban::admin(1_000, "griefing");
        assert!(ban.is_active(i64::MAX));
        assert!(ban.admin);
    }

    #[test]
    fn timed_ban_ends() {
        let mut ban = Ban::for_ip(1_000, SurrogateId(4), Some(2_000));
        assert!(ban.is_active(1_999));
        assert!(!ban.is_active(2_000));
        ban.expire_at(3_000);
        assert!(ban.is_active(2_500));
    }

    #[test]
    fn surrogate_keyed() {
        let ban = Ban::admin(0, "x");
        assert_eq!(ban.key(SurrogateId(12)), SurrogateId(12));
        assert_eq!(ban.natural_key(), None);
    }
}
