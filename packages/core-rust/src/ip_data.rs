//! Geolocation and proxy-detection data about an IP, keyed by surrogate id.

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::types::{EntityKind, SurrogateId};

/// Lookup results for one [`Ip`](crate::Ip) record from an external source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpData {
    pub ip: SurrogateId,
    pub created: i64,
    /// Cleared when a newer lookup supersedes this one.
    pub valid: bool,
    pub continent: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub postal: Option<String>,
    pub latitude: Option<f32>,
    pub longitude: Option<f32>,
    pub domain: Option<String>,
    pub provider: Option<String>,
    pub registered_as: Option<String>,
    pub connection: Option<String>,
    /// Likelihood the address is a proxy or VPN, 0.0 to 3.0 as reported upstream.
    pub proxy_score: f32,
    pub source: Option<String>,
    pub comment: Option<String>,
}

impl IpData {
    /// A valid, otherwise empty record for `ip`.
    #[must_use]
    pub fn new(ip: SurrogateId, created: i64) -> Self {
        Self {
            ip,
            created,
            valid: true,
            ..Self::default()
        }
    }

    /// Marks the record as superseded. Returns `false` if it already was.
    pub fn invalidate(&mut self) -> bool {
        std::mem::replace(&mut self.valid, false)
    }

    #[must_use]
    pub fn is_proxy(&self, threshold: f32) -> bool {
        self.valid && self.proxy_score >= threshold
    }
}

impl Entity for IpData {
    type Key = SurrogateId;
    const KIND: EntityKind = EntityKind::IpData;

    fn key(&self, id: SurrogateId) -> SurrogateId {
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalidate_once() {
        let mut data = IpData::new(SurrogateId(3), 100);
        assert!(data.valid);
        assert!(data.invalidate());
        assert!(!data.invalidate());
    }

    #[test]
    fn invalid_records_are_never_proxies() {
        let mut data = IpData::new(SurrogateId(3), 100);
        data.proxy_score = 2.5;
        assert!(data.is_proxy(2.0));
        data.invalidate();
        assert!(!data.is_proxy(2.0));
    }

    #[test]
    fn msgpack_keeps_optional_fields() {
        let mut data = IpData::new(SurrogateId(3), 100);
        data.country = Some("NZ".to_string());
        let bytes = rmp_serde::to_vec_named(&data).unwrap();
        let back: IpData = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(back, data);
    }
}
