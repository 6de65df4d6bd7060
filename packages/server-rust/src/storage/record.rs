//! Persisted record shape and the entity field codec.
//!
//! Entity fields are serialized to named `MsgPack` via `rmp-serde` and carried
//! as an opaque payload next to the record's key and surrogate id.

use banstick_core::{Entity, SurrogateId};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// One row of a kind's table, as the [`BackingStore`](super::BackingStore)
/// sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: SurrogateId,
    /// `Display` form of the entity's lookup key.
    pub key: String,
    /// Named `MsgPack` encoding of the entity fields.
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
}

/// Encodes entity fields for storage.
///
/// # Errors
///
/// Returns [`CacheError::Encode`] if the fields cannot be serialized.
pub fn encode_fields<E: Entity>(key: &E::Key, fields: &E) -> Result<Vec<u8>, CacheError> {
    rmp_serde::to_vec_named(fields).map_err(|source| CacheError::Encode {
        kind: E::KIND,
        key: key.to_string(),
        source,
    })
}

/// Decodes entity fields from a stored record.
///
/// # Errors
///
/// Returns [`CacheError::Decode`] if the payload is not a valid encoding of `E`.
pub fn decode_fields<E: Entity>(record: &StoredRecord) -> Result<E, CacheError> {
    rmp_serde::from_slice(&record.payload).map_err(|source| CacheError::Decode {
        kind: E::KIND,
        key: record.key.clone(),
        source,
    })
}
