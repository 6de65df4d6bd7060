//! The [`Entity`] trait that every persistent kind implements.

use std::fmt::{Debug, Display};
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::types::{EntityKind, SurrogateId};

/// A durable record the cache can hold, load, flush, and preload.
///
/// The implementing type carries only the kind-specific fields. Identity is
/// derived through [`key`](Entity::key): naturally keyed kinds ignore the
/// surrogate id and return their natural key, surrogate-keyed kinds return
/// the id itself.
pub trait Entity: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Lookup key, unique within the kind.
    ///
    /// Its `Display` form is the key string handed to the backing store.
    type Key: Clone + Eq + Hash + Debug + Display + Send + Sync + 'static;

    /// Which kind this type represents.
    const KIND: EntityKind;

    /// Returns the lookup key for this record given its surrogate id.
    fn key(&self, id: SurrogateId) -> Self::Key;

    /// Key string to persist at creation, or `None` when the store should
    /// use the id it assigns.
    fn natural_key(&self) -> Option<String> {
        if Self::KIND.keyed_by_surrogate() {
            None
        } else {
            Some(self.key(SurrogateId::UNASSIGNED).to_string())
        }
    }
}
