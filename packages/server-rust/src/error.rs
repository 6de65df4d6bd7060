//! Error type for gameplay-path cache operations.

use banstick_core::EntityKind;

/// Failure of a cache lookup, creation, or startup step.
///
/// A store failure is always surfaced as [`CacheError::Store`], never
/// collapsed into a "not found" result.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("{kind} store operation failed: {source}")]
    Store {
        kind: EntityKind,
        source: anyhow::Error,
    },
    #[error("failed to encode {kind} record {key}: {source}")]
    Encode {
        kind: EntityKind,
        key: String,
        source: rmp_serde::encode::Error,
    },
    #[error("failed to decode {kind} record {key}: {source}")]
    Decode {
        kind: EntityKind,
        key: String,
        source: rmp_serde::decode::Error,
    },
    #[error("{kind} record {key} already exists")]
    DuplicateKey { kind: EntityKind, key: String },
    #[error("{kind} factory produced key {actual}, expected {expected}")]
    KeyMismatch {
        kind: EntityKind,
        expected: String,
        actual: String,
    },
    #[error("{kind} records are keyed by surrogate id; use create() instead")]
    NaturalKeyRequired { kind: EntityKind },
    #[error("startup failed: {0}")]
    Startup(#[source] anyhow::Error),
}

impl CacheError {
    pub(crate) fn store(kind: EntityKind) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::Store { kind, source }
    }

    /// Whether the failure came from the backing store (and may succeed on retry).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_are_transient() {
        let err = CacheError::store(EntityKind::Ban)(anyhow::anyhow!("connection reset"));
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "ban store operation failed: connection reset");
    }

    #[test]
    fn duplicate_key_is_not_transient() {
        let err = CacheError::DuplicateKey {
            kind: EntityKind::Player,
            key: "abc".to_string(),
        };
        assert!(!err.is_transient());
    }
}
