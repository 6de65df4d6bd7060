//! `BackingStore` implementations.
//!
//! [`MemoryBackingStore`] is always available and backs tests and
//! ephemeral runs. [`RedbBackingStore`] (feature `redb`, on by default) is an
//! embedded durable file; [`PostgresBackingStore`] (feature `postgres`) talks
//! to a shared database through a connection pool.

mod memory;
#[cfg(feature = "postgres")]
mod postgres_store;
#[cfg(feature = "redb")]
mod redb_store;

pub use memory::MemoryBackingStore;
#[cfg(feature = "postgres")]
pub use postgres_store::PostgresBackingStore;
#[cfg(feature = "redb")]
pub use redb_store::RedbBackingStore;
