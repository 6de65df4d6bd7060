//! `BanStick` Core — entity kinds, identities, and the persistent data model.
//!
//! Every durable record the cache manages is one of six [`EntityKind`]s. Each
//! kind implements [`Entity`], which ties its fields to a lookup key and lets
//! the storage layer treat all six uniformly.

pub mod ban;
pub mod entity;
pub mod ip;
pub mod ip_data;
pub mod player;
pub mod session;
pub mod share;
pub mod types;

pub use ban::Ban;
pub use entity::Entity;
pub use ip::{Ip, IpKey};
pub use ip_data::IpData;
pub use player::Player;
pub use session::Session;
pub use share::Share;
pub use types::{now_millis, EntityKind, SurrogateId};

