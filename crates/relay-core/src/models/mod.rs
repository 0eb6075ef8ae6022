//! Shared data models

pub mod charger;
pub mod handshake;
pub mod record;
pub mod user;

pub use charger::{ChargerRow, ChargerStatus};
pub use handshake::HandshakeMeta;
pub use record::{Direction, MessageRecord};
pub use user::UserRecord;
