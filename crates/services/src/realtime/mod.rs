pub mod ack;
pub mod events;
pub mod presence;

pub use ack::AckTracker;
pub use events::ServerEvent;
pub use presence::{Connection, PresenceRegistry, RealtimeError};
