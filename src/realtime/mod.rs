pub mod bus;
pub mod events;
pub mod relay;

pub use bus::{RoomBus, SessionId};
pub use events::{BusEvent, ClientMessage, RoomId};
