pub mod registry;

pub use registry::{EndReason, Room, RoomRegistry, RoomStatus};
