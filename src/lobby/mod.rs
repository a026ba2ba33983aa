//! Room admission and participant bookkeeping

pub mod registry;

pub use registry::{JoinError, JoinRequest, RoomInfo, RoomRegistry};
