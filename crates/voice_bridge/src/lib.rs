pub mod commands;
pub mod controller;
pub mod error;
mod listener;
pub mod registry;
pub mod translator;

pub use controller::{BridgeConfig, ConnectionState, RoomSession, VoiceController, VoicePlatform};
pub use error::VoiceBridgeError;
pub use registry::{SessionHandle, SessionRegistry};

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
