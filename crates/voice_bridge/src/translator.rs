//! Maps platform voice signaling onto the backend's envelope shape.

use serde_json::Value;
use shared::protocol::{PlatformVoiceEvent, SignalingEnvelope, SignalingKind};

pub fn translate(event: PlatformVoiceEvent) -> SignalingEnvelope {
    match event {
        PlatformVoiceEvent::ServerUpdate(data) => voice_server_update(data),
        PlatformVoiceEvent::StateUpdate(data) => voice_state_update(data),
    }
}

pub fn voice_server_update(data: Value) -> SignalingEnvelope {
    SignalingEnvelope {
        kind: SignalingKind::VoiceServerUpdate,
        data,
    }
}

pub fn voice_state_update(data: Value) -> SignalingEnvelope {
    SignalingEnvelope {
        kind: SignalingKind::VoiceStateUpdate,
        data,
    }
}

#[cfg(test)]
#[path = "tests/translator_tests.rs"]
mod tests;
