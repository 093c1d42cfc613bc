use super::*;
use serde_json::json;

#[test]
fn envelope_serializes_with_fixed_tag_and_raw_data() {
    let envelope = SignalingEnvelope {
        kind: SignalingKind::VoiceServerUpdate,
        data: json!({"guild_id": "41771983423143937", "token": "abc", "endpoint": "us-east1.example:443"}),
    };

    let encoded = serde_json::to_value(&envelope).expect("serialize");
    assert_eq!(encoded["type"], VOICE_SERVER_UPDATE);
    assert_eq!(encoded["data"]["token"], "abc");
}

#[test]
fn state_update_view_tolerates_null_channel() {
    let payload = json!({
        "guild_id": "41771983423143937",
        "channel_id": null,
        "user_id": "80351110224678912",
        "session_id": "90326bd25d71d39b9ef95b299e3872ff",
        "deaf": false,
        "mute": false
    });

    let update = VoiceStateUpdate::from_payload(&payload).expect("state update");
    assert_eq!(update.guild_id, Some(GuildId(41771983423143937)));
    assert_eq!(update.channel_id, None);
    assert_eq!(update.user_id, UserId(80351110224678912));
}

#[test]
fn server_update_view_allows_missing_endpoint() {
    let payload = json!({"guild_id": "7", "token": "t"});
    let update = VoiceServerUpdate::from_payload(&payload).expect("server update");
    assert_eq!(update.endpoint, None);
    assert_eq!(
        PlatformVoiceEvent::ServerUpdate(payload).guild_id(),
        Some(GuildId(7))
    );
}

#[test]
fn decodes_queue_end_frame() {
    let event = BackendEvent::decode(r#"{"op":"event","type":"QueueEndEvent","guildId":"42"}"#)
        .expect("decode");
    assert_eq!(event, BackendEvent::QueueEnd { guild_id: GuildId(42) });
    assert_eq!(event.guild_id(), Some(GuildId(42)));
}

#[test]
fn unrecognized_event_types_decode_as_unknown() {
    let event = BackendEvent::decode(r#"{"op":"event","type":"WebSocketClosedEvent","code":4006}"#)
        .expect("decode");
    assert_eq!(event, BackendEvent::Unknown);
}
