use super::*;
use crate::test_support::{wait_for_state, Harness};
use shared::error::ErrorCategory;

#[tokio::test]
async fn join_without_voice_channel_is_rejected_before_any_call() {
    let harness = Harness::new();

    let err = join(
        &harness.controller,
        CommandContext {
            guild_id: GuildId(1),
            author_voice_channel: None,
        },
    )
    .await
    .expect_err("not in voice");

    assert!(matches!(err, VoiceBridgeError::NotInVoiceChannel));
    assert!(harness.platform.calls().is_empty());
    assert_eq!(harness.connector.connect_calls(), 0);
    assert_eq!(
        harness.controller.state(GuildId(1)).await,
        ConnectionState::Disconnected
    );
    assert!(harness.controller.room_session(GuildId(1)).await.is_none());
}

#[tokio::test]
async fn join_waits_for_platform_confirmation() {
    let harness = Harness::new();
    let controller = harness.controller.clone();
    let pending = tokio::spawn(async move {
        join(
            &controller,
            CommandContext {
                guild_id: GuildId(1),
                author_voice_channel: Some(ChannelId(11)),
            },
        )
        .await
    });

    wait_for_state(&harness.controller, GuildId(1), ConnectionState::Connecting).await;
    harness.confirm_join(1, 11).await;

    let session = pending.await.expect("join task").expect("joined");
    assert_eq!(session.channel_id, Some(ChannelId(11)));
    assert!(session.connected);
}

#[tokio::test]
async fn join_times_out_without_confirmation() {
    let harness = Harness::new();

    let err = join(
        &harness.controller,
        CommandContext {
            guild_id: GuildId(1),
            author_voice_channel: Some(ChannelId(11)),
        },
    )
    .await
    .expect_err("timeout");

    assert!(matches!(err, VoiceBridgeError::JoinTimeout { .. }));
    assert_eq!(
        harness.controller.state(GuildId(1)).await,
        ConnectionState::Disconnected
    );
}

#[tokio::test]
async fn leave_requires_an_active_connection() {
    let harness = Harness::new();

    let err = leave(&harness.controller, GuildId(5)).await.expect_err("idle");
    assert!(matches!(err, VoiceBridgeError::NotConnected(GuildId(5))));

    harness
        .controller
        .connect(GuildId(5), ChannelId(50))
        .await
        .expect("connect");
    leave(&harness.controller, GuildId(5)).await.expect("leave");
    assert_eq!(harness.platform.calls().last(), Some(&(GuildId(5), None)));
}

#[test]
fn failures_map_to_user_facing_replies() {
    let user = report_failure(GuildId(1), &VoiceBridgeError::NotInVoiceChannel);
    assert_eq!(user.category, ErrorCategory::UserInput);

    let connectivity = report_failure(
        GuildId(1),
        &VoiceBridgeError::ConnectionDropped(GuildId(1)),
    );
    assert_eq!(connectivity.category, ErrorCategory::Connectivity);
    assert_ne!(user.message, connectivity.message);
}
