//! Manager Integration Tests
//!
//! End-to-end scenarios against recording stubs: dispatch, serialization,
//! stale replacement, ICE buffering, watchdogs, outages, and disconnects.

mod common;

use common::*;
use confero_types::MediaKind;
use mcs_client::{FlowState, MediaServerEvent, MediaState, ServerStatusEvent};
use serde_json::json;

#[tokio::test(start_paused = true)]
async fn test_happy_publish() {
    let h = harness(MediaKind::Video, test_config(), true);

    h.manager
        .on_message(envelope(video_start("conn-1", "u1", "c1", "share")))
        .await;

    assert!(
        wait_until(|| !h.bus.frames_with_id("conn-1", "startResponse").is_empty()).await,
        "no startResponse published"
    );

    let responses = h.bus.frames_with_id("conn-1", "startResponse");
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["type"], "video");
    assert_eq!(responses[0]["role"], "share");
    assert_eq!(responses[0]["cameraId"], "c1");
    assert_eq!(responses[0]["sdpAnswer"], "answer-media-1");

    let session = h.manager.session("u1-c1-share").expect("session stored");
    assert_eq!(session.status(), confero_types::SessionStatus::Started);
    assert_eq!(h.manager.session_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied() {
    let h = harness(MediaKind::Video, test_config(), false);

    h.manager
        .on_message(envelope(video_start("conn-1", "u1", "c1", "share")))
        .await;

    assert!(
        wait_until(|| !h.bus.frames_with_id("conn-1", "videoError").is_empty()).await,
        "no error frame published"
    );

    let errors = h.bus.frames_with_id("conn-1", "videoError");
    assert_eq!(errors[0]["error"]["code"], 2201);
    assert_eq!(errors[0]["error"]["reason"], "PERMISSION_DENIED");
    assert!(h.bus.frames_with_id("conn-1", "startResponse").is_empty());
    assert_eq!(h.manager.session_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_ice_before_start_flushed_in_order() {
    let h = harness(MediaKind::Video, test_config(), true);

    for candidate in ["C1", "C2"] {
        h.manager
            .on_message(envelope(json!({
                "id": "onIceCandidate",
                "connectionId": "conn-1",
                "userId": "u1",
                "meetingId": "meeting-1",
                "voiceBridge": "72013",
                "role": "share",
                "cameraId": "c1",
                "candidate": candidate,
            })))
            .await;
    }

    assert_eq!(h.manager.pending_ice_len("u1-c1-share"), 2);

    h.manager
        .on_message(envelope(video_start("conn-1", "u1", "c1", "share")))
        .await;

    assert!(
        wait_until(|| h.mcs.ice_candidates().len() == 2).await,
        "candidates not flushed"
    );
    assert_eq!(h.mcs.ice_candidates(), vec![json!("C1"), json!("C2")]);
    assert_eq!(h.manager.pending_ice_len("u1-c1-share"), 0);

    // Forwarded exactly once each: no stragglers
    settle().await;
    assert_eq!(h.mcs.ice_candidates().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_ice_after_start_forwarded_directly() {
    let h = harness(MediaKind::Video, test_config(), true);

    h.manager
        .on_message(envelope(video_start("conn-1", "u1", "c1", "share")))
        .await;
    assert!(wait_until(|| !h.bus.frames_with_id("conn-1", "startResponse").is_empty()).await);

    h.manager
        .on_message(envelope(json!({
            "id": "onIceCandidate",
            "connectionId": "conn-1",
            "userId": "u1",
            "meetingId": "meeting-1",
            "voiceBridge": "72013",
            "role": "share",
            "cameraId": "c1",
            "candidate": "C3",
        })))
        .await;

    assert!(wait_until(|| h.mcs.ice_candidates() == vec![json!("C3")]).await);
    assert_eq!(h.manager.pending_ice_len("u1-c1-share"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stale_session_replacement() {
    let h = harness(MediaKind::Video, test_config(), true);

    h.manager
        .on_message(envelope(video_start("conn-1", "u1", "c1", "share")))
        .await;
    assert!(wait_until(|| h.bus.frames_with_id("conn-1", "startResponse").len() == 1).await);

    h.manager
        .on_message(envelope(video_start("conn-2", "u1", "c1", "share")))
        .await;
    assert!(wait_until(|| h.bus.frames_with_id("conn-2", "startResponse").len() == 1).await);

    assert_eq!(h.mcs.publish_count(), 2);
    assert_eq!(h.manager.session_count(), 1);

    // The stale session was unpublished before the replacement negotiated
    let calls = h.mcs.calls();
    let unpublish_at = calls
        .iter()
        .position(|c| matches!(c, McsCall::Unpublish { .. }))
        .expect("stale session unpublished");
    let second_publish_at = calls
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, McsCall::Publish { .. }))
        .map(|(i, _)| i)
        .nth(1)
        .unwrap();
    assert!(unpublish_at < second_publish_at);

    let session = h.manager.session("u1-c1-share").unwrap();
    assert_eq!(session.connection_id(), "conn-2");
}

#[tokio::test(start_paused = true)]
async fn test_mcs_outage_mid_session() {
    let h = harness(MediaKind::Video, test_config(), true);

    h.manager
        .on_message(envelope(video_start("conn-1", "u1", "c1", "share")))
        .await;
    assert!(wait_until(|| !h.bus.frames_with_id("conn-1", "startResponse").is_empty()).await);

    h.mcs.emit_server_event(ServerStatusEvent::McsDisconnected);

    assert!(
        wait_until(|| !h.bus.frames_with_id("conn-1", "videoError").is_empty()).await,
        "no outage error frame"
    );
    let errors = h.bus.frames_with_id("conn-1", "videoError");
    assert_eq!(errors[0]["error"]["code"], 2001);
    assert_eq!(errors[0]["error"]["reason"], "MEDIA_SERVER_OFFLINE");

    assert!(
        wait_until(|| h.manager.session_count() == 0).await,
        "session not closed after outage"
    );
}

#[tokio::test(start_paused = true)]
async fn test_connection_close_stops_sessions() {
    let h = harness(MediaKind::Video, test_config(), true);

    h.manager
        .on_message(envelope(video_start("conn-X", "u1", "c1", "viewer")))
        .await;
    h.manager
        .on_message(envelope(video_start("conn-X", "u2", "c1", "viewer")))
        .await;
    assert!(wait_until(|| h.bus.frames_with_id("conn-X", "startResponse").len() == 2).await);
    assert_eq!(h.bridges.refs("meeting-1"), 2);

    h.manager
        .on_message(envelope(json!({
            "id": "close",
            "connectionId": "conn-X",
        })))
        .await;

    assert!(
        wait_until(|| h.manager.session_count() == 0).await,
        "sessions not stopped"
    );
    assert!(wait_until(|| h.bridges.live("meeting-1") == 0).await);
    assert!(h.bus.frames_with_id("conn-X", "videoError").is_empty());
    assert!(h.bus.frames_with_id("conn-X", "webRTCAudioError").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_idempotent_stop() {
    let h = harness(MediaKind::Video, test_config(), true);

    h.manager
        .on_message(envelope(video_start("conn-1", "u1", "c1", "share")))
        .await;
    assert!(wait_until(|| !h.bus.frames_with_id("conn-1", "startResponse").is_empty()).await);

    let stop = json!({
        "id": "stop",
        "connectionId": "conn-1",
        "userId": "u1",
        "meetingId": "meeting-1",
        "voiceBridge": "72013",
        "role": "share",
        "cameraId": "c1",
    });

    h.manager.on_message(envelope(stop.clone())).await;
    assert!(wait_until(|| h.manager.session_count() == 0).await);
    let frames_after_first = h.bus.frames("conn-1").len();
    let unpublishes_after_first = h.mcs.unpublish_count();

    h.manager.on_message(envelope(stop)).await;
    settle().await;

    // Second stop is observationally a no-op
    assert_eq!(h.bus.frames("conn-1").len(), frames_after_first);
    assert_eq!(h.mcs.unpublish_count(), unpublishes_after_first);
}

#[tokio::test(start_paused = true)]
async fn test_subscriber_answer_without_session() {
    let h = harness(MediaKind::Video, test_config(), true);

    h.manager
        .on_message(envelope(json!({
            "id": "subscriberAnswer",
            "connectionId": "conn-1",
            "userId": "u1",
            "meetingId": "meeting-1",
            "voiceBridge": "72013",
            "role": "viewer",
            "cameraId": "c1",
            "answer": "v=0 answer",
        })))
        .await;
    settle().await;

    assert!(h.bus.frames("conn-1").is_empty());
    assert!(h.mcs.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dtmf_and_restart_ice_capabilities() {
    let h = harness(MediaKind::Audio, test_config(), true);

    h.manager
        .on_message(envelope(audio_start("conn-1", "u1", "sendrecv")))
        .await;
    assert!(wait_until(|| !h.bus.frames_with_id("conn-1", "startResponse").is_empty()).await);

    let publisher = h.manager.session("u1-72013-sendrecv").unwrap();
    assert_eq!(publisher.dtmf("123#").await.unwrap(), "123#");
    assert_eq!(
        publisher.restart_ice().await.unwrap().as_deref(),
        Some("restarted-sdp")
    );

    h.manager
        .on_message(envelope(audio_start("conn-2", "u2", "recvonly")))
        .await;
    assert!(wait_until(|| !h.bus.frames_with_id("conn-2", "startResponse").is_empty()).await);

    let consumer = h.manager.session("u2-72013-recvonly").unwrap();
    assert_eq!(consumer.dtmf("456").await.unwrap(), "");
    assert_eq!(consumer.restart_ice().await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn test_sendrecv_requires_full_audio() {
    let mut config = test_config();
    config.full_audio_enabled = false;
    let h = harness(MediaKind::Audio, config, true);

    h.manager
        .on_message(envelope(audio_start("conn-1", "u1", "sendrecv")))
        .await;

    assert!(wait_until(|| !h.bus.frames_with_id("conn-1", "webRTCAudioError").is_empty()).await);
    let errors = h.bus.frames_with_id("conn-1", "webRTCAudioError");
    assert_eq!(errors[0]["error"]["reason"], "SFU_INVALID_REQUEST");
    assert_eq!(h.manager.session_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_message_id_rejected() {
    let h = harness(MediaKind::Video, test_config(), true);

    h.manager
        .on_message(envelope(json!({
            "id": "mute",
            "connectionId": "conn-9",
        })))
        .await;

    assert!(wait_until(|| !h.bus.frames_with_id("conn-9", "videoError").is_empty()).await);
    let errors = h.bus.frames_with_id("conn-9", "videoError");
    assert_eq!(errors[0]["error"]["code"], 2200);
}

#[tokio::test(start_paused = true)]
async fn test_strict_header_parsing_rejects() {
    let mut config = test_config();
    config.ws_strict_header_parsing = true;
    let h = harness(MediaKind::Video, config, true);

    h.manager
        .on_message(envelope(json!({
            "id": "start",
            "connectionId": "conn-1",
            "header": { "userId": 42 },
        })))
        .await;

    assert!(wait_until(|| !h.bus.frames_with_id("conn-1", "videoError").is_empty()).await);
    assert_eq!(
        h.bus.frames_with_id("conn-1", "videoError")[0]["error"]["reason"],
        "SFU_INVALID_REQUEST"
    );
}

#[tokio::test(start_paused = true)]
async fn test_lenient_header_parsing_proceeds() {
    let h = harness(MediaKind::Video, test_config(), true);

    let mut start = video_start("conn-1", "u1", "c1", "share");
    start["header"] = json!({ "userId": 42 });
    h.manager.on_message(envelope(start)).await;

    assert!(wait_until(|| !h.bus.frames_with_id("conn-1", "startResponse").is_empty()).await);
}

#[tokio::test(start_paused = true)]
async fn test_offline_mcs_fails_start() {
    let h = harness(MediaKind::Video, test_config(), true);
    h.mcs
        .connected
        .store(false, std::sync::atomic::Ordering::SeqCst);

    h.manager
        .on_message(envelope(video_start("conn-1", "u1", "c1", "share")))
        .await;

    assert!(wait_until(|| !h.bus.frames_with_id("conn-1", "videoError").is_empty()).await);
    let errors = h.bus.frames_with_id("conn-1", "videoError");
    assert_eq!(errors[0]["error"]["code"], 2001);
    assert_eq!(h.manager.session_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_user_left_ejects_session() {
    let h = harness(MediaKind::Video, test_config(), true);

    h.manager
        .on_message(envelope(video_start("conn-1", "u1", "c1", "share")))
        .await;
    assert!(wait_until(|| !h.bus.frames_with_id("conn-1", "startResponse").is_empty()).await);

    h.bus.emit(
        "meeting.user-left.u1",
        json!({ "meetingId": "meeting-1", "userId": "u1" }),
    );

    assert!(
        wait_until(|| !h.bus.frames_with_id("conn-1", "close").is_empty()).await,
        "no close frame after eject"
    );
    assert_eq!(h.manager.session_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_media_flowing_success_frame() {
    let h = harness(MediaKind::Audio, test_config(), true);

    h.manager
        .on_message(envelope(audio_start("conn-1", "u1", "sendrecv")))
        .await;
    assert!(wait_until(|| !h.bus.frames_with_id("conn-1", "startResponse").is_empty()).await);

    // The client leg negotiated first
    let media_id = h.mcs.media_id_of_negotiation(1).unwrap();
    h.mcs.emit_media_event(
        &media_id,
        MediaServerEvent::MediaFlowInStateChange(FlowState::Flowing),
    );

    assert!(
        wait_until(|| !h.bus.frames_with_id("conn-1", "webRTCAudioSuccess").is_empty()).await
    );
    assert_eq!(
        h.bus.frames_with_id("conn-1", "webRTCAudioSuccess")[0]["success"],
        "MEDIA_FLOWING"
    );
}

#[tokio::test(start_paused = true)]
async fn test_flow_watchdog_expires() {
    let h = harness(MediaKind::Audio, test_config(), true);

    h.manager
        .on_message(envelope(audio_start("conn-1", "u1", "sendrecv")))
        .await;
    assert!(wait_until(|| !h.bus.frames_with_id("conn-1", "startResponse").is_empty()).await);

    let media_id = h.mcs.media_id_of_negotiation(1).unwrap();
    h.mcs.emit_media_event(
        &media_id,
        MediaServerEvent::MediaFlowInStateChange(FlowState::NotFlowing),
    );

    assert!(
        wait_until(|| !h.bus.frames_with_id("conn-1", "webRTCAudioError").is_empty()).await,
        "flow watchdog did not fire"
    );
    assert_eq!(
        h.bus.frames_with_id("conn-1", "webRTCAudioError")[0]["error"]["code"],
        2211
    );
}

#[tokio::test(start_paused = true)]
async fn test_state_watchdog_cleared_by_reconnect() {
    let h = harness(MediaKind::Audio, test_config(), true);

    h.manager
        .on_message(envelope(audio_start("conn-1", "u1", "sendrecv")))
        .await;
    assert!(wait_until(|| !h.bus.frames_with_id("conn-1", "startResponse").is_empty()).await);

    let media_id = h.mcs.media_id_of_negotiation(1).unwrap();
    h.mcs.emit_media_event(
        &media_id,
        MediaServerEvent::MediaStateChanged(MediaState::Disconnected),
    );
    settle().await;
    h.mcs.emit_media_event(
        &media_id,
        MediaServerEvent::MediaStateChanged(MediaState::Connected),
    );

    // Past the state timeout: the cleared watchdog must not fire
    tokio::time::sleep(std::time::Duration::from_millis(600)).await;
    assert!(h.bus.frames_with_id("conn-1", "webRTCAudioError").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_server_candidates_relayed_to_client() {
    let h = harness(MediaKind::Video, test_config(), true);

    h.manager
        .on_message(envelope(video_start("conn-1", "u1", "c1", "share")))
        .await;
    assert!(wait_until(|| !h.bus.frames_with_id("conn-1", "startResponse").is_empty()).await);

    let media_id = h.mcs.media_id_of_negotiation(1).unwrap();
    h.mcs
        .emit_media_event(&media_id, MediaServerEvent::OnIceCandidate(json!("S1")));

    assert!(wait_until(|| !h.bus.frames_with_id("conn-1", "iceCandidate").is_empty()).await);
    assert_eq!(
        h.bus.frames_with_id("conn-1", "iceCandidate")[0]["candidate"],
        "S1"
    );
}

#[tokio::test(start_paused = true)]
async fn test_audio_publisher_bridges_to_softswitch() {
    let h = harness(MediaKind::Audio, test_config(), true);

    h.manager
        .on_message(envelope(audio_start("conn-1", "u1", "sendrecv")))
        .await;
    assert!(wait_until(|| !h.bus.frames_with_id("conn-1", "startResponse").is_empty()).await);

    // Client leg, bridge leg, consume, and both connect directions
    let calls = h.mcs.calls();
    let client_media = h.mcs.media_id_of_negotiation(1).unwrap();
    let bridge_media = h.mcs.media_id_of_negotiation(2).unwrap();

    assert!(calls.iter().any(|c| matches!(
        c,
        McsCall::Consume { source, sink }
            if *source == bridge_media && *sink == client_media
    )));
    assert!(calls.iter().any(|c| matches!(
        c,
        McsCall::Connect { source, sink }
            if *source == client_media && *sink == bridge_media
    )));
    assert!(calls.iter().any(|c| matches!(
        c,
        McsCall::Connect { source, sink }
            if *source == bridge_media && *sink == client_media
    )));

    // The audio answer comes from the consume leg
    assert_eq!(
        h.bus.frames_with_id("conn-1", "startResponse")[0]["sdpAnswer"],
        format!("bridge-answer-{client_media}")
    );
}

#[tokio::test(start_paused = true)]
async fn test_publisher_reoffer_reuses_media_id() {
    let h = harness(MediaKind::Video, test_config(), true);

    h.manager
        .on_message(envelope(video_start("conn-1", "u1", "c1", "share")))
        .await;
    assert!(wait_until(|| !h.bus.frames_with_id("conn-1", "startResponse").is_empty()).await);
    let original = h.mcs.media_id_of_negotiation(1).unwrap();

    h.manager
        .on_message(envelope(json!({
            "id": "subscriberAnswer",
            "connectionId": "conn-1",
            "userId": "u1",
            "meetingId": "meeting-1",
            "voiceBridge": "72013",
            "role": "share",
            "cameraId": "c1",
            "answer": "v=0 renegotiated",
        })))
        .await;

    assert!(wait_until(|| h.mcs.publish_count() == 2).await);
    let calls = h.mcs.calls();
    let second = calls
        .iter()
        .filter_map(|c| match c {
            McsCall::Publish {
                media_id, reused, ..
            } => Some((media_id.clone(), *reused)),
            _ => None,
        })
        .nth(1)
        .unwrap();
    assert_eq!(second, (original, true));
}

#[tokio::test(start_paused = true)]
async fn test_subscriber_answer_renegotiates() {
    let h = harness(MediaKind::Video, test_config(), true);

    h.manager
        .on_message(envelope(video_start("conn-1", "u1", "c1", "viewer")))
        .await;
    assert!(wait_until(|| !h.bus.frames_with_id("conn-1", "startResponse").is_empty()).await);
    let subscribes_before = h
        .mcs
        .calls()
        .iter()
        .filter(|c| matches!(c, McsCall::Subscribe { .. }))
        .count();

    h.manager
        .on_message(envelope(json!({
            "id": "subscriberAnswer",
            "connectionId": "conn-1",
            "userId": "u1",
            "meetingId": "meeting-1",
            "voiceBridge": "72013",
            "role": "viewer",
            "cameraId": "c1",
            "answer": "v=0 new-answer",
        })))
        .await;

    assert!(
        wait_until(|| {
            h.mcs
                .calls()
                .iter()
                .filter(|c| matches!(c, McsCall::Subscribe { .. }))
                .count()
                > subscribes_before
        })
        .await
    );
}
