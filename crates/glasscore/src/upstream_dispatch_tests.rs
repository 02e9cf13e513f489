use super::*;
use crate::test_support::session_with_package;

fn frames_of_type<'a>(sent: &'a [serde_json::Value], ty: &str) -> Vec<&'a serde_json::Value> {
    sent.iter().filter(|f| f.get("type").and_then(|t| t.as_str()) == Some(ty)).collect()
}

#[tokio::test]
async fn unknown_top_level_datetime_is_cached() {
    let (session, _channel) = session_with_package("com.x", false);
    dispatch(&session, serde_json::json!({"type": "VAD", "status": true, "datetime": "2026-07-28T00:00:00Z"})).await;
    assert_eq!(session.cached_datetime().await, Some(serde_json::json!("2026-07-28T00:00:00Z")));
}

#[tokio::test]
async fn glasses_connection_state_sets_offline_and_fans_out() {
    let (session, channel) = session_with_package("com.x", false);
    let app = session.attach_app("com.x", Arc::clone(&channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();
    let subs = crate::subscription::SubscriptionManager::parse_list(&["glasses_connection_state".to_owned()]).unwrap();
    app.update_subscriptions(subs, None).await;

    dispatch(&session, serde_json::json!({"type": "GLASSES_CONNECTION_STATE", "connected": false})).await;
    assert!(session.is_user_offline().await);

    dispatch(&session, serde_json::json!({"type": "GLASSES_CONNECTION_STATE", "connected": true})).await;
    assert!(!session.is_user_offline().await);

    assert_eq!(frames_of_type(&channel.sent(), "DATA_STREAM").len(), 2);
}

#[tokio::test]
async fn vad_fans_out_to_subscribers() {
    let (session, channel) = session_with_package("com.x", false);
    let app = session.attach_app("com.x", Arc::clone(&channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();
    let subs = crate::subscription::SubscriptionManager::parse_list(&["vad".to_owned()]).unwrap();
    app.update_subscriptions(subs, None).await;

    dispatch(&session, serde_json::json!({"type": "VAD", "status": true})).await;
    assert_eq!(frames_of_type(&channel.sent(), "DATA_STREAM").len(), 1);
}

#[tokio::test]
async fn local_transcription_relays_under_language_stream_key() {
    let (session, channel) = session_with_package("com.x", false);
    let app = session.attach_app("com.x", Arc::clone(&channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();
    let subs = crate::subscription::SubscriptionManager::parse_list(&["transcription:en-US".to_owned()]).unwrap();
    app.update_subscriptions(subs, None).await;

    dispatch(&session, serde_json::json!({"type": "LOCAL_TRANSCRIPTION", "transcribe": "en-US", "text": "hello"})).await;
    assert_eq!(frames_of_type(&channel.sent(), "DATA_STREAM").len(), 1);
}

#[tokio::test]
async fn local_transcription_with_invalid_tag_is_dropped_silently() {
    let (session, channel) = session_with_package("com.x", false);
    dispatch(&session, serde_json::json!({"type": "LOCAL_TRANSCRIPTION", "transcribe": "not-a-tag"})).await;
    assert!(channel.sent().is_empty());
}

#[tokio::test]
async fn photo_response_routes_through_photo_manager() {
    let (session, channel) = session_with_package("com.x", true);
    session
        .photo
        .request_photo(crate::photo::PhotoRequestArgs {
            package_name: "com.x".to_owned(),
            request_id: "r1".to_owned(),
            save_to_gallery: false,
            webhook_url: None,
        })
        .await
        .unwrap();

    dispatch(&session, serde_json::json!({"type": "PHOTO_RESPONSE", "requestId": "r1", "photoUrl": "http://x/p.jpg"})).await;
    assert!(!session.photo.has_pending("r1").await);
    let _ = channel.sent();
}

#[tokio::test]
async fn audio_play_response_routes_to_recorded_origin_only() {
    let (session, upstream) = session_with_package("com.x", false);
    let app_channel = crate::test_support::MockChannel::new();
    session.attach_app("com.x", Arc::clone(&app_channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();
    session.record_audio_play_origin("r1", "com.x").await;

    dispatch(&session, serde_json::json!({"type": "AUDIO_PLAY_RESPONSE", "requestId": "r1"})).await;

    assert_eq!(app_channel.sent().len(), 1);
    assert!(upstream.sent().is_empty());
}

#[tokio::test]
async fn audio_play_response_for_unknown_request_is_dropped() {
    let (session, _channel) = session_with_package("com.x", false);
    dispatch(&session, serde_json::json!({"type": "AUDIO_PLAY_RESPONSE", "requestId": "ghost"})).await;
}

#[tokio::test]
async fn head_position_up_cycles_dashboard_and_fans_out() {
    let (session, channel) = session_with_package("com.x", false);
    let app = session.attach_app("com.x", Arc::clone(&channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();
    let subs = crate::subscription::SubscriptionManager::parse_list(&["head_position".to_owned()]).unwrap();
    app.update_subscriptions(subs, None).await;

    dispatch(&session, serde_json::json!({"type": "HEAD_POSITION", "position": "up"})).await;
    assert_eq!(frames_of_type(&channel.sent(), "DATA_STREAM").len(), 1);
}

/// Spec §8 scenario 6: "a" subscribed to touch_event:triple_tap, "b" to the
/// bare base stream, "c" to touch_event:single_tap. Only "a" and "b" see a
/// triple-tap frame.
#[tokio::test]
async fn touch_event_gesture_fan_out_matches_seed_scenario() {
    let mut catalog = crate::session::StaticAppCatalog::new();
    catalog.register("a").register("b").register("c");
    let upstream = crate::test_support::MockChannel::new();
    let session = crate::session::Session::new(
        "user-1",
        "session-1",
        Arc::clone(&upstream) as Arc<dyn crate::transport::DuplexChannel>,
        Arc::new(catalog),
        crate::config::Timings::fast_for_tests(),
    );

    let channel_a = crate::test_support::MockChannel::new();
    let channel_b = crate::test_support::MockChannel::new();
    let channel_c = crate::test_support::MockChannel::new();
    let app_a = session.attach_app("a", Arc::clone(&channel_a) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();
    let app_b = session.attach_app("b", Arc::clone(&channel_b) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();
    let app_c = session.attach_app("c", Arc::clone(&channel_c) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();

    app_a.update_subscriptions(crate::subscription::SubscriptionManager::parse_list(&["touch_event:triple_tap".to_owned()]).unwrap(), None).await;
    app_b.update_subscriptions(crate::subscription::SubscriptionManager::parse_list(&["touch_event".to_owned()]).unwrap(), None).await;
    app_c.update_subscriptions(crate::subscription::SubscriptionManager::parse_list(&["touch_event:single_tap".to_owned()]).unwrap(), None).await;

    dispatch(&session, serde_json::json!({"type": "TOUCH_EVENT", "gesture_name": "triple_tap"})).await;

    assert_eq!(channel_a.sent().len(), 1);
    assert_eq!(channel_b.sent().len(), 1);
    assert!(channel_c.sent().is_empty());
}

#[tokio::test]
async fn unrecognized_frame_type_falls_through_to_wildcard_fan_out() {
    let (session, channel) = session_with_package("com.x", false);
    let app = session.attach_app("com.x", Arc::clone(&channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();
    let subs = crate::subscription::SubscriptionManager::parse_list(&["ALL".to_owned()]).unwrap();
    app.update_subscriptions(subs, None).await;

    dispatch(&session, serde_json::json!({"type": "SOME_FUTURE_FRAME", "payload": 1})).await;

    let sent = channel.sent();
    let frame = sent.iter().find(|f| f["type"] == "DATA_STREAM").unwrap();
    assert_eq!(frame["streamType"], "SOME_FUTURE_FRAME");
}

#[tokio::test]
async fn missing_type_field_does_not_panic() {
    let (session, _channel) = session_with_package("com.x", false);
    dispatch(&session, serde_json::json!({"no_type": true})).await;
}
