use super::*;
use crate::test_support::session_with_package;

#[tokio::test]
async fn missing_type_field_sends_malformed_error_and_closes() {
    let (session, channel) = session_with_package("com.x", false);
    session.attach_app("com.x", Arc::clone(&channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();

    dispatch(&session, "com.x", serde_json::json!({"no_type": true})).await;

    let frame = channel.sent().into_iter().find(|f| f["type"] == "CONNECTION_ERROR").unwrap();
    assert_eq!(frame["code"], "MALFORMED_MESSAGE");
    assert!(!channel.is_open());
}

#[tokio::test]
async fn unknown_frame_type_reports_malformed_message() {
    let (session, channel) = session_with_package("com.x", false);
    session.attach_app("com.x", Arc::clone(&channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();

    dispatch(&session, "com.x", serde_json::json!({"type": "NOT_A_REAL_FRAME"})).await;

    let frame = channel.sent().into_iter().find(|f| f["type"] == "CONNECTION_ERROR").unwrap();
    assert_eq!(frame["code"], "MALFORMED_MESSAGE");
}

#[tokio::test]
async fn subscription_update_applies_and_pushes_cached_datetime_on_new_custom_message() {
    let (session, channel) = session_with_package("com.x", false);
    session.attach_app("com.x", Arc::clone(&channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();
    session.record_datetime(serde_json::json!("2026-07-28T00:00:00Z")).await;

    dispatch(
        &session,
        "com.x",
        serde_json::json!({"type": "SUBSCRIPTION_UPDATE", "subscriptions": ["custom_message"]}),
    )
    .await;

    let app = session.app("com.x").await.unwrap();
    assert!(app.subscriptions().await.iter().any(|k| k.base() == BaseStream::CustomMessage));

    let frame = channel.sent().into_iter().find(|f| f["type"] == "CUSTOM_MESSAGE").unwrap();
    assert_eq!(frame["data"], "2026-07-28T00:00:00Z");
}

#[tokio::test]
async fn subscription_update_does_not_repush_datetime_when_already_subscribed() {
    let (session, channel) = session_with_package("com.x", false);
    session.attach_app("com.x", Arc::clone(&channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();
    session.record_datetime(serde_json::json!("2026-07-28T00:00:00Z")).await;

    dispatch(&session, "com.x", serde_json::json!({"type": "SUBSCRIPTION_UPDATE", "subscriptions": ["custom_message"]})).await;
    let first_count = channel.sent().into_iter().filter(|f| f["type"] == "CUSTOM_MESSAGE").count();
    assert_eq!(first_count, 1);

    dispatch(
        &session,
        "com.x",
        serde_json::json!({"type": "SUBSCRIPTION_UPDATE", "subscriptions": ["custom_message", "vad"]}),
    )
    .await;
    let second_count = channel.sent().into_iter().filter(|f| f["type"] == "CUSTOM_MESSAGE").count();
    assert_eq!(second_count, 1);
}

#[tokio::test]
async fn subscription_update_for_unknown_package_reports_package_not_found() {
    let (session, channel) = session_with_package("com.x", false);
    session.attach_app("com.x", Arc::clone(&channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();

    dispatch(&session, "com.ghost", serde_json::json!({"type": "SUBSCRIPTION_UPDATE", "subscriptions": []})).await;
}

#[tokio::test]
async fn display_request_routes_to_display_manager_when_not_dashboard() {
    let (session, channel) = session_with_package("com.x", false);
    session.attach_app("com.x", Arc::clone(&channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();

    dispatch(&session, "com.x", serde_json::json!({"type": "DISPLAY_REQUEST", "layout": {"text": "hi"}})).await;

    assert!(channel.sent().iter().all(|f| f["type"] != "CONNECTION_ERROR"));
}

#[tokio::test]
async fn display_request_routes_to_dashboard_when_flagged() {
    let (session, channel) = session_with_package("com.x", false);
    session.attach_app("com.x", Arc::clone(&channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();

    dispatch(
        &session,
        "com.x",
        serde_json::json!({"type": "DISPLAY_REQUEST", "layout": {"text": "hi"}, "dashboard": true}),
    )
    .await;

    assert!(channel.sent().iter().all(|f| f["type"] != "CONNECTION_ERROR"));
}

#[tokio::test]
async fn rgb_led_control_is_forwarded_upstream_with_package_name_stamped() {
    let (session, upstream) = session_with_package("com.x", false);
    let app_channel = crate::test_support::MockChannel::new();
    session.attach_app("com.x", Arc::clone(&app_channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();

    dispatch(
        &session,
        "com.x",
        serde_json::json!({
            "type": "RGB_LED_CONTROL", "requestId": "r1", "action": "flash",
            "color": "red", "ontime": 1, "offtime": 1, "count": 1,
        }),
    )
    .await;

    let frame = upstream.sent().into_iter().find(|f| f["type"] == "RGB_LED_CONTROL").unwrap();
    assert_eq!(frame["packageName"], "com.x");
}

#[tokio::test]
async fn rgb_led_control_fails_with_internal_error_when_upstream_closed() {
    let (session, upstream) = session_with_package("com.x", false);
    let app_channel = crate::test_support::MockChannel::new();
    session.attach_app("com.x", Arc::clone(&app_channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();
    upstream.close_from_peer();

    dispatch(
        &session,
        "com.x",
        serde_json::json!({
            "type": "RGB_LED_CONTROL", "requestId": "r1", "action": "flash",
            "color": "red", "ontime": 1, "offtime": 1, "count": 1,
        }),
    )
    .await;

    let frame = app_channel.sent().into_iter().find(|f| f["type"] == "CONNECTION_ERROR").unwrap();
    assert_eq!(frame["code"], "INTERNAL_ERROR");
    assert!(app_channel.is_open());
}

#[tokio::test]
async fn rtmp_stream_request_without_camera_permission_is_denied() {
    let (session, _upstream) = session_with_package("com.x", false);
    let app_channel = crate::test_support::MockChannel::new();
    session.attach_app("com.x", Arc::clone(&app_channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();

    dispatch(&session, "com.x", serde_json::json!({"type": "RTMP_STREAM_REQUEST"})).await;

    let frame = app_channel.sent().into_iter().find(|f| f["type"] == "CONNECTION_ERROR").unwrap();
    assert_eq!(frame["code"], "PERMISSION_DENIED");
    assert!(!app_channel.is_open());
}

#[tokio::test]
async fn rtmp_stream_request_without_wifi_reports_wifi_not_connected_and_stays_open() {
    let (session, _upstream) = session_with_package("com.x", true);
    session.set_wifi_connected(false);
    let app_channel = crate::test_support::MockChannel::new();
    session.attach_app("com.x", Arc::clone(&app_channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();

    dispatch(&session, "com.x", serde_json::json!({"type": "RTMP_STREAM_REQUEST"})).await;

    let frame = app_channel.sent().into_iter().find(|f| f["type"] == "CONNECTION_ERROR").unwrap();
    assert_eq!(frame["code"], "WIFI_NOT_CONNECTED");
    assert!(app_channel.is_open());
}

#[tokio::test]
async fn managed_stream_start_with_camera_and_wifi_succeeds() {
    let (session, _upstream) = session_with_package("com.x", true);
    let app_channel = crate::test_support::MockChannel::new();
    session.attach_app("com.x", Arc::clone(&app_channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();

    dispatch(&session, "com.x", serde_json::json!({"type": "MANAGED_STREAM_START"})).await;

    assert!(app_channel.sent().iter().all(|f| f["type"] != "CONNECTION_ERROR"));
}

#[tokio::test]
async fn photo_request_without_camera_permission_is_denied() {
    let (session, _upstream) = session_with_package("com.x", false);
    let app_channel = crate::test_support::MockChannel::new();
    session.attach_app("com.x", Arc::clone(&app_channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();

    dispatch(&session, "com.x", serde_json::json!({"type": "PHOTO_REQUEST", "requestId": "r1"})).await;

    let frame = app_channel.sent().into_iter().find(|f| f["type"] == "CONNECTION_ERROR").unwrap();
    assert_eq!(frame["code"], "PERMISSION_DENIED");
}

#[tokio::test]
async fn photo_request_with_permission_reaches_upstream() {
    let (session, upstream) = session_with_package("com.x", true);
    let app_channel = crate::test_support::MockChannel::new();
    session.attach_app("com.x", Arc::clone(&app_channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();

    dispatch(&session, "com.x", serde_json::json!({"type": "PHOTO_REQUEST", "requestId": "r1"})).await;

    assert!(upstream.sent().iter().any(|f| f["type"] == "PHOTO_REQUEST"));
    assert!(session.photo.has_pending("r1").await);
}

#[tokio::test]
async fn audio_play_request_records_origin_and_stamps_upstream_frame() {
    let (session, upstream) = session_with_package("com.x", false);
    let app_channel = crate::test_support::MockChannel::new();
    session.attach_app("com.x", Arc::clone(&app_channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();

    dispatch(&session, "com.x", serde_json::json!({"type": "AUDIO_PLAY_REQUEST", "requestId": "r1", "audioUrl": "http://x/a.mp3"})).await;

    let frame = upstream.sent().into_iter().find(|f| f["type"] == "AUDIO_PLAY_REQUEST").unwrap();
    assert_eq!(frame["packageName"], "com.x");
    assert_eq!(session.take_audio_play_origin("r1").await, Some("com.x".to_owned()));
}

#[tokio::test]
async fn audio_play_request_fails_with_internal_error_when_upstream_closed() {
    let (session, upstream) = session_with_package("com.x", false);
    let app_channel = crate::test_support::MockChannel::new();
    session.attach_app("com.x", Arc::clone(&app_channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();
    upstream.close_from_peer();

    dispatch(&session, "com.x", serde_json::json!({"type": "AUDIO_PLAY_REQUEST", "requestId": "r1"})).await;

    let frame = app_channel.sent().into_iter().find(|f| f["type"] == "CONNECTION_ERROR").unwrap();
    assert_eq!(frame["code"], "INTERNAL_ERROR");
    assert_eq!(session.take_audio_play_origin("r1").await, None);
}

#[tokio::test]
async fn request_wifi_setup_sends_show_wifi_setup_upstream() {
    let (session, upstream) = session_with_package("com.x", false);
    let app_channel = crate::test_support::MockChannel::new();
    session.attach_app("com.x", Arc::clone(&app_channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();

    dispatch(&session, "com.x", serde_json::json!({"type": "REQUEST_WIFI_SETUP"})).await;

    assert!(upstream.sent().iter().any(|f| f["type"] == "SHOW_WIFI_SETUP"));
}

#[tokio::test]
async fn ownership_release_marks_app_released() {
    let (session, _upstream) = session_with_package("com.x", false);
    let app_channel = crate::test_support::MockChannel::new();
    let app = session.attach_app("com.x", Arc::clone(&app_channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();

    dispatch(&session, "com.x", serde_json::json!({"type": "OWNERSHIP_RELEASE"})).await;

    app.handle_channel_closed().await;
    assert_eq!(app.state().await, crate::app_session::AppState::Dormant);
}

#[tokio::test]
async fn ownership_release_for_unknown_package_reports_package_not_found() {
    let (session, channel) = session_with_package("com.x", false);
    session.attach_app("com.x", Arc::clone(&channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();

    dispatch(&session, "com.ghost", serde_json::json!({"type": "OWNERSHIP_RELEASE"})).await;
}
