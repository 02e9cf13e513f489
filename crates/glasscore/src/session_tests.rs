use super::*;
use crate::test_support::{session_with_package, MockChannel};

#[tokio::test]
async fn send_upstream_fails_when_channel_closed() {
    let (session, channel) = session_with_package("com.x", false);
    channel.close_from_peer();
    assert!(session.send_upstream(serde_json::json!({"type": "X"})).await.is_err());
}

#[tokio::test]
async fn attach_app_rejects_unknown_package() {
    let (session, _channel) = session_with_package("com.known", false);
    let app_channel = MockChannel::new();
    assert!(session.attach_app("com.unknown", app_channel).await.is_none());
}

#[tokio::test]
async fn touch_gesture_fan_out_matches_scenario_6() {
    let mut catalog = StaticAppCatalog::new();
    catalog.register("a").register("b").register("c");
    let upstream = MockChannel::new();
    let session = Session::new("user-1", "session-1", Arc::clone(&upstream) as Arc<dyn crate::transport::DuplexChannel>, Arc::new(catalog), Timings::fast_for_tests());

    let channel_a = MockChannel::new();
    let channel_b = MockChannel::new();
    let channel_c = MockChannel::new();
    let app_a = session.attach_app("a", Arc::clone(&channel_a) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();
    let app_b = session.attach_app("b", Arc::clone(&channel_b) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();
    let app_c = session.attach_app("c", Arc::clone(&channel_c) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();

    let triple_tap = crate::subscription::SubscriptionManager::parse_list(&["touch_event:triple_tap".to_owned()]).unwrap();
    let bare = crate::subscription::SubscriptionManager::parse_list(&["touch_event".to_owned()]).unwrap();
    let single_tap = crate::subscription::SubscriptionManager::parse_list(&["touch_event:single_tap".to_owned()]).unwrap();
    app_a.update_subscriptions(triple_tap, None).await;
    app_b.update_subscriptions(bare, None).await;
    app_c.update_subscriptions(single_tap, None).await;

    session.relay_touch_event("triple_tap", serde_json::json!({"gesture_name": "triple_tap"})).await;

    assert_eq!(channel_a.sent().len(), 1);
    assert_eq!(channel_b.sent().len(), 1);
    assert!(channel_c.sent().is_empty());
}

#[tokio::test]
async fn send_connection_error_closes_channel_for_protocol_errors() {
    let (session, _upstream) = session_with_package("com.x", false);
    let app_channel = MockChannel::new();
    session.attach_app("com.x", Arc::clone(&app_channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();

    session.send_connection_error("com.x", CoreError::MalformedMessage, "bad frame").await;

    assert!(!app_channel.is_open());
    let frame = app_channel.sent().into_iter().find(|f| f["type"] == "CONNECTION_ERROR").unwrap();
    assert_eq!(frame["code"], "MALFORMED_MESSAGE");
}

#[tokio::test]
async fn send_connection_error_does_not_close_channel_for_internal_error() {
    let (session, _upstream) = session_with_package("com.x", false);
    let app_channel = MockChannel::new();
    session.attach_app("com.x", Arc::clone(&app_channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();

    session.send_connection_error("com.x", CoreError::InternalError, "glasses offline").await;

    assert!(app_channel.is_open());
}

#[tokio::test]
async fn dispose_disposes_every_app_session() {
    let (session, _upstream) = session_with_package("com.x", false);
    let app_channel = MockChannel::new();
    let app = session.attach_app("com.x", Arc::clone(&app_channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();

    session.dispose().await;

    assert!(app.is_disposed());
    assert!(!session.upstream_open().await);
}
