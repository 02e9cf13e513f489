use super::*;
use crate::test_support::{session_with_package, MockChannel};

async fn connected_app(package_name: &str) -> (Arc<crate::session::Session>, Arc<AppSession>, Arc<MockChannel>) {
    let (session, _upstream) = session_with_package(package_name, false);
    let channel = MockChannel::new();
    let app = session.attach_app(package_name, Arc::clone(&channel) as Arc<dyn crate::transport::DuplexChannel>).await.unwrap();
    (session, app, channel)
}

#[tokio::test]
async fn attach_app_starts_running_and_open() {
    let (_session, app, _channel) = connected_app("com.x").await;
    assert_eq!(app.state().await, AppState::Running);
    assert!(app.is_open().await);
}

#[tokio::test]
async fn unknown_package_is_rejected() {
    let (session, _upstream) = session_with_package("com.known", false);
    let channel = MockChannel::new();
    let result = session.attach_app("com.unknown", channel).await;
    assert!(result.is_none());
}

#[tokio::test]
async fn empty_update_within_grace_window_is_rejected() {
    let (_session, app, _channel) = connected_app("com.x").await;
    let outcome = app.update_subscriptions(IndexSet::new(), None).await;
    assert!(!outcome.applied);
}

#[tokio::test]
async fn empty_update_after_grace_window_clears_subscriptions() {
    let (_session, app, _channel) = connected_app("com.x").await;
    let subs = SubscriptionManager::parse_list(&["vad".to_owned()]).unwrap();
    app.update_subscriptions(subs, None).await;

    tokio::time::sleep(Timings::fast_for_tests().subscription_grace() + std::time::Duration::from_millis(10)).await;
    let outcome = app.update_subscriptions(IndexSet::new(), None).await;
    assert!(outcome.applied);
    assert!(app.subscriptions().await.is_empty());
}

#[tokio::test]
async fn enqueue_runs_ops_in_order() {
    let (_session, app, _channel) = connected_app("com.x").await;
    let log = Arc::new(tokio::sync::Mutex::new(Vec::new()));

    for i in 0..5 {
        let log = Arc::clone(&log);
        app.enqueue(move || {
            Box::pin(async move {
                log.lock().await.push(i);
            })
        })
        .await
        .unwrap();
    }

    assert_eq!(*log.lock().await, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn channel_closed_while_running_enters_grace_period() {
    let (_session, app, _channel) = connected_app("com.x").await;
    app.handle_channel_closed().await;
    assert_eq!(app.state().await, AppState::GracePeriod);
}

#[tokio::test]
async fn reconnect_before_grace_expiry_returns_to_running() {
    let (_session, app, channel) = connected_app("com.x").await;
    app.handle_channel_closed().await;
    assert_eq!(app.state().await, AppState::GracePeriod);

    app.handle_connect(channel).await;
    assert_eq!(app.state().await, AppState::Running);
}

#[tokio::test]
async fn ownership_release_then_close_goes_directly_to_dormant() {
    let (_session, app, _channel) = connected_app("com.x").await;
    app.mark_ownership_released().await;
    app.handle_channel_closed().await;
    assert_eq!(app.state().await, AppState::Dormant);
}

#[tokio::test]
async fn stop_transitions_to_stopped() {
    let (_session, app, _channel) = connected_app("com.x").await;
    app.stop(1000, "done").await;
    assert_eq!(app.state().await, AppState::Stopped);
    assert!(!app.is_open().await);
}

#[tokio::test]
async fn dispose_is_idempotent() {
    let (_session, app, _channel) = connected_app("com.x").await;
    app.dispose().await;
    assert!(app.is_disposed());
    app.dispose().await;
    assert!(app.is_disposed());
}

#[test]
fn location_rate_parse_rejects_unknown_values() {
    assert!(LocationRate::parse("warp_speed").is_err());
    assert!(LocationRate::parse("standard").is_ok());
}

proptest::proptest! {
    /// Spec §8 fuzz property: arbitrarily many overlapping `enqueue`d
    /// operations for the same AppSession apply in the order they were
    /// submitted, regardless of interleaving with other tasks.
    #[test]
    fn enqueue_preserves_arrival_order_under_fuzzing(ops in proptest::collection::vec(0u32..1000, 0..64)) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let (_session, app, _channel) = connected_app("com.x").await;
            let log = Arc::new(tokio::sync::Mutex::new(Vec::new()));

            for &op in &ops {
                let log = Arc::clone(&log);
                app.enqueue(move || Box::pin(async move { log.lock().await.push(op); })).await.unwrap();
            }

            assert_eq!(*log.lock().await, ops);
        });
    }
}
