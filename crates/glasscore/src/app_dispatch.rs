// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Downstream-app (app → core) frame dispatch table (spec §4.6).
//!
//! On any handler error the offending app's channel receives a
//! `CONNECTION_ERROR` and, per [`CoreError::closes_channel`], is closed with
//! code 1008.

use std::sync::Arc;

use crate::app_session::LocationRate;
use crate::error::CoreError;
use crate::messages::{
    frame_type, AudioPlayRequestPayload, DisplayRequestPayload, PhotoRequestPayload, RgbLedControlPayload,
    RtmpStreamRequestPayload, SubscriptionUpdatePayload,
};
use crate::photo::PhotoRequestArgs;
use crate::session::{Permission, Session};
use crate::subscription::{BaseStream, SubscriptionManager};

pub async fn dispatch(session: &Arc<Session>, package_name: &str, value: serde_json::Value) {
    let Some(frame_type) = frame_type(&value) else {
        session.send_connection_error(package_name, CoreError::MalformedMessage, "missing type field").await;
        return;
    };

    let result = match frame_type {
        "SUBSCRIPTION_UPDATE" => handle_subscription_update(session, package_name, value).await,
        "DISPLAY_REQUEST" => handle_display_request(session, package_name, value).await,
        "RGB_LED_CONTROL" => handle_rgb_led_control(session, package_name, value).await,
        "RTMP_STREAM_REQUEST" => handle_rtmp_stream_request(session, package_name, value).await,
        "RTMP_STREAM_STOP" => handle_rtmp_stream_stop(session, package_name).await,
        "MANAGED_STREAM_START" => handle_managed_stream_start(session, package_name).await,
        "MANAGED_STREAM_STOP" => handle_managed_stream_stop(session, package_name).await,
        "STREAM_STATUS_CHECK" => handle_stream_status_check(session, package_name).await,
        "PHOTO_REQUEST" => handle_photo_request(session, package_name, value).await,
        "AUDIO_PLAY_REQUEST" => handle_audio_play_request(session, package_name, value).await,
        "AUDIO_STOP_REQUEST" => handle_audio_stop_request(session, package_name, value).await,
        "LOCATION_POLL_REQUEST" => {
            session.location.handle_poll_request_from_app(package_name).await;
            Ok(())
        }
        "REQUEST_WIFI_SETUP" => handle_request_wifi_setup(session, package_name).await,
        "OWNERSHIP_RELEASE" => handle_ownership_release(session, package_name).await,
        other => {
            tracing::debug!(frame_type = %other, %package_name, "unrecognized app frame");
            Err(CoreError::MalformedMessage)
        }
    };

    if let Err(error) = result {
        session.send_connection_error(package_name, error, error.as_str()).await;
    }
}

async fn check_camera_permission(session: &Arc<Session>, package_name: &str) -> Result<(), CoreError> {
    if session.catalog().has_permission(package_name, Permission::Camera).await {
        Ok(())
    } else {
        Err(CoreError::PermissionDenied)
    }
}

fn require_wifi(session: &Arc<Session>) -> Result<(), CoreError> {
    if session.is_wifi_connected() {
        Ok(())
    } else {
        Err(CoreError::WifiNotConnected)
    }
}

async fn handle_subscription_update(
    session: &Arc<Session>,
    package_name: &str,
    value: serde_json::Value,
) -> Result<(), CoreError> {
    let payload: SubscriptionUpdatePayload =
        serde_json::from_value(value).map_err(|_| CoreError::MalformedMessage)?;
    let new_list = SubscriptionManager::parse_list(&payload.subscriptions)?;
    let location_rate = match payload.location_rate {
        Some(raw) => Some(LocationRate::parse(&raw)?),
        None => None,
    };

    let Some(app) = session.app(package_name).await else { return Err(CoreError::PackageNotFound) };
    let was_subscribed_custom_message =
        app.subscriptions().await.iter().any(|k| k.base() == BaseStream::CustomMessage);

    app.update_subscriptions(new_list.clone(), location_rate).await;

    let now_subscribed_custom_message = new_list.iter().any(|k| k.base() == BaseStream::CustomMessage);
    if now_subscribed_custom_message && !was_subscribed_custom_message {
        if let Some(datetime) = session.cached_datetime().await {
            let frame = serde_json::json!({
                "type": "CUSTOM_MESSAGE",
                "sessionId": session.session_id(),
                "packageName": package_name,
                "data": datetime,
                "timestamp": crate::epoch_ms(),
            });
            session.send_to_app(package_name, frame).await;
        }
    }

    Ok(())
}

async fn handle_display_request(
    session: &Arc<Session>,
    package_name: &str,
    value: serde_json::Value,
) -> Result<(), CoreError> {
    let payload: DisplayRequestPayload = serde_json::from_value(value).map_err(|_| CoreError::MalformedMessage)?;
    if payload.dashboard {
        session.dashboard.handle_dashboard_request(payload.layout).await;
        Ok(())
    } else {
        session.display.handle_display_request(package_name, payload.layout).await
    }
}

async fn handle_rgb_led_control(
    session: &Arc<Session>,
    package_name: &str,
    value: serde_json::Value,
) -> Result<(), CoreError> {
    let payload: RgbLedControlPayload = serde_json::from_value(value).map_err(|_| CoreError::MalformedMessage)?;
    if !session.upstream_open().await {
        return Err(CoreError::InternalError);
    }
    let frame = serde_json::json!({
        "type": "RGB_LED_CONTROL",
        "sessionId": session.session_id(),
        "requestId": payload.request_id,
        "packageName": package_name,
        "action": payload.action,
        "color": payload.color,
        "ontime": payload.ontime,
        "offtime": payload.offtime,
        "count": payload.count,
        "timestamp": crate::epoch_ms(),
    });
    session.send_upstream(frame).await.map_err(|_| CoreError::InternalError)
}

async fn handle_rtmp_stream_request(
    session: &Arc<Session>,
    package_name: &str,
    value: serde_json::Value,
) -> Result<(), CoreError> {
    check_camera_permission(session, package_name).await?;
    require_wifi(session)?;
    let payload: RtmpStreamRequestPayload = serde_json::from_value(value).map_err(|_| CoreError::MalformedMessage)?;
    match payload.rtmp_url {
        Some(url) => session.unmanaged_stream.start(package_name, &url).await,
        None => session.managed_stream.start(package_name).await,
    }
}

async fn handle_rtmp_stream_stop(session: &Arc<Session>, package_name: &str) -> Result<(), CoreError> {
    check_camera_permission(session, package_name).await?;
    session.managed_stream.stop(package_name).await;
    session.unmanaged_stream.stop(package_name).await;
    Ok(())
}

async fn handle_managed_stream_start(session: &Arc<Session>, package_name: &str) -> Result<(), CoreError> {
    check_camera_permission(session, package_name).await?;
    require_wifi(session)?;
    session.managed_stream.start(package_name).await
}

async fn handle_managed_stream_stop(session: &Arc<Session>, package_name: &str) -> Result<(), CoreError> {
    check_camera_permission(session, package_name).await?;
    session.managed_stream.stop(package_name).await;
    Ok(())
}

async fn handle_stream_status_check(session: &Arc<Session>, package_name: &str) -> Result<(), CoreError> {
    check_camera_permission(session, package_name).await?;
    let status = crate::streaming::resolve_status_precedence(&session.managed_stream, &session.unmanaged_stream, package_name).await;
    let frame = serde_json::json!({
        "type": "STREAM_STATUS_CHECK_RESPONSE",
        "sessionId": session.session_id(),
        "packageName": package_name,
        "status": status.map(|s| s.status),
        "timestamp": crate::epoch_ms(),
    });
    session.send_to_app(package_name, frame).await;
    Ok(())
}

async fn handle_photo_request(
    session: &Arc<Session>,
    package_name: &str,
    value: serde_json::Value,
) -> Result<(), CoreError> {
    check_camera_permission(session, package_name).await?;
    let payload: PhotoRequestPayload = serde_json::from_value(value).map_err(|_| CoreError::MalformedMessage)?;
    session
        .photo
        .request_photo(PhotoRequestArgs {
            package_name: package_name.to_owned(),
            request_id: payload.request_id,
            save_to_gallery: payload.save_to_gallery,
            webhook_url: payload.webhook_url,
        })
        .await
        .map(|_| ())
}

async fn handle_audio_play_request(
    session: &Arc<Session>,
    package_name: &str,
    value: serde_json::Value,
) -> Result<(), CoreError> {
    let payload: AudioPlayRequestPayload = serde_json::from_value(value.clone()).map_err(|_| CoreError::MalformedMessage)?;
    if !session.upstream_open().await {
        return Err(CoreError::InternalError);
    }
    session.record_audio_play_origin(&payload.request_id, package_name).await;

    let mut frame = value;
    if let Some(obj) = frame.as_object_mut() {
        obj.insert("sessionId".to_owned(), serde_json::json!(session.session_id()));
        obj.insert("packageName".to_owned(), serde_json::json!(package_name));
        obj.insert("timestamp".to_owned(), serde_json::json!(crate::epoch_ms()));
    }
    if session.send_upstream(frame).await.is_err() {
        session.take_audio_play_origin(&payload.request_id).await;
        return Err(CoreError::InternalError);
    }
    Ok(())
}

async fn handle_audio_stop_request(
    session: &Arc<Session>,
    package_name: &str,
    mut value: serde_json::Value,
) -> Result<(), CoreError> {
    if !session.upstream_open().await {
        return Err(CoreError::InternalError);
    }
    if let Some(obj) = value.as_object_mut() {
        obj.insert("sessionId".to_owned(), serde_json::json!(session.session_id()));
        obj.insert("packageName".to_owned(), serde_json::json!(package_name));
        obj.insert("timestamp".to_owned(), serde_json::json!(crate::epoch_ms()));
    }
    session.send_upstream(value).await.map_err(|_| CoreError::InternalError)
}

async fn handle_request_wifi_setup(session: &Arc<Session>, package_name: &str) -> Result<(), CoreError> {
    if !session.upstream_open().await {
        return Err(CoreError::InternalError);
    }
    let frame = serde_json::json!({
        "type": "SHOW_WIFI_SETUP",
        "sessionId": session.session_id(),
        "packageName": package_name,
        "timestamp": crate::epoch_ms(),
    });
    session.send_upstream(frame).await.map_err(|_| CoreError::InternalError)
}

async fn handle_ownership_release(session: &Arc<Session>, package_name: &str) -> Result<(), CoreError> {
    let Some(app) = session.app(package_name).await else { return Err(CoreError::PackageNotFound) };
    app.mark_ownership_released().await;
    Ok(())
}

#[cfg(test)]
#[path = "app_dispatch_tests.rs"]
mod tests;
