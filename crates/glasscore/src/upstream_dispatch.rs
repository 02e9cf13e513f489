// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Upstream (glasses → core) frame dispatch table (spec §4.5).
//!
//! Each arm peeks `type` (via [`crate::messages::frame_type`]) then
//! deserializes only the fields that handler needs. Anything not matched
//! here falls through to the default row: fan out verbatim to every app
//! subscribed to the matching base stream or a wildcard.

use std::sync::Arc;

use crate::messages::{
    frame_type, AudioPlayResponsePayload, GlassesConnectionStatePayload, HeadPositionPayload,
    LocalTranscriptionPayload, PhotoResponsePayload, RtmpStreamStatusPayload, TouchEventPayload, VadPayload,
};
use crate::microphone::ConnectionEvent;
use crate::photo::PhotoResponseArgs;
use crate::session::Session;
use crate::streaming::dispatch_stream_status;
use crate::subscription::{BaseStream, LanguageTag, StreamKey};

pub async fn dispatch(session: &Arc<Session>, value: serde_json::Value) {
    let Some(frame_type) = frame_type(&value) else {
        tracing::debug!("upstream frame missing type field");
        return;
    };

    if let Some(datetime) = value.get("datetime") {
        session.record_datetime(datetime.clone()).await;
    }

    match frame_type {
        "GLASSES_CONNECTION_STATE" => handle_glasses_connection_state(session, value).await,
        "VAD" => handle_vad(session, value).await,
        "LOCAL_TRANSCRIPTION" => handle_local_transcription(session, value).await,
        "LOCATION_UPDATE" => session.location.handle_location_update(value).await,
        "CALENDAR_EVENT" => session.calendar.handle_calendar_event(value).await,
        "RTMP_STREAM_STATUS" => handle_rtmp_stream_status(session, value).await,
        "KEEP_ALIVE_ACK" => handle_keep_alive_ack(session, value).await,
        "PHOTO_RESPONSE" => handle_photo_response(session, value).await,
        "AUDIO_PLAY_RESPONSE" => handle_audio_play_response(session, value).await,
        "RGB_LED_CONTROL_RESPONSE" => {
            fan_out_default(session, BaseStream::RgbLedControlResponse, value).await
        }
        "HEAD_POSITION" => handle_head_position(session, value).await,
        "TOUCH_EVENT" => handle_touch_event(session, value).await,
        other => {
            tracing::debug!(frame_type = %other, "unrecognized upstream frame, default fan-out");
            fan_out_unknown(session, other, value).await;
        }
    }
}

async fn handle_glasses_connection_state(session: &Arc<Session>, value: serde_json::Value) {
    let Ok(payload) = serde_json::from_value::<GlassesConnectionStatePayload>(value.clone()) else {
        tracing::debug!("malformed GLASSES_CONNECTION_STATE");
        return;
    };
    session.set_user_offline(!payload.connected).await;
    if payload.connected {
        session.microphone.handle_connection_state_change(ConnectionEvent::Reconnected).await;
    }
    fan_out_default(session, BaseStream::GlassesConnectionState, value).await;
}

async fn handle_vad(session: &Arc<Session>, value: serde_json::Value) {
    let Ok(payload) = serde_json::from_value::<VadPayload>(value.clone()) else {
        tracing::debug!("malformed VAD frame");
        return;
    };
    if payload.status {
        session.transcription.ensure_streams_active().await;
    } else {
        session.transcription.teardown_idle_streams().await;
    }
    let key = StreamKey::Base(BaseStream::Vad);
    session.relay_to_apps(&key, value).await;
}

async fn handle_local_transcription(session: &Arc<Session>, value: serde_json::Value) {
    let Ok(payload) = serde_json::from_value::<LocalTranscriptionPayload>(value.clone()) else {
        tracing::debug!("malformed LOCAL_TRANSCRIPTION frame");
        return;
    };
    let Ok(transcribe) = LanguageTag::parse(&payload.transcribe) else {
        tracing::debug!(tag = %payload.transcribe, "invalid transcribe language tag");
        return;
    };
    let translate = match payload.translate.as_deref().map(LanguageTag::parse) {
        Some(Ok(tag)) => Some(tag),
        Some(Err(_)) => {
            tracing::debug!("invalid translate language tag");
            return;
        }
        None => None,
    };

    let key = StreamKey::Language { base: BaseStream::Transcription, transcribe, translate };
    session.transcription.relay_transcript(&key, value).await;
}

async fn handle_rtmp_stream_status(session: &Arc<Session>, value: serde_json::Value) {
    if serde_json::from_value::<RtmpStreamStatusPayload>(value.clone()).is_err() {
        tracing::debug!("malformed RTMP_STREAM_STATUS frame");
        return;
    }
    dispatch_stream_status(&session.managed_stream, &session.unmanaged_stream, &value).await;
    let key = StreamKey::Base(BaseStream::RtmpStatus);
    session.relay_to_apps(&key, value).await;
}

async fn handle_keep_alive_ack(session: &Arc<Session>, value: serde_json::Value) {
    session.managed_stream.handle_keep_alive_ack(&value).await;
    session.unmanaged_stream.handle_keep_alive_ack(&value).await;
    fan_out_default(session, BaseStream::KeepAliveAck, value).await;
}

async fn handle_photo_response(session: &Arc<Session>, value: serde_json::Value) {
    let Ok(payload) = serde_json::from_value::<PhotoResponsePayload>(value) else {
        tracing::debug!("malformed PHOTO_RESPONSE frame");
        return;
    };
    session
        .photo
        .handle_photo_response(PhotoResponseArgs {
            request_id: payload.request_id,
            photo_url: payload.photo_url,
            saved_to_gallery: payload.saved_to_gallery,
        })
        .await;
}

async fn handle_audio_play_response(session: &Arc<Session>, value: serde_json::Value) {
    let Ok(payload) = serde_json::from_value::<AudioPlayResponsePayload>(value.clone()) else {
        tracing::debug!("malformed AUDIO_PLAY_RESPONSE frame");
        return;
    };
    let Some(package_name) = session.take_audio_play_origin(&payload.request_id).await else {
        tracing::debug!(request_id = %payload.request_id, "audio play response for unknown request");
        return;
    };
    session.send_to_app(&package_name, value).await;
}

async fn handle_head_position(session: &Arc<Session>, value: serde_json::Value) {
    if let Ok(payload) = serde_json::from_value::<HeadPositionPayload>(value.clone()) {
        if payload.position == "up" {
            session.dashboard.cycle_content().await;
        }
    }
    fan_out_default(session, BaseStream::HeadPosition, value).await;
}

async fn handle_touch_event(session: &Arc<Session>, value: serde_json::Value) {
    let Ok(payload) = serde_json::from_value::<TouchEventPayload>(value.clone()) else {
        tracing::debug!("malformed TOUCH_EVENT frame");
        return;
    };
    session.relay_touch_event(&payload.gesture_name, value).await;
}

/// Default-row fan-out: every app subscribed to `base` or to a wildcard
/// (spec §4.5 default row).
async fn fan_out_default(session: &Arc<Session>, base: BaseStream, value: serde_json::Value) {
    let key = StreamKey::Base(base);
    session.relay_to_apps(&key, value).await;
}

/// An upstream frame type this core build doesn't recognize at all still
/// fans out via the `ALL`/`WILDCARD` subscribers, keyed under the raw type
/// string so it never collides with a named base stream.
async fn fan_out_unknown(session: &Arc<Session>, frame_type: &str, value: serde_json::Value) {
    let recipients = {
        let key = StreamKey::Base(BaseStream::Wildcard);
        let mut apps = session.subscriptions().get_subscribed_apps(&key).await;
        let all_key = StreamKey::Base(BaseStream::All);
        apps.extend(session.subscriptions().get_subscribed_apps(&all_key).await);
        apps
    };
    for package_name in recipients {
        let frame = serde_json::json!({
            "type": "DATA_STREAM",
            "sessionId": session.sub_session_id(&package_name),
            "streamType": frame_type,
            "data": value,
            "timestamp": crate::epoch_ms(),
        });
        session.send_to_app(&package_name, frame).await;
    }
}

#[cfg(test)]
#[path = "upstream_dispatch_tests.rs"]
mod tests;
