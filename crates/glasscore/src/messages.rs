// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire payload shapes (spec §6, §9 "duck-typed messages → tagged variants").
//!
//! Frames arrive as `{"type": <string>, ...}`; the dispatcher reads `type`
//! first (mirroring the route-info peek in the transport layer) and then
//! deserializes the rest into one of these per-type structs. This keeps each
//! handler's required fields explicit without forcing every frame through a
//! single giant enum that would have to special-case the unbounded "default
//! fan-out" row.

use serde::Deserialize;

/// Extract the `type` discriminant from a raw JSON frame.
pub fn frame_type(value: &serde_json::Value) -> Option<&str> {
    value.get("type").and_then(|v| v.as_str())
}

/// Extract `packageName`, required on every downstream-app frame (spec §6).
pub fn frame_package_name(value: &serde_json::Value) -> Option<&str> {
    value.get("packageName").and_then(|v| v.as_str())
}

// ---- Upstream -> core -------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GlassesConnectionStatePayload {
    pub connected: bool,
}

#[derive(Debug, Deserialize)]
pub struct VadPayload {
    pub status: bool,
}

#[derive(Debug, Deserialize)]
pub struct LocalTranscriptionPayload {
    pub transcribe: String,
    #[serde(default)]
    pub translate: Option<String>,
    #[serde(flatten)]
    pub rest: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct RtmpStreamStatusPayload {
    #[serde(rename = "packageName")]
    pub package_name: Option<String>,
    #[serde(flatten)]
    pub rest: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct PhotoResponsePayload {
    #[serde(rename = "requestId")]
    pub request_id: String,
    #[serde(rename = "photoUrl")]
    pub photo_url: String,
    #[serde(rename = "savedToGallery", default)]
    pub saved_to_gallery: bool,
}

#[derive(Debug, Deserialize)]
pub struct AudioPlayResponsePayload {
    #[serde(rename = "requestId")]
    pub request_id: String,
    #[serde(flatten)]
    pub rest: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct HeadPositionPayload {
    pub position: String,
}

#[derive(Debug, Deserialize)]
pub struct TouchEventPayload {
    #[serde(rename = "gesture_name")]
    pub gesture_name: String,
}

// ---- App -> core -------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SubscriptionUpdatePayload {
    pub subscriptions: Vec<String>,
    #[serde(rename = "locationRate", default)]
    pub location_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DisplayRequestPayload {
    pub layout: serde_json::Value,
    #[serde(default)]
    pub dashboard: bool,
}

#[derive(Debug, Deserialize)]
pub struct RgbLedControlPayload {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub action: String,
    pub color: String,
    pub ontime: u32,
    pub offtime: u32,
    pub count: u32,
}

#[derive(Debug, Deserialize)]
pub struct PhotoRequestPayload {
    #[serde(rename = "requestId")]
    pub request_id: String,
    #[serde(rename = "saveToGallery", default)]
    pub save_to_gallery: bool,
    #[serde(rename = "webhookUrl", default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AudioPlayRequestPayload {
    #[serde(rename = "requestId")]
    pub request_id: String,
    #[serde(flatten)]
    pub rest: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct RtmpStreamRequestPayload {
    #[serde(rename = "rtmpUrl", default)]
    pub rtmp_url: Option<String>,
}
