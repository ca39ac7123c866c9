use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct FcmRequest {
    pub message: FcmMessage,
}

/// One FCM HTTP v1 message. Title and body travel in the data payload and the
/// platform sections request a background delivery.
#[derive(Debug, Clone, Serialize)]
pub struct FcmMessage {
    pub token: String,
    pub data: HashMap<String, String>,
    pub android: AndroidConfig,
    pub apns: ApnsConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct AndroidConfig {
    pub ttl: String,
    pub priority: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApnsConfig {
    pub headers: HashMap<String, String>,
    pub payload: ApnsPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApnsPayload {
    pub aps: Aps,
}

#[derive(Debug, Clone, Serialize)]
pub struct Aps {
    #[serde(rename = "content-available")]
    pub content_available: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FcmResponse {
    pub name: Option<String>,
}
