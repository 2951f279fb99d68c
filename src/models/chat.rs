use serde::{Deserialize, Serialize};

use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
}

impl ChatMessage {
    pub fn new(
        sender_id: impl Into<String>,
        sender_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0);
        ChatMessage {
            sender_id: sender_id.into(),
            sender_name: sender_name.into(),
            text: text.into(),
            timestamp,
        }
    }
}
