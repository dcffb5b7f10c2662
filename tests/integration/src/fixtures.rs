//! Test fixtures and payload generators
//!
//! Dispatch payloads shaped like the ones the gateway sends.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

/// Token every test session identifies with
pub const TEST_TOKEN: &str = "test-token";

/// Counter for unique snowflakes
static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Get a unique snowflake-like id
pub fn unique_id() -> String {
    (175_928_847_299_117_063 + COUNTER.fetch_add(1, Ordering::SeqCst)).to_string()
}

/// A fresh session id
pub fn unique_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Bot user payload
pub fn user_payload(username: &str) -> Value {
    json!({
        "id": unique_id(),
        "username": username,
        "bot": true,
    })
}

/// READY payload for `session_id`
pub fn ready_payload(session_id: &str) -> Value {
    json!({
        "v": 10,
        "user": user_payload("shard-bot"),
        "guilds": [
            { "id": unique_id(), "unavailable": true },
        ],
        "session_id": session_id,
    })
}

/// READY payload carrying a resume URL
pub fn ready_payload_with_resume_url(session_id: &str, resume_url: &str) -> Value {
    let mut payload = ready_payload(session_id);
    payload["resume_gateway_url"] = json!(resume_url);
    payload
}

/// MESSAGE_CREATE payload
pub fn message_payload(content: &str) -> Value {
    json!({
        "id": unique_id(),
        "channel_id": unique_id(),
        "author": user_payload("someone"),
        "content": content,
        "timestamp": "2024-01-01T00:00:00.000000+00:00",
    })
}
