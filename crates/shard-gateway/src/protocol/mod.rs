//! Gateway protocol definitions
//!
//! Op codes, close codes, intents, message envelope and command payloads.

mod close_codes;
mod intents;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::{CloseCode, NORMAL_CLOSURE, RESUMABLE_CLOSURE};
pub use intents::Intents;
pub use messages::GatewayMessage;
pub use opcodes::OpCode;
pub use payloads::{
    HelloPayload, IdentifyPayload, IdentifyProperties, PresenceUpdatePayload,
    RequestGuildMembersPayload, ResumePayload,
};

/// Gateway API version requested on connect
pub const API_VERSION: u8 = 10;

/// Append the version and encoding query when the URL carries none
#[must_use]
pub fn gateway_url_with_query(url: &str) -> String {
    if url.contains('?') {
        url.to_string()
    } else {
        format!("{}?v={API_VERSION}&encoding=json", url.trim_end_matches('/'))
    }
}
