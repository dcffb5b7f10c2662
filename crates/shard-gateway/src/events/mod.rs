//! Gateway events
//!
//! Dispatch events received from the gateway. `Event` is the decoded, tagged form of a
//! dispatch frame; `EventPayload` lets handlers be registered against one payload type.

mod event_types;
mod payloads;

pub use event_types::{GatewayEventType, ANY_EVENT};
pub use payloads::{
    AttachmentPayload, ChannelCreateEvent, ChannelDeleteEvent, ChannelPayload,
    ChannelUpdateEvent, EmojiPayload, GuildCreateEvent, GuildDeleteEvent, GuildMemberAddEvent,
    GuildMemberRemoveEvent, GuildMemberUpdateEvent, GuildMembersChunkEvent, GuildUpdateEvent,
    MemberPayload, MessageCreateEvent, MessageDeleteEvent, MessageReactionAddEvent,
    MessageReactionRemoveEvent, MessageReferencePayload, MessageUpdateEvent, PresenceUpdateEvent,
    ReactionPayload, ReadyEvent, ResumedEvent, RolePayload, TypingStartEvent, UnavailableGuild,
    UserIdPayload, UserPayload, UserUpdateEvent, VoiceStateUpdateEvent,
};

use serde_json::Value;

/// A payload type that belongs to exactly one gateway event type
pub trait EventPayload: Send + Sync + 'static {
    /// Event type this payload is decoded from
    const KIND: GatewayEventType;

    /// Borrow the payload out of a decoded event, if the event is of this kind
    fn extract(event: &Event) -> Option<&Self>;
}

macro_rules! gateway_events {
    ($($variant:ident => $payload:ty),* $(,)?) => {
        /// A decoded dispatch event
        #[derive(Debug, Clone)]
        pub enum Event {
            $($variant($payload),)*
        }

        impl Event {
            /// Event type of this event
            #[must_use]
            pub fn kind(&self) -> GatewayEventType {
                match self {
                    $(Self::$variant(_) => GatewayEventType::$variant,)*
                }
            }

            fn decode_kind(kind: GatewayEventType, data: Value) -> Result<Self, serde_json::Error> {
                match kind {
                    $(GatewayEventType::$variant => serde_json::from_value(data).map(Self::$variant),)*
                }
            }
        }

        $(
            impl EventPayload for $payload {
                const KIND: GatewayEventType = GatewayEventType::$variant;

                fn extract(event: &Event) -> Option<&Self> {
                    match event {
                        Event::$variant(payload) => Some(payload),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }
            }
        )*
    };
}

gateway_events! {
    Ready => ReadyEvent,
    Resumed => ResumedEvent,
    GuildCreate => GuildCreateEvent,
    GuildUpdate => GuildUpdateEvent,
    GuildDelete => GuildDeleteEvent,
    ChannelCreate => ChannelCreateEvent,
    ChannelUpdate => ChannelUpdateEvent,
    ChannelDelete => ChannelDeleteEvent,
    MessageCreate => MessageCreateEvent,
    MessageUpdate => MessageUpdateEvent,
    MessageDelete => MessageDeleteEvent,
    MessageReactionAdd => MessageReactionAddEvent,
    MessageReactionRemove => MessageReactionRemoveEvent,
    GuildMemberAdd => GuildMemberAddEvent,
    GuildMemberUpdate => GuildMemberUpdateEvent,
    GuildMemberRemove => GuildMemberRemoveEvent,
    GuildMembersChunk => GuildMembersChunkEvent,
    PresenceUpdate => PresenceUpdateEvent,
    TypingStart => TypingStartEvent,
    UserUpdate => UserUpdateEvent,
    VoiceStateUpdate => VoiceStateUpdateEvent,
}

impl Event {
    /// Decode a dispatch payload by its event name
    ///
    /// Returns `Ok(None)` for event names this client does not know. A known name whose
    /// payload does not match the expected shape is an error.
    pub fn decode(name: &str, data: Value) -> Result<Option<Self>, serde_json::Error> {
        let Some(kind) = GatewayEventType::from_str(name) else {
            return Ok(None);
        };

        // RESUMED may arrive with a null payload
        let data = if data.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            data
        };

        Self::decode_kind(kind, data).map(Some)
    }

    /// Wire name of this event
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.kind().as_str()
    }
}
