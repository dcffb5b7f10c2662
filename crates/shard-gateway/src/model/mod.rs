//! Value types shared by protocol payloads and events

mod presence;
mod snowflake;

pub use presence::{Activity, ActivityType, Status};
pub use snowflake::{Snowflake, SnowflakeParseError};
