//! Chat-completion access for the two model-assisted stages.
//!
//! Both stages send one prompt, await one reply and decode the JSON object
//! embedded in it. Any failure along that path is reported as an error so
//! the caller can switch to its deterministic fallback.

mod client;
mod reply;

pub use client::{CompletionClient, CompletionSettings, OpenAiChatClient};
pub use reply::{decode_reply, extract_json_span};
