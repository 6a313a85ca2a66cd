#![forbid(unsafe_code)]

//! Persistent control channel to the remote task manager.
//!
//! One supervised task owns the websocket. It delivers the store's outbox in
//! sequence order and turns inbound start frames into `running` transitions
//! that are published on the [`FanoutHub`].

mod backoff;
mod client;
mod fanout;
mod inbound;
mod session;
mod wire;

pub use backoff::BackoffPolicy;
pub use client::{ChannelConfig, ChannelState, ChannelStatus, ControlChannel, SharedStore};
pub use fanout::{FanoutHub, GroupMessage, MESSAGING, trial_view_json};
pub use inbound::{InboundError, parse_start};
pub use session::SessionError;
pub use wire::{InboundStart, OutboundMessage};
