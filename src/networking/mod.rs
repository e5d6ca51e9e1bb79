//! Waku REST bridge client and the content topics relayers speak on.

mod client;
pub use client::{WakuApiClient, WakuRequestMethod, WakuResponse};

mod message;
pub use message::WakuRelayMessage;

pub mod topics;
