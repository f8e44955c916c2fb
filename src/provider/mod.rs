//! Email provider integration: typed wire contract and HTTP client.
//!
//! One `ProviderClient` is constructed at startup and shared through
//! `AppState`; nothing else in the crate talks to the provider directly.

pub mod client;
pub mod types;

pub use client::{ProviderClient, ProviderError};
pub use types::{
  Header, MessagePage, OutboundRequest, ProviderMessage, ProviderRecipient, SendOutcome,
};
