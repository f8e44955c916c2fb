//! Typed records used across layers.

pub mod email;
pub mod event;
pub mod thread;
