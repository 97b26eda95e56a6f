//! CMake server-mode protocol
//!
//! - **framing**: HEADER/FOOTER message delimiting over a transport
//! - **messages**: inbound request kinds and outbound message roles
//! - **handlers**: response assembly per request kind
//! - **session**: hello/handshake state machine and request dispatch
//! - **listener**: socket or named pipe accepting the single client

pub mod framing;
pub mod handlers;
pub mod listener;
pub mod messages;
pub mod session;

pub use listener::{ListenerError, serve};
pub use messages::Capabilities;
