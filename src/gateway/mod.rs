//! Client-facing WebSocket surface

pub mod protocol;
mod server;

pub use protocol::{ClientEvent, ClientSink, ServerEvent};
pub use server::Gateway;
