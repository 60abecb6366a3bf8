//! Realtime session protocol over WebSocket

pub mod handler;
pub mod protocol;
