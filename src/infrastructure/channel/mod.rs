//! Push channel adapter (Socket.IO over WebSocket)

mod messages;
mod reconnect;
mod websocket;

pub use reconnect::ReconnectConfig;
pub use websocket::WsProgressChannel;
