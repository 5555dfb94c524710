//! Decode service client: discovery, decode requests and task notifications.

mod client;
pub mod discovery;
pub mod protocol;
mod receiver;
pub mod stub;

pub use client::{DecodeClient, NetEvent};
pub use discovery::Endpoint;
pub use protocol::{DecodeRequest, DecodeResponse, DecodeTask, ProtocolError, ProtocolMessage};
pub use receiver::ReceiveSocket;
