//! Reconnecting TCP transport.
//!
//! A [`TcpServer`] accepts any number of connections and a [`TcpClient`]
//! keeps a single outbound connection alive. Each endpoint owns one reactor
//! thread; every session of that endpoint runs there as a tokio task and every
//! callback fires there. Byte streams are split into frames by a
//! [`FrameCodec`], one instance per session.

pub use backoff::Backoff;
pub use client::{ClientState, TcpClient, HEARTBEAT_PAYLOAD};
pub use codec::{
    codec_factory, CodecFactory, FrameCodec, MagicCodec, DEFAULT_MAX_FRAME_LEN, HEADER_LEN, MAGIC,
};
pub use endpoint::Endpoint;
pub use handler::{ConnectHandler, DisconnectHandler, ErrorHandler, MessageHandler};
pub use server::TcpServer;

mod backoff;
mod client;
mod codec;
mod endpoint;
mod handler;
mod reactor;
mod server;
mod session;
mod write_queue;

/// Identifies a session within its endpoint.
pub type ConnId = i64;

/// The client reports its single session under this id.
pub const CLIENT_CONN_ID: ConnId = 0;

/// Accept failures on the server are reported under this id.
pub const ACCEPTOR_CONN_ID: ConnId = -1;
