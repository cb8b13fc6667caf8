mod network;
mod service;

pub use network::{
    codec_factory, Backoff, ClientState, CodecFactory, ConnId, ConnectHandler, DisconnectHandler,
    Endpoint, ErrorHandler, FrameCodec, MagicCodec, MessageHandler, TcpClient, TcpServer,
    ACCEPTOR_CONN_ID, CLIENT_CONN_ID, DEFAULT_MAX_FRAME_LEN, HEADER_LEN, HEARTBEAT_PAYLOAD, MAGIC,
};
pub use service::{
    setup_local_tracing, setup_tracing, AppError, AppResult, ClientConfig, LogConfig,
    ServerConfig, Shutdown, TransportConfig, CODE_CLOSED, CODE_PROTOCOL, CODE_UNKNOWN,
};
