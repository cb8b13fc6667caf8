#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use streamlink::{
    codec_factory, ClientConfig, ConnId, Endpoint, MagicCodec, ServerConfig, TcpClient, TcpServer,
};

pub const WAIT: Duration = Duration::from_secs(5);

/// Polls `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}

pub fn server_config() -> ServerConfig {
    ServerConfig::new("127.0.0.1", 0)
}

/// Fast reconnects and no heartbeat, so tests see only their own frames.
pub fn client_config(port: u16) -> ClientConfig {
    let mut config = ClientConfig::new("127.0.0.1", port);
    config.reconnect_initial_delay_ms = 50;
    config.reconnect_max_delay_ms = 200;
    config.heartbeat_interval_ms = 0;
    config
}

/// A framed server that sends every message back to its sender.
pub fn echo_server(config: ServerConfig) -> (Arc<TcpServer>, SocketAddr) {
    let server = Arc::new(TcpServer::new(config));
    server.set_codec_factory(codec_factory(MagicCodec::new));
    let weak: Weak<TcpServer> = Arc::downgrade(&server);
    server.on_message(move |conn_id, payload| {
        if let Some(server) = weak.upgrade() {
            server.send(conn_id, MagicCodec::frame(&payload));
        }
    });
    server.start().unwrap();
    let addr = server.local_addr().unwrap();
    (server, addr)
}

/// Everything a client observed, in arrival order.
#[derive(Default)]
pub struct Recorder {
    pub connects: Mutex<Vec<ConnId>>,
    pub disconnects: Mutex<Vec<(ConnId, i32, String)>>,
    pub errors: Mutex<Vec<(ConnId, i32, String)>>,
    pub messages: Mutex<Vec<Bytes>>,
}

impl Recorder {
    pub fn total(&self) -> usize {
        self.connects.lock().len()
            + self.disconnects.lock().len()
            + self.errors.lock().len()
            + self.messages.lock().len()
    }
}

pub fn recorded_client(config: ClientConfig) -> (TcpClient, Arc<Recorder>) {
    let client = TcpClient::new(config);
    let recorder = Arc::new(Recorder::default());
    client.set_codec_factory(codec_factory(MagicCodec::new));

    let rec = recorder.clone();
    client.on_connect(move |conn_id| rec.connects.lock().push(conn_id));
    let rec = recorder.clone();
    client.on_disconnect(move |conn_id, code, message| {
        rec.disconnects.lock().push((conn_id, code, message.to_string()))
    });
    let rec = recorder.clone();
    client.on_error(move |conn_id, code, message| {
        rec.errors.lock().push((conn_id, code, message.to_string()))
    });
    let rec = recorder.clone();
    client.on_message(move |payload| rec.messages.lock().push(payload));
    (client, recorder)
}
