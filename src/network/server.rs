// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::endpoint::{Endpoint, HasDispatcher};
use super::handler::Dispatcher;
use super::reactor::Reactor;
use super::session::{Session, SessionClosed, SessionHandle, SessionOptions};
use super::{ConnId, ACCEPTOR_CONN_ID};
use crate::{AppError, AppResult, ServerConfig, Shutdown, CODE_CLOSED};

/// Requests marshaled from caller threads onto the server loop.
#[derive(Debug)]
enum ServerCommand {
    Send { conn_id: ConnId, payload: Bytes },
    Close { conn_id: ConnId },
}

/// Bookkeeping for one `start()`..`stop()` cycle.
#[derive(Debug)]
struct Running {
    reactor: Reactor,
    commands: mpsc::UnboundedSender<ServerCommand>,
    local_addr: SocketAddr,
}

/// Accepts many inbound connections and keeps a registry of live sessions.
///
/// Connection ids start at 1 and grow monotonically for the life of the
/// instance. All calls are thread-safe; `send` and `close` are posted to the
/// server's reactor thread, which alone owns the registry.
///
/// ```no_run
/// use streamlink::{codec_factory, Endpoint, MagicCodec, ServerConfig, TcpServer};
///
/// let server = TcpServer::new(ServerConfig::new("127.0.0.1", 9000));
/// server.set_codec_factory(codec_factory(MagicCodec::new));
/// server.on_message(|conn_id, payload| {
///     println!("{} sent {} bytes", conn_id, payload.len());
/// });
/// server.start().expect("bind failed");
/// ```
pub struct TcpServer {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
    next_conn_id: Arc<AtomicI64>,
    connection_count: Arc<AtomicUsize>,
    running: Mutex<Option<Running>>,
}

impl TcpServer {
    pub fn new(config: ServerConfig) -> Self {
        TcpServer {
            config,
            dispatcher: Arc::new(Dispatcher::default()),
            next_conn_id: Arc::new(AtomicI64::new(1)),
            connection_count: Arc::new(AtomicUsize::new(0)),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The bound address while running; useful when configured with port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|running| running.local_addr)
    }

    /// Number of registered sessions. Updated before `on_connect` and
    /// `on_disconnect` fire.
    pub fn connection_count(&self) -> usize {
        self.connection_count.load(Ordering::Acquire)
    }

    /// Queues `payload` for `conn_id`. Unknown or closed ids are a silent no-op.
    pub fn send(&self, conn_id: ConnId, payload: impl Into<Bytes>) {
        self.post(ServerCommand::Send {
            conn_id,
            payload: payload.into(),
        });
    }

    /// Closes one connection; `on_disconnect` fires with code 0.
    pub fn close(&self, conn_id: ConnId) {
        self.post(ServerCommand::Close { conn_id });
    }

    pub fn on_message<F>(&self, cb: F)
    where
        F: Fn(ConnId, Bytes) + Send + Sync + 'static,
    {
        self.dispatcher.set_on_message(Arc::new(cb));
    }

    fn post(&self, command: ServerCommand) {
        if !self.dispatcher.is_running() {
            return;
        }
        if let Some(running) = self.running.lock().as_ref() {
            let _ = running.commands.send(command);
        }
    }
}

impl Endpoint for TcpServer {
    /// Binds and listens synchronously, then starts accepting on the reactor.
    fn start(&self) -> AppResult<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Ok(());
        }
        self.config.validate()?;

        let addr = self.config.listen_address();
        let std_listener =
            std::net::TcpListener::bind(&addr).map_err(|source| AppError::Bind {
                addr: addr.clone(),
                source,
            })?;
        std_listener.set_nonblocking(true)?;
        let local_addr = std_listener.local_addr()?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let dispatcher = self.dispatcher.clone();
        let next_conn_id = self.next_conn_id.clone();
        let connection_count = self.connection_count.clone();
        let options = SessionOptions {
            read_buffer_size: self.config.read_buffer_size,
            max_write_queue_size: self.config.max_write_queue_size,
        };

        self.dispatcher.set_running(true);
        let reactor = Reactor::start(
            "streamlink-server",
            move || Ok(TcpListener::from_std(std_listener)?),
            move |listener, shutdown| {
                let (closed_tx, closed_rx) = mpsc::unbounded_channel();
                let server_loop = ServerLoop {
                    listener,
                    sessions: HashMap::new(),
                    next_conn_id,
                    options,
                    dispatcher,
                    connection_count,
                    commands: commands_rx,
                    closed_tx,
                    closed_rx,
                };
                server_loop.run(shutdown)
            },
        );
        let reactor = match reactor {
            Ok(reactor) => reactor,
            Err(err) => {
                self.dispatcher.set_running(false);
                return Err(err);
            }
        };

        info!("tcp server listening on {}", local_addr);
        *running = Some(Running {
            reactor,
            commands: commands_tx,
            local_addr,
        });
        Ok(())
    }

    fn stop(&self) {
        // take the handle out first so no lock is held while joining
        let running = self.running.lock().take();
        let Some(running) = running else {
            return;
        };
        self.dispatcher.set_running(false);
        running.reactor.shutdown();
        info!("tcp server on {} stopped", running.local_addr);
    }

    fn is_running(&self) -> bool {
        self.dispatcher.is_running()
    }
}

impl HasDispatcher for TcpServer {
    fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

impl Drop for TcpServer {
    fn drop(&mut self) {
        self.stop();
        debug!("tcp server dropped");
    }
}

/// State owned exclusively by the server's reactor thread.
struct ServerLoop {
    listener: TcpListener,
    sessions: HashMap<ConnId, SessionHandle>,
    // survives restarts of the same server, so ids are never reused
    next_conn_id: Arc<AtomicI64>,
    options: SessionOptions,
    dispatcher: Arc<Dispatcher>,
    connection_count: Arc<AtomicUsize>,
    commands: mpsc::UnboundedReceiver<ServerCommand>,
    closed_tx: mpsc::UnboundedSender<SessionClosed>,
    closed_rx: mpsc::UnboundedReceiver<SessionClosed>,
}

impl ServerLoop {
    async fn run(mut self, mut shutdown: Shutdown) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    debug!("server loop received shutdown signal");
                    break;
                }
                Some(closed) = self.closed_rx.recv() => self.on_session_closed(closed),
                Some(command) = self.commands.recv() => self.handle_command(command),
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.register(stream, peer),
                    Err(err) => {
                        // transient (EMFILE, ECONNABORTED...); keep accepting
                        let err = AppError::transport(&err);
                        error!("accept error: {}", err);
                        self.dispatcher.error(ACCEPTOR_CONN_ID, err.code(), &err.to_string());
                    }
                },
            }
        }
        self.close_all();
    }

    fn register(&mut self, stream: TcpStream, peer: SocketAddr) {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = stream.set_nodelay(true) {
            debug!("set_nodelay failed for {}: {}", peer, err);
        }
        let handle = Session::spawn(
            conn_id,
            stream,
            self.options,
            self.dispatcher.clone(),
            self.closed_tx.clone(),
        );
        self.sessions.insert(conn_id, handle);
        self.sync_count();
        debug!("accepted connection {} from {}", conn_id, peer);
        // the session task cannot run before this returns, so on_connect
        // always precedes its first on_message
        self.dispatcher.connect(conn_id);
    }

    fn handle_command(&mut self, command: ServerCommand) {
        match command {
            ServerCommand::Send { conn_id, payload } => {
                if let Some(session) = self.sessions.get(&conn_id) {
                    session.enqueue(payload);
                }
            }
            ServerCommand::Close { conn_id } => {
                if let Some(session) = self.sessions.remove(&conn_id) {
                    session.close();
                    self.sync_count();
                    debug!("connection {} closed locally", conn_id);
                    self.dispatcher
                        .disconnect(conn_id, CODE_CLOSED, "connection closed locally");
                }
            }
        }
    }

    fn on_session_closed(&mut self, closed: SessionClosed) {
        // deregister first: a disconnect callback never sees its own id registered
        if self.sessions.remove(&closed.conn_id).is_none() {
            return;
        }
        self.sync_count();
        debug!(
            "connection {} disconnected: {} ({})",
            closed.conn_id, closed.message, closed.code
        );
        self.dispatcher
            .disconnect(closed.conn_id, closed.code, &closed.message);
    }

    fn close_all(&mut self) {
        for (_, session) in self.sessions.drain() {
            session.close();
        }
        self.sync_count();
        debug!("server loop closed all sessions");
    }

    fn sync_count(&self) {
        self.connection_count
            .store(self.sessions.len(), Ordering::Release);
    }
}
