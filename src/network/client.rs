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

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::net::{self, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, info, trace, warn};

use super::backoff::Backoff;
use super::endpoint::{Endpoint, HasDispatcher};
use super::handler::Dispatcher;
use super::reactor::Reactor;
use super::session::{Session, SessionClosed, SessionOptions};
use super::{ConnId, CLIENT_CONN_ID};
use crate::{AppError, AppResult, ClientConfig, Shutdown, CODE_UNKNOWN};

/// Keep-alive payload, encoded through the session codec before sending.
pub const HEARTBEAT_PAYLOAD: &[u8] = &[0x00];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    Connecting,
    Connected,
    /// Waiting out the reconnect delay.
    Disconnected,
    Stopped,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClientState::Idle => "idle",
            ClientState::Connecting => "connecting",
            ClientState::Connected => "connected",
            ClientState::Disconnected => "disconnected",
            ClientState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct Running {
    reactor: Reactor,
    commands: mpsc::UnboundedSender<Bytes>,
}

/// Maintains one outbound connection and re-establishes it after failures.
///
/// The reconnect delay starts at `reconnect_initial_delay_ms`, doubles after
/// each consecutive failure up to `reconnect_max_delay_ms`, and resets once a
/// connect succeeds. While connected a heartbeat frame goes out every
/// `heartbeat_interval_ms`.
///
/// The client has a single session, reported with connection id 0.
pub struct TcpClient {
    config: ClientConfig,
    dispatcher: Arc<Dispatcher>,
    state: Arc<RwLock<ClientState>>,
    running: Mutex<Option<Running>>,
}

impl TcpClient {
    pub fn new(config: ClientConfig) -> Self {
        TcpClient {
            config,
            dispatcher: Arc::new(Dispatcher::default()),
            state: Arc::new(RwLock::new(ClientState::Idle)),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> ClientState {
        *self.state.read()
    }

    /// Queues `payload` on the live session.
    ///
    /// Without a live session, or when the client is not running, the payload
    /// is dropped without any error.
    pub fn send(&self, payload: impl Into<Bytes>) {
        if !self.dispatcher.is_running() {
            return;
        }
        if let Some(running) = self.running.lock().as_ref() {
            let _ = running.commands.send(payload.into());
        }
    }

    pub fn on_message<F>(&self, cb: F)
    where
        F: Fn(Bytes) + Send + Sync + 'static,
    {
        self.dispatcher
            .set_on_message(Arc::new(move |_: ConnId, payload: Bytes| cb(payload)));
    }
}

impl Endpoint for TcpClient {
    fn start(&self) -> AppResult<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Ok(());
        }
        self.config.validate()?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        let client_loop = ClientLoop {
            host: self.config.host.clone(),
            port: self.config.port,
            backoff: Backoff::new(
                self.config.reconnect_initial_delay(),
                self.config.reconnect_max_delay(),
            ),
            heartbeat_interval: self.config.heartbeat_interval(),
            options: SessionOptions {
                read_buffer_size: self.config.read_buffer_size,
                max_write_queue_size: self.config.max_write_queue_size,
            },
            dispatcher: self.dispatcher.clone(),
            state: self.state.clone(),
            commands: commands_rx,
            closed_tx,
            closed_rx,
        };

        self.dispatcher.set_running(true);
        *self.state.write() = ClientState::Connecting;
        let reactor = Reactor::start(
            "streamlink-client",
            || Ok(()),
            move |(), shutdown| client_loop.run(shutdown),
        );
        let reactor = match reactor {
            Ok(reactor) => reactor,
            Err(err) => {
                self.dispatcher.set_running(false);
                *self.state.write() = ClientState::Stopped;
                return Err(err);
            }
        };

        info!(
            "tcp client started for {}:{}",
            self.config.host, self.config.port
        );
        *running = Some(Running {
            reactor,
            commands: commands_tx,
        });
        Ok(())
    }

    fn stop(&self) {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return;
        };
        self.dispatcher.set_running(false);
        running.reactor.shutdown();
        *self.state.write() = ClientState::Stopped;
        info!(
            "tcp client for {}:{} stopped",
            self.config.host, self.config.port
        );
    }

    fn is_running(&self) -> bool {
        self.dispatcher.is_running()
    }
}

impl HasDispatcher for TcpClient {
    fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

impl Drop for TcpClient {
    fn drop(&mut self) {
        self.stop();
        debug!("tcp client dropped");
    }
}

/// Resolves `target` and tries each address in turn.
async fn connect(target: &str) -> AppResult<TcpStream> {
    let addrs = net::lookup_host(target)
        .await
        .map_err(|err| AppError::transport(&err))?;
    let mut last_err = None;
    for addr in addrs {
        trace!("connecting to {}", addr);
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(match last_err {
        Some(err) => AppError::transport(&err),
        None => AppError::Transport {
            code: CODE_UNKNOWN,
            message: format!("{} resolved to no addresses", target),
        },
    })
}

/// State owned exclusively by the client's reactor thread.
struct ClientLoop {
    host: String,
    port: u16,
    backoff: Backoff,
    heartbeat_interval: Option<Duration>,
    options: SessionOptions,
    dispatcher: Arc<Dispatcher>,
    state: Arc<RwLock<ClientState>>,
    commands: mpsc::UnboundedReceiver<Bytes>,
    closed_tx: mpsc::UnboundedSender<SessionClosed>,
    closed_rx: mpsc::UnboundedReceiver<SessionClosed>,
}

impl ClientLoop {
    async fn run(mut self, mut shutdown: Shutdown) {
        let target = format!("{}:{}", self.host, self.port);
        loop {
            self.set_state(ClientState::Connecting);
            let Some(connected) = self.until_shutdown(connect(&target), &mut shutdown).await
            else {
                break;
            };
            match connected {
                Ok(stream) => {
                    self.backoff.reset();
                    if !self.serve(stream, &mut shutdown).await {
                        break;
                    }
                }
                Err(err) => {
                    warn!("connect to {} failed: {}", target, err);
                    self.dispatcher
                        .error(CLIENT_CONN_ID, err.code(), &err.to_string());
                }
            }

            self.set_state(ClientState::Disconnected);
            let delay = self.backoff.next_delay();
            debug!(
                "reconnecting to {} in {:?} (attempt {})",
                target,
                delay,
                self.backoff.failures()
            );
            if self
                .until_shutdown(time::sleep(delay), &mut shutdown)
                .await
                .is_none()
            {
                break;
            }
        }
        self.set_state(ClientState::Stopped);
        debug!("client loop for {} exited", target);
    }

    /// Drives one connected session. Returns `false` when the client is stopping.
    async fn serve(&mut self, stream: TcpStream, shutdown: &mut Shutdown) -> bool {
        if let Err(err) = stream.set_nodelay(true) {
            debug!("set_nodelay failed: {}", err);
        }
        let session = Session::spawn(
            CLIENT_CONN_ID,
            stream,
            self.options,
            self.dispatcher.clone(),
            self.closed_tx.clone(),
        );
        self.set_state(ClientState::Connected);
        info!("connected to {}:{}", self.host, self.port);
        self.dispatcher.connect(CLIENT_CONN_ID);

        let period = self.heartbeat_interval;
        let heartbeat = time::sleep(period.unwrap_or_default());
        tokio::pin!(heartbeat);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    session.close();
                    return false;
                }
                Some(closed) = self.closed_rx.recv() => {
                    self.set_state(ClientState::Disconnected);
                    info!(
                        "disconnected from {}:{}: {}",
                        self.host, self.port, closed.message
                    );
                    self.dispatcher
                        .disconnect(CLIENT_CONN_ID, closed.code, &closed.message);
                    return true;
                }
                Some(payload) = self.commands.recv() => session.enqueue(payload),
                _ = &mut heartbeat, if period.is_some() => {
                    trace!("sending heartbeat");
                    session.enqueue_encoded(Bytes::from_static(HEARTBEAT_PAYLOAD));
                    if let Some(period) = period {
                        heartbeat.as_mut().reset(Instant::now() + period);
                    }
                }
            }
        }
    }

    /// Awaits `fut` unless a stop arrives first. Sends issued meanwhile have
    /// no session to go to and are dropped.
    async fn until_shutdown<F: Future>(
        &mut self,
        fut: F,
        shutdown: &mut Shutdown,
    ) -> Option<F::Output> {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => return None,
                Some(payload) = self.commands.recv() => {
                    trace!("not connected, dropping {} bytes", payload.len());
                }
                output = &mut fut => return Some(output),
            }
        }
    }

    fn set_state(&self, state: ClientState) {
        *self.state.write() = state;
    }
}
