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

use std::future::{self, Future};
use std::io;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::codec::FrameCodec;
use super::handler::Dispatcher;
use super::write_queue::WriteQueue;
use super::ConnId;
use crate::{AppError, CODE_CLOSED};

type WriteFuture = Pin<Box<dyn Future<Output = (OwnedWriteHalf, io::Result<()>)> + Send>>;

/// Per-session limits, copied from the owner's config.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SessionOptions {
    pub read_buffer_size: usize,
    pub max_write_queue_size: usize,
}

/// Why a session ended on its own; sent to the owner loop, which deregisters
/// the session before firing `on_disconnect`.
#[derive(Debug)]
pub(crate) struct SessionClosed {
    pub conn_id: ConnId,
    pub code: i32,
    pub message: String,
}

impl SessionClosed {
    fn from_io(conn_id: ConnId, err: &io::Error) -> Self {
        let err = AppError::transport(err);
        SessionClosed {
            conn_id,
            code: err.code(),
            message: err.to_string(),
        }
    }

    fn peer_closed(conn_id: ConnId) -> Self {
        SessionClosed {
            conn_id,
            code: CODE_CLOSED,
            message: "connection closed by peer".to_string(),
        }
    }
}

/// The owner's side of a running session.
///
/// Dropping the handle (or calling `close`) ends the session without any
/// callback; the socket is closed when the task is torn down.
#[derive(Debug)]
pub(crate) struct SessionHandle {
    writes: mpsc::UnboundedSender<Outbound>,
    task: JoinHandle<()>,
}

/// Bytes headed for the socket.
#[derive(Debug)]
enum Outbound {
    /// Already on-wire bytes, written as given.
    Wire(Bytes),
    /// A payload the session frames with its own codec first.
    Payload(Bytes),
}

impl SessionHandle {
    /// Queues `payload` for writing. Silently ignored if the session already ended.
    pub fn enqueue(&self, payload: Bytes) {
        let _ = self.writes.send(Outbound::Wire(payload));
    }

    /// Like `enqueue`, but the session's codec encodes `payload` first.
    pub fn enqueue_encoded(&self, payload: Bytes) {
        let _ = self.writes.send(Outbound::Payload(payload));
    }

    pub fn close(self) {
        self.task.abort();
    }
}

/// Live state of one TCP connection.
///
/// Runs as a single task on the owner's reactor: reads, decodes and delivers
/// inbound frames, and drains the write queue one write at a time. It holds
/// its connection id and a channel back to the owner, never the owner itself.
pub(crate) struct Session {
    conn_id: ConnId,
    reader: OwnedReadHalf,
    writer: Option<OwnedWriteHalf>,
    read_buffer: Vec<u8>,
    write_queue: WriteQueue,
    codec: Option<Box<dyn FrameCodec>>,
    writes: mpsc::UnboundedReceiver<Outbound>,
    dispatcher: Arc<Dispatcher>,
}

impl Session {
    /// Spawns the session task on the current reactor.
    pub fn spawn(
        conn_id: ConnId,
        stream: TcpStream,
        options: SessionOptions,
        dispatcher: Arc<Dispatcher>,
        closed_tx: mpsc::UnboundedSender<SessionClosed>,
    ) -> SessionHandle {
        let (reader, writer) = stream.into_split();
        let (writes_tx, writes_rx) = mpsc::unbounded_channel();
        let session = Session {
            conn_id,
            reader,
            writer: Some(writer),
            read_buffer: vec![0; options.read_buffer_size],
            write_queue: WriteQueue::new(options.max_write_queue_size),
            codec: dispatcher.new_codec(),
            writes: writes_rx,
            dispatcher,
        };
        let task = tokio::spawn(async move {
            if let Some(closed) = session.run().await {
                // the owner may already be gone during shutdown
                let _ = closed_tx.send(closed);
            }
        });
        SessionHandle {
            writes: writes_tx,
            task,
        }
    }

    /// Returns `Some` when the connection failed or the peer closed it,
    /// `None` when the owner dropped its handle.
    async fn run(mut self) -> Option<SessionClosed> {
        debug!("session {} started", self.conn_id);
        let mut in_flight: Option<WriteFuture> = None;
        loop {
            if in_flight.is_none() {
                in_flight = self.start_write();
            }

            tokio::select! {
                biased;
                outbound = self.writes.recv() => match outbound {
                    Some(Outbound::Wire(bytes)) => self.enqueue(bytes),
                    Some(Outbound::Payload(payload)) => {
                        let bytes = match self.codec.as_ref() {
                            Some(codec) => codec.encode(&payload),
                            None => payload,
                        };
                        self.enqueue(bytes);
                    }
                    None => {
                        debug!("session {} released by owner", self.conn_id);
                        return None;
                    }
                },
                (writer, result) = wait_write(&mut in_flight) => {
                    in_flight = None;
                    self.writer = Some(writer);
                    match result {
                        Ok(()) => {
                            self.write_queue.pop_front();
                        }
                        Err(err) => {
                            debug!("session {} write error: {}", self.conn_id, err);
                            return Some(SessionClosed::from_io(self.conn_id, &err));
                        }
                    }
                },
                result = self.reader.read(&mut self.read_buffer) => match result {
                    Ok(0) => {
                        debug!("session {} closed by peer", self.conn_id);
                        return Some(SessionClosed::peer_closed(self.conn_id));
                    }
                    Ok(n) => self.deliver(n),
                    Err(err) => {
                        debug!("session {} read error: {}", self.conn_id, err);
                        return Some(SessionClosed::from_io(self.conn_id, &err));
                    }
                },
            }
        }
    }

    fn enqueue(&mut self, payload: Bytes) {
        if let Err(err) = self.write_queue.push(payload) {
            warn!("session {} dropped a write: {}", self.conn_id, err);
            self.dispatcher
                .error(self.conn_id, err.code(), &err.to_string());
        }
    }

    /// Starts writing the queue head if the socket is idle.
    fn start_write(&mut self) -> Option<WriteFuture> {
        let payload = self.write_queue.front()?.clone();
        let mut writer = self.writer.take()?;
        trace!("session {} writing {} bytes", self.conn_id, payload.len());
        Some(Box::pin(async move {
            let result = writer.write_all(&payload).await;
            (writer, result)
        }))
    }

    fn deliver(&mut self, n: usize) {
        let chunk = &self.read_buffer[..n];
        let Some(codec) = self.codec.as_mut() else {
            self.dispatcher
                .message(self.conn_id, Bytes::copy_from_slice(chunk));
            return;
        };

        codec.append(chunk);
        while let Some(frame) = codec.try_decode() {
            self.dispatcher.message(self.conn_id, frame);
        }

        let discarded = codec.take_discarded();
        if discarded > 0 {
            let err = AppError::Protocol(format!(
                "discarded {} bytes while resynchronizing",
                discarded
            ));
            warn!("session {}: {}", self.conn_id, err);
            self.dispatcher
                .error(self.conn_id, err.code(), &err.to_string());
        }
    }
}

async fn wait_write(in_flight: &mut Option<WriteFuture>) -> (OwnedWriteHalf, io::Result<()>) {
    match in_flight {
        Some(write) => write.await,
        None => future::pending().await,
    }
}
