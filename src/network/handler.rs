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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use super::codec::{CodecFactory, FrameCodec};
use super::ConnId;

pub type ConnectHandler = dyn Fn(ConnId) + Send + Sync;
pub type DisconnectHandler = dyn Fn(ConnId, i32, &str) + Send + Sync;
pub type ErrorHandler = dyn Fn(ConnId, i32, &str) + Send + Sync;
pub type MessageHandler = dyn Fn(ConnId, Bytes) + Send + Sync;

type Slot<T> = RwLock<Option<Arc<T>>>;

/// Callback slots and the running flag shared by an endpoint and its loop.
///
/// Each slot holds at most one handler; setting a new one replaces the old.
/// Every dispatch first checks the running flag, so nothing already queued on
/// the loop can reach user code once `stop()` has begun.
#[derive(Default)]
pub struct Dispatcher {
    running: AtomicBool,
    on_connect: Slot<ConnectHandler>,
    on_disconnect: Slot<DisconnectHandler>,
    on_error: Slot<ErrorHandler>,
    on_message: Slot<MessageHandler>,
    codec_factory: RwLock<Option<CodecFactory>>,
}

impl Dispatcher {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Returns the previous value.
    pub fn set_running(&self, running: bool) -> bool {
        self.running.swap(running, Ordering::AcqRel)
    }

    pub fn set_on_connect(&self, cb: Arc<ConnectHandler>) {
        *self.on_connect.write() = Some(cb);
    }

    pub fn set_on_disconnect(&self, cb: Arc<DisconnectHandler>) {
        *self.on_disconnect.write() = Some(cb);
    }

    pub fn set_on_error(&self, cb: Arc<ErrorHandler>) {
        *self.on_error.write() = Some(cb);
    }

    pub fn set_on_message(&self, cb: Arc<MessageHandler>) {
        *self.on_message.write() = Some(cb);
    }

    pub fn set_codec_factory(&self, factory: CodecFactory) {
        *self.codec_factory.write() = Some(factory);
    }

    /// A codec for a new session, or `None` for raw delivery.
    pub fn new_codec(&self) -> Option<Box<dyn FrameCodec>> {
        let factory = self.codec_factory.read().clone();
        factory.map(|make| make())
    }

    // the slot lock is released before user code runs, so a handler may
    // replace handlers without deadlocking

    pub fn connect(&self, conn_id: ConnId) {
        if !self.is_running() {
            return;
        }
        let cb = self.on_connect.read().clone();
        if let Some(cb) = cb {
            cb(conn_id);
        }
    }

    pub fn disconnect(&self, conn_id: ConnId, code: i32, message: &str) {
        if !self.is_running() {
            return;
        }
        let cb = self.on_disconnect.read().clone();
        if let Some(cb) = cb {
            cb(conn_id, code, message);
        }
    }

    pub fn error(&self, conn_id: ConnId, code: i32, message: &str) {
        if !self.is_running() {
            return;
        }
        let cb = self.on_error.read().clone();
        if let Some(cb) = cb {
            cb(conn_id, code, message);
        }
    }

    pub fn message(&self, conn_id: ConnId, payload: Bytes) {
        if !self.is_running() {
            return;
        }
        let cb = self.on_message.read().clone();
        if let Some(cb) = cb {
            cb(conn_id, payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::network::codec::{codec_factory, MagicCodec};

    #[test]
    fn dispatch_is_gated_by_running_flag() {
        let dispatcher = Dispatcher::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        dispatcher.set_on_connect(Arc::new(move |_: ConnId| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        dispatcher.connect(1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        assert!(!dispatcher.set_running(true));
        dispatcher.connect(1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(dispatcher.set_running(false));
        dispatcher.connect(1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn setting_a_handler_replaces_the_previous_one() {
        let dispatcher = Arc::new(Dispatcher::default());
        dispatcher.set_running(true);
        let seen = Arc::new(RwLock::new(Vec::new()));

        let first = seen.clone();
        dispatcher.set_on_error(Arc::new(move |id: ConnId, code: i32, _: &str| {
            first.write().push((1, id, code))
        }));
        dispatcher.error(3, -1, "x");

        let second = seen.clone();
        let inner = dispatcher.clone();
        dispatcher.set_on_error(Arc::new(move |id: ConnId, code: i32, _: &str| {
            second.write().push((2, id, code));
            // replacing a handler from inside a callback must not deadlock
            inner.set_on_message(Arc::new(|_: ConnId, _: Bytes| {}));
        }));
        dispatcher.error(4, -2, "y");

        assert_eq!(*seen.read(), vec![(1, 3, -1), (2, 4, -2)]);
    }

    #[test]
    fn codec_is_optional() {
        let dispatcher = Dispatcher::default();
        assert!(dispatcher.new_codec().is_none());
        dispatcher.set_codec_factory(codec_factory(MagicCodec::new));
        let mut codec = dispatcher.new_codec().unwrap();
        codec.append(&MagicCodec::frame(b"hi"));
        assert_eq!(codec.try_decode().as_deref(), Some(&b"hi"[..]));
    }
}
