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

use tokio::sync::broadcast;

/// Listens for the stop notification of one reactor.
///
/// Once `recv` has returned, every later call returns immediately, so the
/// same listener can guard several consecutive `select!` loops.
#[derive(Debug)]
pub struct Shutdown {
    is_shutdown: bool,
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            is_shutdown: false,
            notify,
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown
    }

    pub async fn recv(&mut self) {
        if self.is_shutdown {
            return;
        }
        // a dropped sender counts as a stop request as well
        let _ = self.notify.recv().await;
        self.is_shutdown = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recv_latches_after_first_signal() {
        let (tx, rx) = broadcast::channel(1);
        let mut shutdown = Shutdown::new(rx);
        assert!(!shutdown.is_shutdown());
        tx.send(()).unwrap();
        shutdown.recv().await;
        assert!(shutdown.is_shutdown());
        // no second message, must still return
        shutdown.recv().await;
    }

    #[tokio::test]
    async fn dropped_sender_stops_listener() {
        let (tx, rx) = broadcast::channel::<()>(1);
        let mut shutdown = Shutdown::new(rx);
        drop(tx);
        shutdown.recv().await;
        assert!(shutdown.is_shutdown());
    }
}
