use std::future::Future;
use std::thread::{self, JoinHandle, ThreadId};

use tokio::runtime;
use tokio::sync::broadcast;
use tracing::{debug, error};

use crate::{AppResult, Shutdown};

/// One dedicated thread driving a current-thread tokio runtime.
///
/// Every task an endpoint spawns lands on this thread, so session state is
/// only ever touched from here. Other threads talk to it through channels.
#[derive(Debug)]
pub(crate) struct Reactor {
    name: String,
    notify_shutdown: broadcast::Sender<()>,
    thread_id: ThreadId,
    handle: Option<JoinHandle<()>>,
}

impl Reactor {
    /// Builds the runtime, runs `prepare` inside its context on the calling
    /// thread, then moves everything onto the reactor thread and runs `main`.
    ///
    /// Errors from `prepare` (bind, socket registration) are returned here,
    /// before any thread exists.
    pub fn start<T, P, F, Fut>(name: &str, prepare: P, main: F) -> AppResult<Reactor>
    where
        T: Send + 'static,
        P: FnOnce() -> AppResult<T>,
        F: FnOnce(T, Shutdown) -> Fut + Send + 'static,
        Fut: Future<Output = ()>,
    {
        let rt = runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let state = {
            let _guard = rt.enter();
            prepare()?
        };

        let (notify_shutdown, _) = broadcast::channel(1);
        let shutdown = Shutdown::new(notify_shutdown.subscribe());
        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                debug!("reactor {} started", thread_name);
                rt.block_on(main(state, shutdown));
                // dropping the runtime here cancels every task still parked on it,
                // which closes the sockets those tasks own
                drop(rt);
                debug!("reactor {} exited", thread_name);
            })?;

        Ok(Reactor {
            name: name.to_string(),
            notify_shutdown,
            thread_id: handle.thread().id(),
            handle: Some(handle),
        })
    }

    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Signals the loop and waits for the thread to finish.
    ///
    /// Called from the reactor thread itself (inside a callback) the join is
    /// skipped; the loop exits as soon as the callback returns.
    pub fn shutdown(mut self) {
        let _ = self.notify_shutdown.send(());
        let Some(handle) = self.handle.take() else {
            return;
        };
        if self.is_current() {
            debug!("reactor {} stopped from its own thread, not joining", self.name);
            return;
        }
        if handle.join().is_err() {
            error!("reactor {} thread panicked", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::AppError;

    #[test]
    fn main_runs_on_the_reactor_thread_until_shutdown() {
        let exited = Arc::new(AtomicBool::new(false));
        let flag = exited.clone();
        let reactor = Reactor::start(
            "reactor-test",
            || Ok(thread::current().id()),
            move |caller, mut shutdown| async move {
                assert_ne!(caller, thread::current().id());
                assert_eq!(thread::current().name(), Some("reactor-test"));
                shutdown.recv().await;
                flag.store(true, Ordering::SeqCst);
            },
        )
        .unwrap();
        assert!(!reactor.is_current());
        reactor.shutdown();
        assert!(exited.load(Ordering::SeqCst));
    }

    #[test]
    fn prepare_errors_are_synchronous() {
        let result = Reactor::start(
            "reactor-fail",
            || -> AppResult<()> { Err(AppError::IllegalState("nope".into())) },
            |_, _| async {},
        );
        assert!(matches!(result, Err(AppError::IllegalState(_))));
    }
}
