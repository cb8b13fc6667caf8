use std::sync::Arc;

use super::codec::CodecFactory;
use super::ConnId;
use crate::AppResult;

pub(crate) use sealed::HasDispatcher;

mod sealed {
    use crate::network::handler::Dispatcher;

    pub trait HasDispatcher {
        fn dispatcher(&self) -> &Dispatcher;
    }
}

/// Lifecycle and callback registration shared by [`TcpClient`] and
/// [`TcpServer`].
///
/// Handler slots hold one callback each; registering again replaces the
/// previous handler. Handlers run on the endpoint's reactor thread and must
/// not block it.
///
/// [`TcpClient`]: crate::TcpClient
/// [`TcpServer`]: crate::TcpServer
pub trait Endpoint: HasDispatcher {
    /// Starts the reactor thread. A no-op while already running.
    fn start(&self) -> AppResult<()>;

    /// Idempotent. Once this returns no callback fires again, except when it
    /// is called from a callback, in which case the loop winds down right
    /// after that callback returns.
    fn stop(&self);

    fn is_running(&self) -> bool;

    /// Applies to sessions created after the call. The factory is called
    /// exactly once per session, on the reactor thread.
    fn set_codec_factory(&self, factory: CodecFactory) {
        self.dispatcher().set_codec_factory(factory);
    }

    fn on_connect<F>(&self, cb: F)
    where
        Self: Sized,
        F: Fn(ConnId) + Send + Sync + 'static,
    {
        self.dispatcher().set_on_connect(Arc::new(cb));
    }

    /// `cb(conn_id, code, message)`; the session is already deregistered.
    fn on_disconnect<F>(&self, cb: F)
    where
        Self: Sized,
        F: Fn(ConnId, i32, &str) + Send + Sync + 'static,
    {
        self.dispatcher().set_on_disconnect(Arc::new(cb));
    }

    /// `cb(conn_id, code, message)` for failures that do not end a session
    /// (backpressure, resynchronization, accept errors) and for failed
    /// connect attempts.
    fn on_error<F>(&self, cb: F)
    where
        Self: Sized,
        F: Fn(ConnId, i32, &str) + Send + Sync + 'static,
    {
        self.dispatcher().set_on_error(Arc::new(cb));
    }
}
