pub use app_error::{AppError, AppResult, CODE_CLOSED, CODE_PROTOCOL, CODE_UNKNOWN};
pub use self::config::{ClientConfig, LogConfig, ServerConfig, TransportConfig};
pub use shutdown::Shutdown;
pub use tracing_config::{setup_local_tracing, setup_tracing};

mod app_error;
mod config;
mod shutdown;
mod tracing_config;
