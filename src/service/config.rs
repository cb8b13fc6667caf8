use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{AppError, AppResult};

pub const DEFAULT_RECONNECT_INITIAL_DELAY_MS: u64 = 1000;
pub const DEFAULT_RECONNECT_MAX_DELAY_MS: u64 = 16000;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_MAX_WRITE_QUEUE_SIZE: usize = 1024;
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

/// Settings for one outbound connection.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Delay before the first reconnect attempt, doubled after each failure.
    pub reconnect_initial_delay_ms: u64,
    /// Upper bound for the doubled reconnect delay.
    pub reconnect_max_delay_ms: u64,
    /// Keep-alive period; 0 turns the heartbeat off.
    pub heartbeat_interval_ms: u64,
    pub max_write_queue_size: usize,
    pub read_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: "127.0.0.1".to_string(),
            port: 9000,
            reconnect_initial_delay_ms: DEFAULT_RECONNECT_INITIAL_DELAY_MS,
            reconnect_max_delay_ms: DEFAULT_RECONNECT_MAX_DELAY_MS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            max_write_queue_size: DEFAULT_MAX_WRITE_QUEUE_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ClientConfig {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn reconnect_initial_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_delay_ms)
    }

    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_ms > 0).then(|| Duration::from_millis(self.heartbeat_interval_ms))
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.host.is_empty() {
            return Err(AppError::InvalidValue("client host is empty".into()));
        }
        if self.reconnect_initial_delay_ms == 0 {
            return Err(AppError::InvalidValue(
                "reconnect_initial_delay_ms must be positive".into(),
            ));
        }
        if self.reconnect_max_delay_ms < self.reconnect_initial_delay_ms {
            return Err(AppError::InvalidValue(format!(
                "reconnect_max_delay_ms {} is less than reconnect_initial_delay_ms {}",
                self.reconnect_max_delay_ms, self.reconnect_initial_delay_ms
            )));
        }
        validate_session(self.max_write_queue_size, self.read_buffer_size)
    }
}

/// Settings for the listening side.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub ip: String,
    pub port: u16,
    pub max_write_queue_size: usize,
    pub read_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            ip: "0.0.0.0".to_string(),
            port: 9000,
            max_write_queue_size: DEFAULT_MAX_WRITE_QUEUE_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        ServerConfig {
            ip: ip.into(),
            port,
            ..Default::default()
        }
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.ip.is_empty() {
            return Err(AppError::InvalidValue("server ip is empty".into()));
        }
        validate_session(self.max_write_queue_size, self.read_buffer_size)
    }
}

fn validate_session(max_write_queue_size: usize, read_buffer_size: usize) -> AppResult<()> {
    if max_write_queue_size == 0 {
        return Err(AppError::InvalidValue(
            "max_write_queue_size must be positive".into(),
        ));
    }
    if read_buffer_size == 0 {
        return Err(AppError::InvalidValue(
            "read_buffer_size must be positive".into(),
        ));
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// Directory of the rolling log file; empty means stdout only.
    pub dir: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            dir: "logs".to_string(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TransportConfig {
    pub client: ClientConfig,
    pub server: ServerConfig,
    pub log: LogConfig,
}

impl TransportConfig {
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<TransportConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or(AppError::InvalidValue(format!(
                "config file path: {}",
                path.as_ref().to_string_lossy()
            )))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str))
            .build()?;

        let transport_config: TransportConfig = config.try_deserialize()?;
        transport_config.client.validate()?;
        transport_config.server.validate()?;

        Ok(transport_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = TransportConfig::default();
        assert!(config.client.validate().is_ok());
        assert!(config.server.validate().is_ok());
        assert_eq!(
            config.client.heartbeat_interval(),
            Some(Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS))
        );
    }

    #[test]
    fn zero_heartbeat_disables_it() {
        let config = ClientConfig {
            heartbeat_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.heartbeat_interval(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_inverted_backoff_bounds() {
        let config = ClientConfig {
            reconnect_initial_delay_ms: 500,
            reconnect_max_delay_ms: 100,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AppError::InvalidValue(_))));
    }

    #[test]
    fn rejects_zero_queue_bound() {
        let config = ServerConfig {
            max_write_queue_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AppError::InvalidValue(_))));
    }
}
