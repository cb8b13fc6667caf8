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

use std::io;

pub type AppResult<T> = Result<T, AppError>;

/// Code reported when no platform error code is available.
pub const CODE_UNKNOWN: i32 = -1;
/// Code reported when the codec dropped bytes to find the next frame header.
pub const CODE_PROTOCOL: i32 = -2;
/// Code reported for an orderly close, either by the peer or locally.
pub const CODE_CLOSED: i32 = 0;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// resolve/connect/read/write failure on a live or pending connection
    #[error("transport error ({code}): {message}")]
    Transport { code: i32, message: String },

    /// malformed bytes detected by a codec
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("write queue overflow (limit {limit})")]
    Backpressure { limit: usize },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// general errors
    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("config file error: {0}")]
    ConfigFile(#[from] config::ConfigError),
}

impl AppError {
    /// Builds a transport error from an I/O failure, keeping the OS errno.
    pub fn transport(err: &io::Error) -> Self {
        AppError::Transport {
            code: err.raw_os_error().unwrap_or(CODE_UNKNOWN),
            message: err.to_string(),
        }
    }

    /// The numeric code handed to `on_error` / `on_disconnect` callbacks.
    pub fn code(&self) -> i32 {
        match self {
            AppError::Transport { code, .. } => *code,
            AppError::Protocol(_) => CODE_PROTOCOL,
            AppError::Bind { source, .. } | AppError::Io(source) => {
                source.raw_os_error().unwrap_or(CODE_UNKNOWN)
            }
            _ => CODE_UNKNOWN,
        }
    }
}
