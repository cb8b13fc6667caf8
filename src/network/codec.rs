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

use std::fmt::Debug;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{AppError, AppResult};

/// Stateful translation between a byte stream and application frames.
///
/// One instance serves exactly one session. `append` only grows the internal
/// buffer; `try_decode` removes bytes from the front only when it returns a
/// frame, so callers loop on `try_decode` until it yields `None`.
pub trait FrameCodec: Send + Debug {
    fn append(&mut self, data: &[u8]);

    fn try_decode(&mut self) -> Option<Bytes>;

    /// Wraps a payload into wire bytes. Unframed by default.
    fn encode(&self, payload: &[u8]) -> Bytes {
        Bytes::copy_from_slice(payload)
    }

    /// Bytes dropped while searching for a valid header since the last call.
    fn take_discarded(&mut self) -> usize {
        0
    }
}

/// Produces a fresh codec for every new session.
pub type CodecFactory = Arc<dyn Fn() -> Box<dyn FrameCodec> + Send + Sync>;

/// Wraps a closure into a [`CodecFactory`].
pub fn codec_factory<F, C>(make: F) -> CodecFactory
where
    F: Fn() -> C + Send + Sync + 'static,
    C: FrameCodec + 'static,
{
    Arc::new(move || Box::new(make()) as Box<dyn FrameCodec>)
}

pub const MAGIC: u16 = 0xABCD;
pub const HEADER_LEN: usize = 6;
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Magic + length framing.
///
/// ```text
/// +--------+----------------+-----------------+
/// | 0xABCD | length (u32 BE)| payload[length] |
/// +--------+----------------+-----------------+
/// ```
///
/// A header whose magic does not match, or whose length exceeds
/// `max_frame_len`, is treated as corruption: exactly one byte is dropped and
/// decoding restarts from the next offset.
#[derive(Debug)]
pub struct MagicCodec {
    buffer: BytesMut,
    max_frame_len: usize,
    discarded: usize,
}

impl Default for MagicCodec {
    fn default() -> Self {
        MagicCodec::new()
    }
}

impl MagicCodec {
    pub fn new() -> Self {
        MagicCodec::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        MagicCodec {
            buffer: BytesMut::with_capacity(4 * 1024),
            max_frame_len,
            discarded: 0,
        }
    }

    /// Encodes `payload` as one frame.
    ///
    /// The payload must not exceed [`DEFAULT_MAX_FRAME_LEN`]: a default decoder
    /// treats a longer frame as corruption. Use [`MagicCodec::try_frame`] when
    /// the size is not known to fit.
    pub fn frame(payload: &[u8]) -> Bytes {
        debug_assert!(payload.len() <= u32::MAX as usize);
        let mut out = BytesMut::with_capacity(HEADER_LEN + payload.len());
        out.put_u16(MAGIC);
        out.put_u32(payload.len() as u32);
        out.put_slice(payload);
        out.freeze()
    }

    /// Encodes `payload` as one frame, rejecting payloads this codec's own
    /// decoder would not accept.
    pub fn try_frame(&self, payload: &[u8]) -> AppResult<Bytes> {
        let fits_header = u32::try_from(payload.len()).is_ok();
        if !fits_header || payload.len() > self.max_frame_len {
            return Err(AppError::InvalidValue(format!(
                "frame of {} bytes exceeds max_frame_len {}",
                payload.len(),
                self.max_frame_len
            )));
        }
        Ok(MagicCodec::frame(payload))
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Bytes currently held back waiting for a complete frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl FrameCodec for MagicCodec {
    fn append(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    fn try_decode(&mut self) -> Option<Bytes> {
        loop {
            if self.buffer.remaining() < HEADER_LEN {
                return None;
            }
            let magic = u16::from_be_bytes([self.buffer[0], self.buffer[1]]);
            let length = u32::from_be_bytes([
                self.buffer[2],
                self.buffer[3],
                self.buffer[4],
                self.buffer[5],
            ]) as usize;
            if magic != MAGIC || length > self.max_frame_len {
                self.buffer.advance(1);
                self.discarded += 1;
                continue;
            }
            if self.buffer.remaining() < HEADER_LEN + length {
                return None;
            }
            self.buffer.advance(HEADER_LEN);
            return Some(self.buffer.split_to(length).freeze());
        }
    }

    fn encode(&self, payload: &[u8]) -> Bytes {
        MagicCodec::frame(payload)
    }

    fn take_discarded(&mut self) -> usize {
        std::mem::take(&mut self.discarded)
    }
}
