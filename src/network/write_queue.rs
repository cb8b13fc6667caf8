use std::collections::VecDeque;

use bytes::Bytes;

use crate::{AppError, AppResult};

/// Bounded FIFO of outbound buffers for one session.
///
/// The front entry is the write currently in flight; it stays queued until
/// the socket reports completion, so `len` always includes it.
#[derive(Debug)]
pub(crate) struct WriteQueue {
    pending: VecDeque<Bytes>,
    limit: usize,
}

impl WriteQueue {
    pub fn new(limit: usize) -> Self {
        WriteQueue {
            pending: VecDeque::new(),
            limit,
        }
    }

    /// Appends `payload`, or hands back a backpressure error when full.
    /// A rejected payload is dropped; queued entries are untouched.
    pub fn push(&mut self, payload: Bytes) -> AppResult<()> {
        if self.pending.len() >= self.limit {
            return Err(AppError::Backpressure { limit: self.limit });
        }
        self.pending.push_back(payload);
        Ok(())
    }

    pub fn front(&self) -> Option<&Bytes> {
        self.pending.front()
    }

    pub fn pop_front(&mut self) -> Option<Bytes> {
        self.pending.pop_front()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
