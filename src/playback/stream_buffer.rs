//! Growable byte buffer fed by a streaming HTTP body and read by the decoder.
//!
//! The writer side appends chunks as they arrive; each reader keeps its own
//! cursor and blocks until more bytes arrive or the stream is finished. All
//! bytes are retained so a source can be rewound to the start.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct BufferState {
    data: Vec<u8>,
    finished: bool,
    failure: Option<String>,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<BufferState>,
    grown: Condvar,
}

/// Shared handle; clones refer to the same bytes.
#[derive(Debug, Clone, Default)]
pub struct StreamBuffer {
    shared: Arc<Shared>,
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer that is already complete.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let buffer = Self::new();
        buffer.append(&bytes);
        buffer.finish();
        buffer
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        // A panicking writer leaves plain bytes behind; keep reading them.
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn append(&self, chunk: &[u8]) {
        let mut state = self.lock();
        state.data.extend_from_slice(chunk);
        drop(state);
        self.shared.grown.notify_all();
    }

    /// Mark the stream complete; readers see EOF after the last byte.
    pub fn finish(&self) {
        self.lock().finished = true;
        self.shared.grown.notify_all();
    }

    /// Mark the stream as broken; readers get an error once they run out of bytes.
    pub fn fail(&self, reason: impl Into<String>) {
        let mut state = self.lock();
        state.failure = Some(reason.into());
        state.finished = true;
        drop(state);
        self.shared.grown.notify_all();
    }

    pub fn len(&self) -> usize {
        self.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    pub fn failure(&self) -> Option<String> {
        self.lock().failure.clone()
    }

    /// New reader positioned at the first byte.
    pub fn reader(&self) -> StreamReader {
        StreamReader {
            buffer: self.clone(),
            pos: 0,
        }
    }
}

/// Blocking `Read + Seek` view over a [`StreamBuffer`].
#[derive(Debug)]
pub struct StreamReader {
    buffer: StreamBuffer,
    pos: u64,
}

impl Read for StreamReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let shared = &self.buffer.shared;
        let mut state = self.buffer.lock();
        loop {
            let available = state.data.len() as u64;
            if self.pos < available {
                let start = self.pos as usize;
                let n = buf.len().min(state.data.len() - start);
                buf[..n].copy_from_slice(&state.data[start..start + n]);
                self.pos += n as u64;
                return Ok(n);
            }
            if let Some(reason) = &state.failure {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, reason.clone()));
            }
            if state.finished {
                return Ok(0);
            }
            state = shared
                .grown
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }
}

impl Seek for StreamReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.pos as i128 + delta as i128,
            SeekFrom::End(delta) => {
                // The end is only known once the body is complete.
                let shared = &self.buffer.shared;
                let mut state = self.buffer.lock();
                while !state.finished {
                    state = shared
                        .grown
                        .wait(state)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                }
                state.data.len() as i128 + delta as i128
            }
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of stream",
            ));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }
}
