// In-memory stream standing in for a Nav2 base in unit tests

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

/// Scripted stream: reads drain the injected bytes then hit EOF, writes are
/// recorded. Clones share state so a test can keep a handle after handing
/// the stream to a client.
#[derive(Clone, Default)]
pub struct MockStream {
    inner: Arc<Mutex<MockStreamInner>>,
}

#[derive(Default)]
struct MockStreamInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
    read_chunk: Option<usize>,
    write_limit: Option<usize>,
    interrupted_writes: usize,
}

impl MockStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(data: &str) -> Self {
        let stream = Self::new();
        stream.inject_read(data.as_bytes());
        stream
    }

    /// Queue bytes for the client to read
    pub fn inject_read(&self, data: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        inner.read_buffer.extend(data);
    }

    /// Everything the client wrote so far
    pub fn written(&self) -> String {
        let inner = self.inner.lock().unwrap();
        String::from_utf8_lossy(&inner.write_buffer).into_owned()
    }

    /// Hand out at most `n` bytes per read call
    pub fn set_read_chunk(&self, n: usize) {
        self.inner.lock().unwrap().read_chunk = Some(n);
    }

    /// Accept at most `n` bytes per write call
    pub fn set_write_limit(&self, n: usize) {
        self.inner.lock().unwrap().write_limit = Some(n);
    }

    /// Fail the next `n` write calls with `ErrorKind::Interrupted`
    pub fn interrupt_writes(&self, n: usize) {
        self.inner.lock().unwrap().interrupted_writes = n;
    }
}

impl Read for MockStream {
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        let limit = inner.read_chunk.unwrap_or(usize::MAX);
        let available = inner.read_buffer.len().min(buffer.len()).min(limit);

        for (slot, byte) in buffer.iter_mut().zip(inner.read_buffer.drain(..available)) {
            *slot = byte;
        }
        Ok(available)
    }
}

impl Write for MockStream {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        if inner.interrupted_writes > 0 {
            inner.interrupted_writes -= 1;
            return Err(io::ErrorKind::Interrupted.into());
        }
        let accepted = data.len().min(inner.write_limit.unwrap_or(usize::MAX));
        inner.write_buffer.extend_from_slice(&data[..accepted]);
        Ok(accepted)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
