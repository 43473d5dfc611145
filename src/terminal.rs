//! Shared terminal input.
//!
//! A single thread owns the blocking read on stdin and appends what it reads
//! to a buffer. Prompts and the interactive exec both draw from that buffer,
//! so input typed after an exec ends reaches the next prompt instead of a
//! reader left parked on the descriptor.

use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Once};
use std::thread;

use tokio::sync::Notify;
use tracing::{debug, warn};

const CHUNK: usize = 1024;

#[derive(Default)]
struct Buffer {
    bytes: VecDeque<u8>,
    closed: bool,
}

struct Shared {
    buffer: Mutex<Buffer>,
    ready: Condvar,
    notify: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Buffer> {
        self.buffer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn push(&self, chunk: &[u8]) {
        self.lock().bytes.extend(chunk);
        self.ready.notify_all();
        self.notify.notify_waiters();
    }

    fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
        self.notify.notify_waiters();
    }
}

type Source = Box<dyn Read + Send>;

/// Handle to the process-wide input buffer; clones share it.
#[derive(Clone)]
pub struct TerminalInput {
    shared: Arc<Shared>,
    source: Arc<Mutex<Option<Source>>>,
    started: Arc<Once>,
}

impl std::fmt::Debug for TerminalInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalInput")
            .field("pending", &self.shared.lock().bytes.len())
            .finish_non_exhaustive()
    }
}

impl TerminalInput {
    /// Input read from the process's stdin.
    #[must_use]
    pub fn stdin() -> Self {
        Self::from_reader(io::stdin())
    }

    /// Input read from `reader`. The reader thread starts on first use.
    #[must_use]
    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        Self {
            shared: Arc::new(Shared {
                buffer: Mutex::new(Buffer::default()),
                ready: Condvar::new(),
                notify: Notify::new(),
            }),
            source: Arc::new(Mutex::new(Some(Box::new(reader)))),
            started: Arc::new(Once::new()),
        }
    }

    fn ensure_started(&self) {
        self.started.call_once(|| {
            let source = self
                .source
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .take();
            let Some(mut source) = source else {
                self.shared.close();
                return;
            };
            let shared = Arc::clone(&self.shared);
            let spawned = thread::Builder::new()
                .name("terminal-input".into())
                .spawn(move || {
                    let mut chunk = [0_u8; CHUNK];
                    loop {
                        match source.read(&mut chunk) {
                            Ok(0) => break,
                            Ok(n) => shared.push(&chunk[..n]),
                            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                            Err(err) => {
                                warn!(%err, "terminal input failed");
                                break;
                            }
                        }
                    }
                    debug!("terminal input closed");
                    shared.close();
                });
            if let Err(err) = spawned {
                warn!(%err, "cannot start terminal input thread");
                self.shared.close();
            }
        });
    }

    /// Wait for input and move up to `buf.len()` bytes into `buf`.
    ///
    /// Returns 0 once input has ended. Dropping the future before it
    /// completes consumes nothing.
    pub async fn read_chunk(&self, buf: &mut [u8]) -> usize {
        self.ensure_started();
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut buffer = self.shared.lock();
                if !buffer.bytes.is_empty() {
                    let n = buf.len().min(buffer.bytes.len());
                    for (slot, byte) in buf.iter_mut().zip(buffer.bytes.drain(..n)) {
                        *slot = byte;
                    }
                    return n;
                }
                if buffer.closed {
                    return 0;
                }
            }
            notified.await;
        }
    }

    /// Blocking reader over the same buffer, for line prompts.
    #[must_use]
    pub fn lines(&self) -> LineReader {
        LineReader {
            input: self.clone(),
        }
    }
}

/// Blocking [`Read`] that yields at most one line per call, so a buffered
/// wrapper never holds input past the line it was asked for.
pub struct LineReader {
    input: TerminalInput,
}

impl Read for LineReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.input.ensure_started();
        let shared = &self.input.shared;
        let mut buffer = shared.lock();
        while buffer.bytes.is_empty() && !buffer.closed {
            buffer = shared
                .ready
                .wait(buffer)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }

        let line_end = buffer
            .bytes
            .iter()
            .position(|byte| *byte == b'\n')
            .map_or(buffer.bytes.len(), |at| at + 1);
        let n = buf.len().min(line_end);
        for (slot, byte) in buf.iter_mut().zip(buffer.bytes.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}
