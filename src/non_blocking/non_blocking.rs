// Copyright 2024 FastLabs Developers
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

use std::io::Write;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::SendTimeoutError;
use crossbeam_channel::Sender;
use crossbeam_channel::bounded;
use crossbeam_channel::unbounded;

use super::Message;
use super::worker::Worker;
use crate::Error;
use crate::trap::DefaultTrap;
use crate::trap::Trap;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(100);

/// A guard that flushes log records associated with a [`NonBlocking`] writer on drop.
///
/// Writing to a [`NonBlocking`] writer will **not** immediately write the log record to the
/// underlying output. Instead, the log record will be written by a dedicated logging thread at
/// some later point. Dropping the guard sends a shutdown signal and waits, up to the shutdown
/// timeout, for the worker to drain every record queued before it.
#[derive(Debug)]
pub struct WorkerGuard {
    _guard: Option<JoinHandle<()>>,
    sender: Sender<Message>,
    shutdown: Sender<()>,
    shutdown_timeout: Duration,
    trap: Arc<dyn Trap>,
}

impl WorkerGuard {
    fn new(
        handle: JoinHandle<()>,
        sender: Sender<Message>,
        shutdown: Sender<()>,
        shutdown_timeout: Option<Duration>,
        trap: Arc<dyn Trap>,
    ) -> Self {
        WorkerGuard {
            _guard: Some(handle),
            sender,
            shutdown,
            shutdown_timeout: shutdown_timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT),
            trap,
        }
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        let shutdown_timeout = self.shutdown_timeout;
        match self
            .sender
            .send_timeout(Message::Shutdown, shutdown_timeout)
        {
            Ok(()) => {
                // Attempt to wait for `Worker` to flush all messages before dropping. This happens
                // when the `Worker` calls `recv()` on a zero-capacity channel. Use `send_timeout`
                // so that drop is not blocked indefinitely.
                let _ = self.shutdown.send_timeout((), shutdown_timeout);
            }
            Err(SendTimeoutError::Disconnected(_)) => (),
            Err(SendTimeoutError::Timeout(_)) => {
                let err = Error::unexpected("failed to send shutdown signal to logging worker");
                self.trap.trap(&err);
            }
        }
    }
}

/// A non-blocking writer; each sent entry is written by the worker thread.
#[derive(Clone, Debug)]
pub struct NonBlocking {
    sender: Sender<Message>,
    flush_timeout: Duration,
}

impl NonBlocking {
    /// Queue one entry.
    pub fn send(&self, record: Vec<u8>) -> Result<(), Error> {
        self.sender
            .send(Message::Record(record))
            .map_err(|err| Error::unexpected("failed to send log message").with_source(err))
    }

    /// Wait until every entry queued so far is written and flushed.
    pub fn flush(&self) -> Result<(), Error> {
        let (ack, acked) = bounded(1);
        self.sender
            .send(Message::Flush(ack))
            .map_err(|err| Error::unexpected("failed to send flush signal").with_source(err))?;
        acked
            .recv_timeout(self.flush_timeout)
            .map_err(|err| Error::unexpected("failed to wait for flush").with_source(err))
    }
}

/// A builder for configuring [`NonBlocking`].
#[derive(Debug)]
pub struct NonBlockingBuilder<T: Write + Send + 'static> {
    thread_name: String,
    buffered_lines_limit: Option<usize>,
    shutdown_timeout: Option<Duration>,
    trap: Arc<dyn Trap>,
    writer: T,
}

impl<T: Write + Send + 'static> NonBlockingBuilder<T> {
    /// Creates a new [`NonBlockingBuilder`] with the specified writer.
    pub fn new(thread_name: impl Into<String>, writer: T) -> Self {
        Self {
            thread_name: thread_name.into(),
            buffered_lines_limit: None,
            shutdown_timeout: None,
            trap: Arc::new(DefaultTrap::default()),
            writer,
        }
    }

    /// Sets the buffer size of pending messages.
    pub fn buffered_lines_limit(mut self, buffered_lines_limit: Option<usize>) -> Self {
        self.buffered_lines_limit = buffered_lines_limit;
        self
    }

    /// Sets the shutdown timeout before the worker guard dropped.
    pub fn shutdown_timeout(mut self, shutdown_timeout: Option<Duration>) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }

    /// Sets the trap for write errors on the worker thread.
    pub fn trap(mut self, trap: Arc<dyn Trap>) -> Self {
        self.trap = trap;
        self
    }

    /// Completes the builder, returning the configured `NonBlocking`.
    pub fn build(self) -> Result<(NonBlocking, WorkerGuard), Error> {
        let Self {
            thread_name,
            buffered_lines_limit,
            shutdown_timeout,
            trap,
            writer,
        } = self;

        let (sender, receiver) = match buffered_lines_limit {
            Some(cap) => bounded(cap),
            None => unbounded(),
        };
        let (shutdown_sender, shutdown_receiver) = bounded(0);

        let worker = Worker::new(writer, receiver, shutdown_receiver, trap.clone());
        let handle = worker.make_thread(thread_name).map_err(|err| {
            Error::unexpected("failed to spawn the non-blocking writer thread").with_source(err)
        })?;
        let worker_guard = WorkerGuard::new(
            handle,
            sender.clone(),
            shutdown_sender,
            shutdown_timeout,
            trap,
        );

        let non_blocking = NonBlocking {
            sender,
            flush_timeout: shutdown_timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT) * 10,
        };
        Ok((non_blocking, worker_guard))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::handler::SharedWriter;

    #[test]
    fn test_flush_waits_for_worker() {
        let buffer = Arc::new(Mutex::new(Vec::<u8>::new()));
        let (writer, _guard) = NonBlockingBuilder::new("test-worker", SharedWriter(buffer.clone()))
            .build()
            .unwrap();

        for i in 0..100 {
            writer.send(format!("line {i}\n").into_bytes()).unwrap();
        }
        writer.flush().unwrap();

        let written = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert_eq!(written.lines().count(), 100);
        assert!(written.ends_with("line 99\n"));
    }

    #[test]
    fn test_guard_drains_on_drop() {
        let buffer = Arc::new(Mutex::new(Vec::<u8>::new()));
        let (writer, guard) = NonBlockingBuilder::new("test-worker", SharedWriter(buffer.clone()))
            .shutdown_timeout(Some(Duration::from_secs(5)))
            .build()
            .unwrap();

        writer.send(b"last words\n".to_vec()).unwrap();
        drop(guard);

        assert_eq!(buffer.lock().unwrap().as_slice(), b"last words\n");
    }
}
