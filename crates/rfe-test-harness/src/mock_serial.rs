//! Mock transport for deterministic testing of the protocol engine.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/response pairs. The analyzer streams sweeps without being asked,
//! so the mock also accepts unsolicited bytes at any time through a
//! [`MockHandle`], and can simulate the USB cable being pulled.
//!
//! # Example
//!
//! ```
//! use rfe_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! // Pre-load: when the driver requests the config, answer with setup and config.
//! mock.expect(b"#\x04C0", b"#C2-M:010,255,01.12\r\n");
//!
//! // Bytes the device sends on its own, e.g. a sweep.
//! let handle = mock.handle();
//! handle.push(b"$S\x02\xC8\xC8\r\n");
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

use rfe_core::error::{Error, Result};
use rfe_core::transport::Transport;

/// A pre-loaded request/response pair for the mock transport.
#[derive(Debug, Clone)]
struct Expectation {
    /// The exact bytes we expect to be sent.
    request: Vec<u8>,
    /// The bytes queued for reading when the matching request is received.
    response: Vec<u8>,
}

#[derive(Debug)]
struct MockState {
    /// Ordered queue of expected request/response pairs.
    expectations: VecDeque<Expectation>,
    /// Bytes waiting to be returned by `receive()`.
    rx: VecDeque<u8>,
    /// Upper bound on bytes returned per `receive()` call.
    chunk_size: usize,
    /// Whether the transport is "connected".
    connected: bool,
    /// Set by [`MockHandle::inject_disconnect`].
    lost: bool,
    /// Log of all bytes sent through this transport.
    sent_log: Vec<Vec<u8>>,
    /// Number of `close()` calls.
    close_count: usize,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<MockState>,
    readable: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A mock [`Transport`] for testing the protocol engine without hardware.
///
/// Expectations are consumed in order. When `send()` is called, the sent
/// data is recorded and matched against the next expectation, and the
/// corresponding response is queued for `receive()`. An empty response
/// models a command the device does not answer.
///
/// If no expectation matches or the queue is exhausted, `send()` returns
/// [`Error::Protocol`]. With nothing queued, `receive()` waits up to its
/// timeout for bytes pushed through a [`MockHandle`] and then returns
/// [`Error::Timeout`].
#[derive(Debug)]
pub struct MockTransport {
    shared: Arc<Shared>,
}

/// A cloneable handle to a [`MockTransport`] that stays usable after the
/// transport has been boxed and handed to a session.
#[derive(Debug, Clone)]
pub struct MockHandle {
    shared: Arc<Shared>,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            shared: Arc::new(Shared {
                state: Mutex::new(MockState {
                    expectations: VecDeque::new(),
                    rx: VecDeque::new(),
                    chunk_size: usize::MAX,
                    connected: true,
                    lost: false,
                    sent_log: Vec::new(),
                    close_count: 0,
                }),
                readable: Notify::new(),
            }),
        }
    }

    /// Add an expected request/response pair.
    ///
    /// When `send()` is called with data matching `request`, `response` is
    /// queued for subsequent `receive()` calls.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.shared.lock().expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Limit how many bytes a single `receive()` returns, to exercise
    /// frames split across reads.
    pub fn set_chunk_size(&mut self, chunk_size: usize) {
        self.shared.lock().chunk_size = chunk_size.max(1);
    }

    /// Set the connected state of the mock transport.
    ///
    /// When set to `false`, subsequent `send()` and `receive()` calls will
    /// return [`Error::NotConnected`].
    pub fn set_connected(&mut self, connected: bool) {
        self.shared.lock().connected = connected;
    }

    /// Get a handle for pushing bytes and inspecting traffic after the
    /// transport has been moved into a session.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Return a copy of all data sent through this transport.
    ///
    /// Each element is the byte slice from one `send()` call.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.shared.lock().sent_log.clone()
    }

    /// Return the number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.shared.lock().expectations.len()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHandle {
    /// Queue bytes as if the device had sent them unprompted.
    pub fn push(&self, data: &[u8]) {
        self.shared.lock().rx.extend(data.iter().copied());
        self.shared.readable.notify_one();
    }

    /// Simulate the device disappearing (cable pulled, power lost).
    ///
    /// Pending and future `receive()` and `send()` calls return
    /// [`Error::ConnectionLost`].
    pub fn inject_disconnect(&self) {
        self.shared.lock().lost = true;
        self.shared.readable.notify_one();
    }

    /// Return a copy of all data sent through the transport.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.shared.lock().sent_log.clone()
    }

    /// Return the number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.shared.lock().expectations.len()
    }

    /// Whether `close()` has been called on the transport.
    pub fn is_closed(&self) -> bool {
        self.shared.lock().close_count > 0
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.shared.lock();
        if !state.connected {
            return Err(Error::NotConnected);
        }
        if state.lost {
            return Err(Error::ConnectionLost);
        }

        state.sent_log.push(data.to_vec());

        let expectation = state
            .expectations
            .pop_front()
            .ok_or_else(|| Error::Protocol("no more expectations in mock transport".into()))?;
        if data != expectation.request.as_slice() {
            return Err(Error::Protocol(format!(
                "unexpected send data: expected {:02X?}, got {:02X?}",
                expectation.request, data
            )));
        }
        if !expectation.response.is_empty() {
            state.rx.extend(expectation.response);
            drop(state);
            self.shared.readable.notify_one();
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let mut state = self.shared.lock();
                if !state.connected {
                    return Err(Error::NotConnected);
                }
                if state.lost {
                    return Err(Error::ConnectionLost);
                }
                if !state.rx.is_empty() {
                    let n = state.rx.len().min(buf.len()).min(state.chunk_size);
                    for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
                        *slot = byte;
                    }
                    return Ok(n);
                }
            }
            if tokio::time::timeout_at(deadline, self.shared.readable.notified())
                .await
                .is_err()
            {
                return Err(Error::Timeout);
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.shared.lock();
        state.connected = false;
        state.rx.clear();
        state.close_count += 1;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        let state = self.shared.lock();
        state.connected && !state.lost
    }
}
