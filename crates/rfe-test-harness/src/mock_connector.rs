//! Mock connector that hands out pre-built transports.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use rfe_core::error::{Error, Result};
use rfe_core::transport::{Connector, Transport};

use crate::mock_serial::MockTransport;

/// A [`Connector`] that returns queued [`MockTransport`]s in order.
///
/// Each `connect()` pops the next entry. Queued failures are returned as
/// errors, which exercises the `Connecting -> Faulted` path. Once the queue
/// is empty, `connect()` fails with [`Error::NotFound`].
#[derive(Debug, Default)]
pub struct MockConnector {
    queue: Mutex<VecDeque<Result<MockTransport>>>,
}

impl MockConnector {
    /// Create a connector with an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a connector that yields a single transport.
    pub fn with_transport(transport: MockTransport) -> Self {
        let connector = Self::new();
        connector.push(transport);
        connector
    }

    /// Queue a transport for the next `connect()`.
    pub fn push(&self, transport: MockTransport) {
        self.lock().push_back(Ok(transport));
    }

    /// Queue a failure for the next `connect()`.
    pub fn push_failure(&self, error: Error) {
        self.lock().push_back(Err(error));
    }

    /// Number of queued entries not yet consumed.
    pub fn remaining(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<MockTransport>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>> {
        let next = self.lock().pop_front();
        match next {
            Some(Ok(transport)) => Ok(Box::new(transport)),
            Some(Err(e)) => Err(e),
            None => Err(Error::NotFound("mock".into())),
        }
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}
