//! In-memory connector for pool tests.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::pool::connector::Connector;
use crate::pool::error::BackendError;

#[derive(Debug, Clone)]
pub(crate) struct MockConnection {
    pub serial: u64,
    pub generation: u64,
    pub broken: bool,
}

#[derive(Debug, Default)]
struct MockState {
    serial: AtomicU64,
    generation: AtomicU64,
    fail_connects: AtomicBool,
    connects: AtomicUsize,
}

/// Connector whose connections live as long as the current generation.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockConnector {
    state: Arc<MockState>,
    delay: Duration,
    check_delay: Duration,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Liveness checks take `check_delay` before answering.
    pub fn with_check_delay(check_delay: Duration) -> Self {
        Self {
            check_delay,
            ..Self::default()
        }
    }

    pub fn fail_connects(&self, fail: bool) {
        self.state.fail_connects.store(fail, Ordering::SeqCst);
    }

    /// Every connection created so far fails its next liveness check.
    pub fn invalidate_existing(&self) {
        self.state.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Connection = MockConnection;

    async fn connect(&self) -> Result<MockConnection, BackendError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_connects.load(Ordering::SeqCst) {
            return Err(BackendError::Rejected("WRONGPASS invalid password".into()));
        }
        Ok(MockConnection {
            serial: self.state.serial.fetch_add(1, Ordering::SeqCst),
            generation: self.state.generation.load(Ordering::SeqCst),
            broken: false,
        })
    }

    async fn is_valid(&self, conn: &mut MockConnection) -> bool {
        if !self.check_delay.is_zero() {
            tokio::time::sleep(self.check_delay).await;
        }
        !conn.broken && conn.generation == self.state.generation.load(Ordering::SeqCst)
    }

    fn has_broken(&self, conn: &mut MockConnection) -> bool {
        conn.broken
    }

    fn endpoint(&self) -> String {
        "mock".to_string()
    }
}
