//! The transaction queue capability.
//!
//! Durability, deduplication and at-most-one-in-flight-per-transaction are
//! the queue implementation's responsibility; the relay core only pops and
//! pushes.

use std::collections::VecDeque;

use anyhow::Result;
use tokio::sync::Mutex;

use crate::msg::Tx;

/// A shared transaction queue.
#[async_trait::async_trait]
pub trait TxBus: Send + Sync {
    /// Pop the next transaction; `Ok(None)` when the queue is empty.
    async fn pop(&self) -> Result<Option<Tx>>;

    /// Push a transaction (back) onto the queue.
    async fn push(&self, tx: Tx) -> Result<()>;
}

/// In-memory FIFO bus. Offers none of the durability a production queue
/// provides; suitable for tests and embedded single-process setups.
#[derive(Default)]
pub struct MemoryBus {
    queue: Mutex<VecDeque<Tx>>,
}

impl MemoryBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued transactions.
    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Whether the bus is empty.
    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }
}

#[async_trait::async_trait]
impl TxBus for MemoryBus {
    async fn pop(&self) -> Result<Option<Tx>> {
        Ok(self.queue.lock().await.pop_front())
    }

    async fn push(&self, tx: Tx) -> Result<()> {
        self.queue.lock().await.push_back(tx);
        Ok(())
    }
}
