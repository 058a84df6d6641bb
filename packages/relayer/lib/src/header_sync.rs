//! Header sync engine: batches side-chain headers into the hub's header
//! store, with timeout-driven flushing and fork-recovery rollback.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::chain;
use crate::client::{ProofStoreClient, Signer};
use crate::msg::{is_fork_error, HeaderRecord};

/// How far to rewind the upstream stream past a forked header. Deliberately
/// large so short-range forks are fully replayed.
const ROLLBACK_MARGIN: u64 = 100;

/// Backoff between submission retries.
const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for one side chain's header sync.
#[derive(Clone, Debug)]
pub struct HeaderSyncConfig {
    /// Side chain whose headers are synced.
    pub chain_id: u64,
    /// Headers per flush; `1` selects single mode.
    pub batch: usize,
    /// Header channel capacity; defaults to `2 * batch`.
    pub buffer: usize,
    /// Flush timeout in batch mode.
    pub timeout: Duration,
}

impl HeaderSyncConfig {
    /// Config with defaults for everything but the chain id.
    #[must_use]
    pub const fn new(chain_id: u64) -> Self {
        Self { chain_id, batch: 0, buffer: 0, timeout: Duration::ZERO }
    }

    fn normalize(&mut self) {
        if self.batch == 0 {
            self.batch = 1;
        }
        if self.buffer == 0 {
            self.buffer = 2 * self.batch;
        }
        if self.timeout.is_zero() {
            self.timeout = Duration::from_secs(1);
        }
    }
}

/// Syncs one side chain's header stream into the hub.
pub struct HeaderSync {
    client: Arc<dyn ProofStoreClient>,
    signer: Signer,
    config: HeaderSyncConfig,
}

impl HeaderSync {
    /// Create an engine for the given side chain.
    #[must_use]
    pub const fn new(
        config: HeaderSyncConfig,
        client: Arc<dyn ProofStoreClient>,
        signer: Signer,
    ) -> Self {
        Self { client, signer, config }
    }

    /// Validate the configuration and spawn the sync task.
    ///
    /// Returns the header channel sender and the task handle. The task runs
    /// until the sender is dropped; rollback heights are reported on `reset`
    /// and the rewound replay is the upstream listener's responsibility.
    pub fn start(
        mut self,
        reset: mpsc::Sender<u64>,
    ) -> Result<(mpsc::Sender<HeaderRecord>, JoinHandle<()>)> {
        if self.config.chain_id == 0 {
            bail!("invalid header sync side chain id");
        }
        self.config.normalize();

        let (sender, receiver) = mpsc::channel(self.config.buffer);
        let handle = tokio::spawn(async move {
            if self.config.batch == 1 {
                self.run_single(receiver, reset).await;
            } else {
                self.run_batch(receiver, reset).await;
            }
            info!(chain = chain::name(self.config.chain_id), "header sync exiting loop now");
        });
        Ok((sender, handle))
    }

    async fn run_single(&self, mut ch: mpsc::Receiver<HeaderRecord>, reset: mpsc::Sender<u64>) {
        while let Some(header) = ch.recv().await {
            let outcome = match self.check_header_existence(&header).await {
                Ok(true) => continue,
                Ok(false) => {
                    self.submit_headers_with_retry(std::slice::from_ref(&header.data)).await
                }
                Err(err) => Err(err),
            };
            if let Err(err) = outcome {
                error!(
                    chain_id = self.config.chain_id,
                    height = header.height,
                    error = %err,
                    "header submission failed, requesting rollback"
                );
                let _ = reset.send(header.height.saturating_sub(ROLLBACK_MARGIN)).await;
            }
        }
    }

    async fn run_batch(&self, mut ch: mpsc::Receiver<HeaderRecord>, reset: mpsc::Sender<u64>) {
        let mut headers: Vec<Vec<u8>> = Vec::new();
        let mut height = 0u64;
        loop {
            let mut commit = false;
            let mut closed = false;
            tokio::select! {
                received = ch.recv() => match received {
                    Some(header) => {
                        height = header.height;
                        headers.push(header.data);
                        commit = headers.len() >= self.config.batch;
                    }
                    None => closed = true,
                },
                () = tokio::time::sleep(self.config.timeout) => {
                    commit = !headers.is_empty();
                }
            }
            if closed {
                break;
            }
            if commit {
                if let Err(err) = self.submit_headers_with_retry(&headers).await {
                    error!(
                        chain_id = self.config.chain_id,
                        height,
                        buffered = headers.len(),
                        error = %err,
                        "batch header submission failed, requesting rollback"
                    );
                    let target =
                        height.saturating_sub(ROLLBACK_MARGIN + headers.len() as u64);
                    let _ = reset.send(target).await;
                }
                headers.clear();
            }
        }
        // Stream closed: flush whatever is buffered, best effort.
        if !headers.is_empty() {
            if let Err(err) = self.submit_headers(&headers).await {
                error!(
                    chain_id = self.config.chain_id,
                    error = %err,
                    "final header flush failed"
                );
            }
        }
    }

    /// Whether the hub already stores this exact header at its height.
    async fn check_header_existence(&self, header: &HeaderRecord) -> Result<bool> {
        let stored = self
            .client
            .get_side_chain_header(self.config.chain_id, header.height)
            .await?;
        Ok(stored == header.hash)
    }

    /// Submit with indefinite fixed backoff; fork-indicating errors are
    /// terminal for this attempt.
    async fn submit_headers_with_retry(&self, headers: &[Vec<u8>]) -> Result<()> {
        loop {
            match self.submit_headers(headers).await {
                Ok(_) => return Ok(()),
                Err(err) => {
                    if is_fork_error(&format!("{err:#}")) {
                        error!(
                            chain_id = self.config.chain_id,
                            error = %err,
                            "possible header fork, will roll back some blocks"
                        );
                        return Err(err);
                    }
                    error!(
                        chain_id = self.config.chain_id,
                        error = %err,
                        "failed to submit side chain headers to hub, retrying"
                    );
                    tokio::time::sleep(RETRY_INTERVAL).await;
                }
            }
        }
    }

    async fn submit_headers(&self, headers: &[Vec<u8>]) -> Result<String> {
        let hash = self
            .client
            .sync_block_header(self.config.chain_id, &self.signer.address, headers, &self.signer)
            .await?;
        self.client.confirm(&hash, 0, 10).await?;
        info!(
            chain = chain::name(self.config.chain_id),
            chain_id = self.config.chain_id,
            count = headers.len(),
            %hash,
            "submitted side chain headers to hub"
        );
        Ok(hash)
    }
}
