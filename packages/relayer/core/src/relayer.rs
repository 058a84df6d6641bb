//! Module wiring: turns a validated configuration into running relay
//! components and tears them down again.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use hub_relayer_lib::bus::TxBus;
use hub_relayer_lib::client::{NodePool, Signer};
use hub_relayer_lib::header_sync::HeaderSync;
use hub_relayer_lib::listener::Listener;
use hub_relayer_lib::msg::HeaderRecord;
use hub_relayer_lib::submitter::{Submitter, SubmitterHandle};

/// Capacity of each per-chain rollback channel.
const RESET_BUFFER: usize = 8;

/// The assembled relayer.
pub struct Relayer {
    config: crate::RelayerConfig,
    pool: Arc<NodePool>,
    bus: Arc<dyn TxBus>,
    signer: Signer,
    shutdown: CancellationToken,
}

/// Handles to the running components.
///
/// Header channels and rollback receivers are keyed by side chain id; the
/// host feeds headers in and services rollback requests. Dropping a header
/// sender ends that chain's sync task.
pub struct RelayerHandles {
    /// Per-chain header submission channels.
    pub headers: HashMap<u64, mpsc::Sender<HeaderRecord>>,
    /// Per-chain rollback height notifications.
    pub rollbacks: HashMap<u64, mpsc::Receiver<u64>>,
    /// The hub listener, when configured.
    pub listener: Option<Arc<Listener>>,
    sync_tasks: Vec<JoinHandle<()>>,
    submitter: Option<SubmitterHandle>,
}

impl Relayer {
    /// Assemble a relayer from a validated configuration and the host's
    /// runtime capabilities.
    #[must_use]
    pub fn new(
        config: crate::RelayerConfig,
        pool: Arc<NodePool>,
        bus: Arc<dyn TxBus>,
        signer: Signer,
    ) -> Self {
        Self { config, pool, bus, signer, shutdown: CancellationToken::new() }
    }

    /// Start every enabled component.
    pub fn start(&self) -> Result<RelayerHandles> {
        let mut headers = HashMap::new();
        let mut rollbacks = HashMap::new();
        let mut sync_tasks = Vec::new();

        for section in &self.config.header_sync {
            if !section.enabled {
                continue;
            }
            let sync = HeaderSync::new(
                section.to_sync_config(),
                self.pool.node().clone(),
                self.signer.clone(),
            );
            let (reset, reset_rx) = mpsc::channel(RESET_BUFFER);
            let (sender, task) = sync.start(reset)?;
            headers.insert(section.chain_id, sender);
            rollbacks.insert(section.chain_id, reset_rx);
            sync_tasks.push(task);
            info!(chain_id = section.chain_id, "started header sync");
        }

        let submitter = self
            .config
            .submitter
            .as_ref()
            .filter(|section| section.enabled)
            .map(|section| {
                let submitter = Submitter::new(
                    section.to_submitter_config(),
                    self.pool.node().clone(),
                    self.signer.clone(),
                );
                info!(procs = section.procs, "started submitter workers");
                submitter.start(self.bus.clone(), self.shutdown.clone())
            });

        let listener = self
            .config
            .listener
            .as_ref()
            .filter(|section| section.enabled)
            .map(|section| Arc::new(Listener::new(section.to_listener_config(), self.pool.clone())));

        Ok(RelayerHandles { headers, rollbacks, listener, sync_tasks, submitter })
    }

    /// Stop every component and wait for the tasks to exit.
    pub async fn stop(&self, handles: RelayerHandles) {
        self.shutdown.cancel();
        if let Some(submitter) = handles.submitter {
            submitter.stop().await;
        }
        // Closing the header channels ends the sync loops.
        drop(handles.headers);
        let _ = futures::future::join_all(handles.sync_tasks).await;
        info!("relayer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_config;
    use anyhow::bail;
    use hub_relayer_lib::bus::MemoryBus;
    use hub_relayer_lib::client::{ProofStoreClient, StateProof};
    use hub_relayer_lib::events::SmartContractEvent;
    use hub_relayer_lib::msg::HubHeader;
    use serde_json::json;

    struct StubNode;

    #[async_trait::async_trait]
    impl ProofStoreClient for StubNode {
        async fn get_header_by_height(&self, height: u32) -> Result<HubHeader> {
            bail!("no header at {height}")
        }
        async fn get_block_height_by_tx_hash(&self, _hash: &str) -> Result<u32> {
            Ok(0)
        }
        async fn get_side_chain_header(&self, _chain_id: u64, _height: u64) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
        async fn get_side_chain_height(&self, _chain_id: u64) -> Result<u64> {
            Ok(0)
        }
        async fn get_cross_states_proof(&self, _height: u32, key: &str) -> Result<StateProof> {
            bail!("no proof for {key}")
        }
        async fn get_smart_contract_event(&self, hash: &str) -> Result<SmartContractEvent> {
            bail!("no event for {hash}")
        }
        async fn get_smart_contract_event_by_block(
            &self,
            _height: u32,
        ) -> Result<Vec<SmartContractEvent>> {
            Ok(Vec::new())
        }
        async fn get_merkle_proof(&self, from: u32, to: u32) -> Result<StateProof> {
            bail!("no merkle proof {from}..{to}")
        }
        async fn latest_height(&self) -> Result<u64> {
            Ok(0)
        }
        async fn sync_block_header(
            &self,
            _chain_id: u64,
            _signer_address: &str,
            _headers: &[Vec<u8>],
            _signer: &hub_relayer_lib::client::Signer,
        ) -> Result<String> {
            Ok("hash".to_string())
        }
        async fn import_outer_transfer(
            &self,
            _chain_id: u64,
            _value: &[u8],
            _proof_height: u32,
            _proof: &[u8],
            _beneficiary: &[u8],
            _extra: &[u8],
            _signer: &hub_relayer_lib::client::Signer,
        ) -> Result<String> {
            Ok("hash".to_string())
        }
        async fn confirm(&self, _hash: &str, _min_confirmations: u32, _retries: u32) -> Result<()> {
            Ok(())
        }
    }

    fn relayer(raw: &str) -> Relayer {
        let config = parse_config(raw).unwrap();
        let pool =
            Arc::new(NodePool::new(vec![Arc::new(StubNode) as Arc<dyn ProofStoreClient>]).unwrap());
        Relayer::new(
            config,
            pool,
            Arc::new(MemoryBus::new()),
            Signer { address: "ab".into() },
        )
    }

    #[tokio::test]
    async fn starts_and_stops_all_components() {
        let raw = json!({
            "header_sync": [{ "chain_id": 2 }, { "chain_id": 3, "enabled": false }],
            "submitter": { "procs": 2 },
            "listener": {}
        })
        .to_string();

        let relayer = relayer(&raw);
        let handles = relayer.start().unwrap();
        assert!(handles.headers.contains_key(&2));
        assert!(!handles.headers.contains_key(&3));
        assert!(handles.rollbacks.contains_key(&2));
        assert!(handles.listener.is_some());

        relayer.stop(handles).await;
    }

    #[tokio::test]
    async fn empty_config_starts_nothing() {
        let relayer = relayer("{}");
        let handles = relayer.start().unwrap();
        assert!(handles.headers.is_empty());
        assert!(handles.listener.is_none());
        relayer.stop(handles).await;
    }
}
