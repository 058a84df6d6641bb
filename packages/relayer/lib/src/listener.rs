//! Hub-chain listener: scans hub blocks for relay-eligible transactions and
//! cross-validates claimed transfers against independently derived proofs.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tracing::{debug, warn};

use crate::chain;
use crate::client::{NodePool, ProofStoreClient};
use crate::events::MakeProof;
use crate::msg::{reverse_hex, RelayError, Tx, TxType};
use crate::submitter::get_proof;

/// Listener configuration.
#[derive(Clone, Debug)]
pub struct ListenerConfig {
    /// Address of the hub's cross-chain manager contract.
    pub ccm_address: String,
    /// Poll interval for the scan loop, in seconds.
    pub listen_check: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self { ccm_address: chain::CCM_ADDRESS.to_string(), listen_check: 0 }
    }
}

/// Scans the hub chain for cross-chain transactions awaiting relay.
pub struct Listener {
    pool: Arc<NodePool>,
    config: ListenerConfig,
}

impl Listener {
    /// Create a listener over the given node pool.
    #[must_use]
    pub fn new(config: ListenerConfig, pool: Arc<NodePool>) -> Self {
        Self { pool, config }
    }

    /// The chain this listener observes.
    #[must_use]
    pub const fn chain_id(&self) -> u64 {
        chain::HUB
    }

    /// Poll interval between scan iterations.
    #[must_use]
    pub const fn listen_check(&self) -> Duration {
        if self.config.listen_check == 0 {
            Duration::from_secs(1)
        } else {
            Duration::from_secs(self.config.listen_check)
        }
    }

    /// Blocks to stay behind the chain tip. Hub finality is immediate, so a
    /// single block of settling is enough.
    #[must_use]
    pub const fn defer(&self) -> u64 {
        1
    }

    /// Latest hub block height on the primary node.
    pub async fn latest_height(&self) -> Result<u64> {
        self.pool.node().latest_height().await
    }

    /// Block height a hub transaction was confirmed at.
    pub async fn get_tx_block(&self, hash: &str) -> Result<u64> {
        let height = self.pool.node().get_block_height_by_tx_hash(hash).await?;
        Ok(u64::from(height))
    }

    /// Verify the node pool is advancing; errors when the observed height
    /// has not grown since the previous check.
    pub async fn validate_nodes(&self) -> Result<()> {
        let delta = self.pool.height_delta().await?;
        if delta <= 0 {
            bail!("hub node pool stalled, height delta {delta}");
        }
        Ok(())
    }

    /// Collect all relay-eligible transactions confirmed in hub block
    /// `height`.
    pub async fn scan(&self, height: u32) -> Result<Vec<Tx>> {
        let events = self.pool.node().get_smart_contract_event_by_block(height).await?;
        let mut txs = Vec::new();
        for event in &events {
            for notify in &event.notify {
                if notify.contract_address != self.config.ccm_address {
                    continue;
                }
                match MakeProof::parse(&notify.states) {
                    Ok(proof) if proof.dst_chain_id == 0 => {
                        warn!(hash = %event.tx_hash, "makeProof with zero destination chain, skipping");
                    }
                    Ok(proof) => txs.push(self.tx_from_proof(&event.tx_hash, height, &proof)),
                    Err(err) => {
                        debug!(hash = %event.tx_hash, error = %err, "skipping non-makeProof notification");
                    }
                }
            }
        }
        Ok(txs)
    }

    /// Locate a relay-eligible transaction by its hub confirmation hash.
    /// `Ok(None)` when the event carries no `makeProof` notification.
    pub async fn scan_tx(&self, hash: &str) -> Result<Option<Tx>> {
        self.scan_tx_on(self.pool.node().as_ref(), hash).await
    }

    async fn scan_tx_on(
        &self,
        client: &dyn ProofStoreClient,
        hash: &str,
    ) -> Result<Option<Tx>> {
        let event = client.get_smart_contract_event(hash).await?;
        for notify in &event.notify {
            if notify.contract_address != self.config.ccm_address {
                continue;
            }
            if let Ok(proof) = MakeProof::parse(&notify.states) {
                if proof.dst_chain_id == 0 {
                    warn!(hash = %event.tx_hash, "makeProof with zero destination chain, skipping");
                    continue;
                }
                return Ok(Some(self.tx_from_proof(&event.tx_hash, proof.hub_height, &proof)));
            }
        }
        Ok(None)
    }

    /// Scan a hub block and resolve the proven cross-chain parameter for
    /// every transaction found in it.
    pub async fn scan_dst(&self, height: u32) -> Result<Vec<Tx>> {
        let mut txs = self.scan(height).await?;
        for tx in &mut txs {
            let (value, path) =
                get_proof(self.pool.node().as_ref(), tx.hub_height, &tx.hub_key).await?;
            tx.merkle_value = Some(value);
            tx.audit_path = path;
        }
        Ok(txs)
    }

    /// Re-derive a claimed transaction from its confirmation event and
    /// check the claim against it. Tries the primary node first, then every
    /// alternate; disagreement is a [`RelayError::Violation`] and
    /// short-circuits, while a record no node can derive is
    /// [`RelayError::ProofMissing`].
    pub async fn validate(&self, tx: &Tx) -> Result<(), RelayError> {
        let mut last = RelayError::ProofMissing;
        for client in self.pool.all() {
            match self.validate_on(client.as_ref(), tx).await {
                Ok(()) => return Ok(()),
                Err(err @ RelayError::Violation(_)) => return Err(err),
                Err(err) => {
                    warn!(hub_hash = %tx.hub_hash, error = %err, "proof not derivable on node, trying next");
                    last = err;
                }
            }
        }
        Err(last)
    }

    /// The claim is never trusted here: the transaction is re-derived from
    /// the confirmation event on this node and the proof is fetched at the
    /// re-derived height and key, not the claimed ones.
    async fn validate_on(
        &self,
        client: &dyn ProofStoreClient,
        tx: &Tx,
    ) -> Result<(), RelayError> {
        let derived = self
            .scan_tx_on(client, &tx.hub_hash)
            .await
            .map_err(|_| RelayError::ProofMissing)?
            .ok_or(RelayError::ProofMissing)?;

        if derived.src_chain_id != tx.src_chain_id {
            return Err(RelayError::Violation(format!(
                "derived source chain {} does not match claimed {} for hub tx {}",
                derived.src_chain_id, tx.src_chain_id, tx.hub_hash
            )));
        }
        if derived.dst_chain_id != tx.dst_chain_id {
            return Err(RelayError::Violation(format!(
                "derived destination chain {} does not match claimed {} for hub tx {}",
                derived.dst_chain_id, tx.dst_chain_id, tx.hub_hash
            )));
        }

        let (value, _) = get_proof(client, derived.hub_height, &derived.hub_key)
            .await
            .map_err(|_| RelayError::ProofMissing)?;
        let Some(transfer) = &value.transfer else {
            return Err(RelayError::ProofMissing);
        };
        let proven = hex::encode(&transfer.to_contract);
        if proven != crate::msg::lower_hex(&tx.dst_proxy) {
            return Err(RelayError::Violation(format!(
                "proven destination contract {proven} does not match claimed {} for hub tx {}",
                tx.dst_proxy, tx.hub_hash
            )));
        }
        Ok(())
    }

    fn tx_from_proof(&self, hub_hash: &str, height: u32, proof: &MakeProof) -> Tx {
        let tx_id = if chain::uses_reversed_tx_id(proof.src_chain_id) {
            reverse_hex(&proof.tx_id)
        } else {
            proof.tx_id.clone()
        };
        Tx {
            tx_type: TxType::Hub,
            src_chain_id: proof.src_chain_id,
            dst_chain_id: proof.dst_chain_id,
            src_hash: tx_id.clone(),
            tx_id,
            hub_hash: hub_hash.to_string(),
            hub_height: height,
            hub_key: proof.key.clone(),
            ..Tx::default()
        }
    }
}
