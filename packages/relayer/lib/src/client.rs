//! The ProofStore client capability and node pool.
//!
//! Node construction, connection pooling and failover are the host's
//! responsibility; this crate only consumes the capability. Both the
//! listener and the submitter receive their client at construction, never
//! through a global.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::events::SmartContractEvent;
use crate::msg::HubHeader;

/// A state-proof response: the hex-encoded audit path.
#[derive(Clone, Debug)]
pub struct StateProof {
    /// Hex-encoded audit path bytes.
    pub audit_path: String,
}

/// Opaque signing handle injected by the host process.
///
/// Wallet and key management are external; the relay core only needs the
/// account address and hands the signer through to submission calls.
#[derive(Clone, Debug)]
pub struct Signer {
    /// Hex account address of the relayer.
    pub address: String,
}

impl Signer {
    /// The address as raw bytes, used as the import beneficiary.
    #[must_use]
    pub fn address_bytes(&self) -> Vec<u8> {
        hex::decode(crate::msg::lower_hex(&self.address))
            .unwrap_or_else(|_| self.address.clone().into_bytes())
    }
}

/// Read/submit access to a hub-chain node.
#[async_trait::async_trait]
pub trait ProofStoreClient: Send + Sync {
    /// Fetch the hub header at `height`.
    async fn get_header_by_height(&self, height: u32) -> Result<HubHeader>;

    /// Resolve the block height a hub transaction was confirmed at.
    async fn get_block_height_by_tx_hash(&self, hash: &str) -> Result<u32>;

    /// Hash of the side-chain header stored on the hub at `height`, if any.
    async fn get_side_chain_header(&self, chain_id: u64, height: u64) -> Result<Vec<u8>>;

    /// Latest side-chain height known to the hub's header store.
    async fn get_side_chain_height(&self, chain_id: u64) -> Result<u64>;

    /// Cross-states proof for `key` at hub height `height`.
    async fn get_cross_states_proof(&self, height: u32, key: &str) -> Result<StateProof>;

    /// Smart-contract event for a confirmation hash.
    async fn get_smart_contract_event(&self, hash: &str) -> Result<SmartContractEvent>;

    /// All smart-contract events in a hub block.
    async fn get_smart_contract_event_by_block(
        &self,
        height: u32,
    ) -> Result<Vec<SmartContractEvent>>;

    /// Merkle proof linking the header at `from` to the block root at `to`.
    async fn get_merkle_proof(&self, from: u32, to: u32) -> Result<StateProof>;

    /// Latest hub block height.
    async fn latest_height(&self) -> Result<u64>;

    /// Submit side-chain headers to the hub's header store.
    async fn sync_block_header(
        &self,
        chain_id: u64,
        signer_address: &str,
        headers: &[Vec<u8>],
        signer: &Signer,
    ) -> Result<String>;

    /// Import an inbound cross-chain transfer into the hub.
    #[allow(clippy::too_many_arguments)]
    async fn import_outer_transfer(
        &self,
        chain_id: u64,
        value: &[u8],
        proof_height: u32,
        proof: &[u8],
        beneficiary: &[u8],
        extra: &[u8],
        signer: &Signer,
    ) -> Result<String>;

    /// Wait for a submitted transaction to reach `min_confirmations`,
    /// polling up to `retries` times.
    async fn confirm(&self, hash: &str, min_confirmations: u32, retries: u32) -> Result<()>;
}

/// The set of hub nodes available to the relayer: one primary plus
/// alternates used for cross-validation.
pub struct NodePool {
    nodes: Vec<Arc<dyn ProofStoreClient>>,
    last_height: AtomicU64,
}

impl NodePool {
    /// Create a pool; the first node is the primary.
    pub fn new(nodes: Vec<Arc<dyn ProofStoreClient>>) -> Result<Self> {
        if nodes.is_empty() {
            bail!("node pool requires at least one client");
        }
        Ok(Self { nodes, last_height: AtomicU64::new(0) })
    }

    /// The primary node.
    #[must_use]
    pub fn node(&self) -> &Arc<dyn ProofStoreClient> {
        &self.nodes[0]
    }

    /// Every node in the pool, primary first.
    #[must_use]
    pub fn all(&self) -> &[Arc<dyn ProofStoreClient>] {
        &self.nodes
    }

    /// Observe the primary's latest height and return the delta against the
    /// previous observation. A non-positive delta means the node set has
    /// stalled since the last check.
    pub async fn height_delta(&self) -> Result<i64> {
        let latest = self.node().latest_height().await?;
        let previous = self.last_height.swap(latest, Ordering::SeqCst);
        #[allow(clippy::cast_possible_wrap)]
        Ok(latest as i64 - previous as i64)
    }
}
