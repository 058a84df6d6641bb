//! Hub-chain submitter: imports inbound cross-chain transfers, composes
//! outbound proof packages, and detects keeper-epoch rotation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::PublicKey;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::bus::TxBus;
use crate::chain;
use crate::client::{ProofStoreClient, Signer};
use crate::codec::{parse_audit_path, Sink};
use crate::events::MakeProof;
use crate::msg::{
    convert_sig_to_dst, encode_keeper_key, keeper_digest, ConsensusInfo, CrossStateValue,
    HubHeader, RelayError, Tx,
};

/// Idle sleep after an empty queue pop.
const IDLE_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for the submission pipeline.
#[derive(Clone, Debug)]
pub struct SubmitterConfig {
    /// Chain id the submitter's name/logging is keyed on.
    pub chain_id: u64,
    /// Number of worker tasks.
    pub procs: usize,
    /// Cross-chain methods accepted during proof composition.
    pub allow_methods: HashSet<String>,
    /// Address of the hub's cross-chain manager contract.
    pub ccm_address: String,
}

impl SubmitterConfig {
    /// Config with the default allow-list and manager address.
    #[must_use]
    pub fn new(chain_id: u64, procs: usize) -> Self {
        Self {
            chain_id,
            procs,
            allow_methods: default_allow_methods(),
            ccm_address: chain::CCM_ADDRESS.to_string(),
        }
    }
}

/// The default cross-chain method allow-list.
#[must_use]
pub fn default_allow_methods() -> HashSet<String> {
    ["unlock"].into_iter().map(str::to_string).collect()
}

/// Worker handles for a started pipeline.
pub struct SubmitterHandle {
    workers: Vec<JoinHandle<()>>,
}

impl SubmitterHandle {
    /// Wait for every worker to exit. Called after cancelling the shutdown
    /// token; guarantees no transaction is abandoned mid-flight without
    /// being requeued first.
    pub async fn stop(self) {
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

/// Imports transactions into the hub and composes outbound proofs.
#[derive(Clone)]
pub struct Submitter {
    client: Arc<dyn ProofStoreClient>,
    signer: Signer,
    config: Arc<SubmitterConfig>,
    name: &'static str,
}

impl Submitter {
    /// Create a submitter over an injected hub client.
    #[must_use]
    pub fn new(
        config: SubmitterConfig,
        client: Arc<dyn ProofStoreClient>,
        signer: Signer,
    ) -> Self {
        let name = chain::name(config.chain_id);
        Self { client, signer, config: Arc::new(config), name }
    }

    /// Spawn the worker pool draining `bus`.
    #[must_use]
    pub fn start(&self, bus: Arc<dyn TxBus>, shutdown: CancellationToken) -> SubmitterHandle {
        let workers = (0..self.config.procs.max(1))
            .map(|index| {
                let worker = self.clone();
                let bus = bus.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { worker.run(index, bus, shutdown).await })
            })
            .collect();
        SubmitterHandle { workers }
    }

    async fn run(&self, worker: usize, bus: Arc<dyn TxBus>, shutdown: CancellationToken) {
        loop {
            let popped = tokio::select! {
                () = shutdown.cancelled() => {
                    info!(name = self.name, worker, "submitter worker exiting now");
                    return;
                }
                popped = bus.pop() => popped,
            };
            match popped {
                Err(err) => {
                    error!(worker, error = %err, "bus pop error");
                }
                Ok(None) => {
                    tokio::select! {
                        () = shutdown.cancelled() => {
                            info!(name = self.name, worker, "submitter worker exiting now");
                            return;
                        }
                        () = tokio::time::sleep(IDLE_INTERVAL) => {}
                    }
                }
                Ok(Some(mut tx)) => {
                    if let Err(err) = self.submit(&mut tx).await {
                        error!(
                            worker,
                            src_chain_id = tx.src_chain_id,
                            src_hash = %tx.src_hash,
                            error = %err,
                            "failed to import transfer to hub, requeuing"
                        );
                        tx.attempts += 1;
                        if let Err(err) = bus.push(tx).await {
                            error!(worker, error = %err, "bus push error");
                        }
                    }
                }
            }
        }
    }

    /// Import one inbound transfer into the hub. On success the resulting
    /// hub transaction hash is recorded on the Tx.
    pub async fn submit(&self, tx: &mut Tx) -> Result<(), RelayError> {
        let mut missing = Vec::new();
        if tx.src_height == 0 {
            missing.push("src_height");
        }
        if tx.src_proof.is_empty() {
            missing.push("src_proof");
        }
        if tx.src_event.is_empty() {
            missing.push("src_event");
        }
        if tx.src_chain_id == 0 {
            missing.push("src_chain_id");
        }
        if tx.src_hash.is_empty() {
            missing.push("src_hash");
        }
        if tx.src_proof_height == 0 {
            missing.push("src_proof_height");
        }
        if !missing.is_empty() {
            return Err(RelayError::Malformed {
                field: "src_tx",
                detail: format!("missing required fields: {}", missing.join(", ")),
            });
        }

        let value = hex::decode(&tx.src_event).map_err(|err| RelayError::Malformed {
            field: "src_event",
            detail: format!("{err}, value {}", tx.src_event),
        })?;
        let proof = hex::decode(&tx.src_proof).map_err(|err| RelayError::Malformed {
            field: "src_proof",
            detail: format!("{err}, proof {}", tx.src_proof),
        })?;

        let proof_height = u32::try_from(tx.src_proof_height).map_err(|_| {
            RelayError::Malformed {
                field: "src_proof_height",
                detail: format!("{} does not fit the hub's height type", tx.src_proof_height),
            }
        })?;

        let hash = self
            .client
            .import_outer_transfer(
                tx.src_chain_id,
                &value,
                proof_height,
                &proof,
                &self.signer.address_bytes(),
                &[],
                &self.signer,
            )
            .await
            .map_err(|err| RelayError::Other(err.context("failed to import tx to hub")))?;
        tx.hub_hash = hash;
        Ok(())
    }

    /// Assemble the full proof package for a hub-confirmed transaction:
    /// Merkle path, anchor header across a keeper-epoch boundary when one is
    /// crossed, and aggregated signatures.
    pub async fn compose_tx(&self, tx: &mut Tx) -> Result<(), RelayError> {
        if tx.hub_hash.is_empty() {
            return Err(RelayError::Malformed {
                field: "hub_hash",
                detail: "hub confirmation hash not set".to_string(),
            });
        }
        if tx.dst_hub_epoch_start_height == 0 {
            return Err(RelayError::Malformed {
                field: "dst_hub_epoch_start_height",
                detail: "destination chain hub epoch height not specified".to_string(),
            });
        }

        if tx.hub_height == 0 {
            tx.hub_height = self.client.get_block_height_by_tx_hash(&tx.hub_hash).await?;
        }

        // The header at height + 1 carries the signatures attesting the
        // block containing the transaction.
        let hub_header = self.client.get_header_by_height(tx.hub_height + 1).await?;

        let anchor_height = if tx.hub_height < tx.dst_hub_epoch_start_height {
            tx.dst_hub_epoch_start_height + 1
        } else if self.check_epoch(tx, &hub_header)?.0 {
            tx.hub_height + 2
        } else {
            0
        };
        tx.hub_header = Some(hub_header);

        if anchor_height > 0 {
            tx.anchor_header = Some(self.client.get_header_by_height(anchor_height).await?);
            let proof = self.client.get_merkle_proof(tx.hub_height + 1, anchor_height).await?;
            tx.anchor_proof = proof.audit_path;
        }

        let (value, path, _event) = self.get_hub_params(tx).await?;
        let allowed = value
            .transfer
            .as_ref()
            .is_some_and(|transfer| self.config.allow_methods.contains(&transfer.method));
        if !allowed {
            let detail = value.transfer.as_ref().map_or_else(
                || "missing cross-chain parameter".to_string(),
                |transfer| format!("method {} not allowed", transfer.method),
            );
            return Err(RelayError::InvalidTx {
                src_chain_id: tx.src_chain_id,
                hub_hash: tx.hub_hash.clone(),
                detail,
            });
        }
        tx.merkle_value = Some(value);
        tx.audit_path = path;

        self.collect_sigs(tx)
    }

    /// Determine whether `header` rotates the keeper set relative to the
    /// destination chain's recorded expectation.
    ///
    /// Returns the rotation flag and the relayer's native record of the new
    /// keeper keys. Decode failures on the consensus payload are fatal to
    /// this composition attempt.
    pub fn check_epoch(
        &self,
        tx: &Tx,
        header: &HubHeader,
    ) -> Result<(bool, Vec<u8>), RelayError> {
        if tx.dst_hub_keepers.is_empty() {
            return Err(RelayError::Malformed {
                field: "dst_hub_keepers",
                detail: "destination chain keeper set not provided".to_string(),
            });
        }
        if !header.has_next_bookkeeper() {
            return Ok((false, Vec::new()));
        }

        let info: ConsensusInfo =
            serde_json::from_slice(&header.consensus_payload).map_err(|err| {
                RelayError::Malformed {
                    field: "consensus_payload",
                    detail: err.to_string(),
                }
            })?;
        let peers = info.new_chain_config.map(|config| config.peers).unwrap_or_default();

        let mut keys = Vec::with_capacity(peers.len());
        for peer in &peers {
            let raw = hex::decode(&peer.id).map_err(|err| RelayError::Malformed {
                field: "peer_id",
                detail: format!("peer {}: {err}", peer.index),
            })?;
            let key = PublicKey::from_sec1_bytes(&raw).map_err(|err| RelayError::Malformed {
                field: "peer_id",
                detail: format!("peer {}: {err}", peer.index),
            })?;
            keys.push(key);
        }
        // Canonical order; destination-chain signature verification depends
        // on the exact keeper ordering.
        keys.sort_by(|a, b| {
            a.to_encoded_point(true).as_bytes().cmp(b.to_encoded_point(true).as_bytes())
        });

        let mut native = Vec::new();
        let mut sink = Sink::new();
        sink.write_u64(keys.len() as u64);
        for key in &keys {
            native.extend_from_slice(&encode_keeper_key(key));
            sink.write_var_bytes(&keeper_digest(key));
        }

        let rotated = tx.dst_hub_keepers != sink.bytes();
        Ok((rotated, native))
    }

    /// Resolve the cross-chain parameter and audit path for `tx`, via the
    /// direct key lookup when the state key is known and event replay
    /// otherwise.
    pub async fn get_hub_params(
        &self,
        tx: &mut Tx,
    ) -> Result<(CrossStateValue, Vec<u8>, Option<crate::events::SmartContractEvent>), RelayError>
    {
        if tx.hub_hash.is_empty() {
            return Err(RelayError::Malformed {
                field: "hub_hash",
                detail: "hub confirmation hash not set".to_string(),
            });
        }
        if tx.hub_height == 0 {
            tx.hub_height = self.client.get_block_height_by_tx_hash(&tx.hub_hash).await?;
        }

        if !tx.hub_key.is_empty() {
            let (value, path) =
                get_proof(self.client.as_ref(), tx.hub_height, &tx.hub_key).await?;
            return Ok((value, path, None));
        }

        let event = self.client.get_smart_contract_event(&tx.hub_hash).await?;
        for notify in &event.notify {
            if notify.contract_address != self.config.ccm_address {
                continue;
            }
            let proof = match MakeProof::parse(&notify.states) {
                Ok(proof) => proof,
                Err(err) => {
                    debug!(hash = %event.tx_hash, error = %err, "skipping non-makeProof notification");
                    continue;
                }
            };
            match get_proof(self.client.as_ref(), tx.hub_height, &proof.key).await {
                Ok((value, path)) => return Ok((value, path, Some(event.clone()))),
                Err(err) => {
                    error!(hash = %event.tx_hash, error = %err, "failed to derive proof from makeProof notification");
                }
            }
        }
        Err(RelayError::InvalidTx {
            src_chain_id: tx.src_chain_id,
            hub_hash: tx.hub_hash.clone(),
            detail: "valid proof parameter not found".to_string(),
        })
    }

    /// Aggregate the signed header's signatures into the destination
    /// chain's encoding, in header order. Uses the anchor header when one
    /// was selected.
    pub fn collect_sigs(&self, tx: &mut Tx) -> Result<(), RelayError> {
        let sig_header = if tx.anchor_header.is_some() && !tx.anchor_proof.is_empty() {
            tx.anchor_header.as_ref()
        } else {
            tx.hub_header.as_ref()
        };
        let Some(header) = sig_header else {
            return Err(RelayError::Malformed {
                field: "hub_header",
                detail: "no signed header available".to_string(),
            });
        };

        let mut sigs = Vec::new();
        for sig in &header.sig_data {
            sigs.extend_from_slice(&convert_sig_to_dst(sig)?);
        }
        tx.dst_sigs = sigs;
        Ok(())
    }
}

/// Fetch, decode and deserialize the cross-states proof at `(height, key)`.
///
/// Shared with the listener's validation path, which re-derives proofs on
/// arbitrary pool nodes.
pub async fn get_proof(
    client: &dyn ProofStoreClient,
    height: u32,
    key: &str,
) -> Result<(CrossStateValue, Vec<u8>), RelayError> {
    let proof = client
        .get_cross_states_proof(height, key)
        .await
        .map_err(|err| RelayError::Other(err.context("get_cross_states_proof")))?;
    let path = hex::decode(&proof.audit_path).map_err(|err| RelayError::Malformed {
        field: "audit_path",
        detail: err.to_string(),
    })?;
    let value_bytes = parse_audit_path(&path)
        .map_err(|err| RelayError::Malformed { field: "audit_path", detail: err.to_string() })?
        .value
        .to_vec();
    let value = CrossStateValue::decode(&value_bytes).map_err(|err| RelayError::Malformed {
        field: "merkle_value",
        detail: err.to_string(),
    })?;
    Ok((value, path))
}
