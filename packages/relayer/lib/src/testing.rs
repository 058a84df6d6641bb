//! Shared in-memory hub node for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use k256::PublicKey;
use serde_json::json;

use crate::client::{ProofStoreClient, Signer, StateProof};
use crate::codec::Sink;
use crate::events::{Notification, SmartContractEvent};
use crate::msg::{encode_keeper_key, keeper_digest, CrossStateValue, HubHeader, ADDRESS_SIZE};

// secp256k1 generator G and 2G, compressed.
const KEY_1: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
const KEY_2: &str = "02c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5";

/// A small fixed keeper set, in canonical order.
pub fn test_keys() -> Vec<PublicKey> {
    [KEY_1, KEY_2]
        .iter()
        .map(|hex_key| {
            PublicKey::from_sec1_bytes(&hex::decode(hex_key).unwrap()).unwrap()
        })
        .collect()
}

/// The digest encoding a destination chain stores for a keeper set.
pub fn keeper_encoding(keys: &[PublicKey]) -> Vec<u8> {
    let mut sink = Sink::new();
    sink.write_u64(keys.len() as u64);
    for key in keys {
        sink.write_var_bytes(&keeper_digest(key));
    }
    sink.into_bytes()
}

/// A consensus payload committing `keys` as the new peer set.
pub fn consensus_payload(keys: &[PublicKey]) -> Vec<u8> {
    let peers: Vec<_> = keys
        .iter()
        .enumerate()
        .map(|(index, key)| {
            json!({ "index": index as u32 + 1, "id": hex::encode(encode_keeper_key(key)) })
        })
        .collect();
    serde_json::to_vec(&json!({ "new_chain_config": { "peers": peers } })).unwrap()
}

/// One recorded `import_outer_transfer` call.
pub struct ImportRecord {
    pub chain_id: u64,
    pub value: Vec<u8>,
    pub proof_height: u32,
    pub proof: Vec<u8>,
}

/// Scripted hub node backed by in-memory maps.
#[derive(Default)]
pub struct MockNode {
    headers: Mutex<HashMap<u32, HubHeader>>,
    side_headers: Mutex<HashMap<(u64, u64), Vec<u8>>>,
    tx_heights: Mutex<HashMap<String, u32>>,
    proofs: Mutex<HashMap<(u32, String), String>>,
    merkle_proofs: Mutex<HashMap<(u32, u32), String>>,
    events_by_hash: Mutex<HashMap<String, SmartContractEvent>>,
    events_by_block: Mutex<HashMap<u32, Vec<SmartContractEvent>>>,
    latest: AtomicU64,

    synced: Mutex<Vec<(u64, Vec<Vec<u8>>)>>,
    sync_calls: AtomicU64,
    confirm_calls: AtomicU64,
    import_records: Mutex<Vec<ImportRecord>>,
    sync_failure: Mutex<Option<String>>,
    sync_failures_left: Mutex<Option<(String, usize)>>,
    import_failure: Mutex<Option<String>>,
}

impl MockNode {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_header(&self, height: u32, header: HubHeader) {
        self.headers.lock().unwrap().insert(height, header);
    }

    pub fn set_side_header(&self, chain_id: u64, height: u64, hash: Vec<u8>) {
        self.side_headers.lock().unwrap().insert((chain_id, height), hash);
    }

    pub fn set_tx_height(&self, hash: &str, height: u32) {
        self.tx_heights.lock().unwrap().insert(hash.to_string(), height);
    }

    pub fn set_proof(&self, height: u32, key: &str, value: &CrossStateValue) {
        let mut sink = Sink::new();
        sink.write_var_bytes(&value.encode());
        // one sibling hop, position byte then hash
        sink.write_byte(0);
        sink.write_bytes(&[0x11; 32]);
        self.proofs
            .lock()
            .unwrap()
            .insert((height, key.to_string()), hex::encode(sink.into_bytes()));
    }

    pub fn set_merkle_proof(&self, from: u32, to: u32, audit_path: &str) {
        self.merkle_proofs.lock().unwrap().insert((from, to), audit_path.to_string());
    }

    pub fn set_event(&self, hash: &str, event: SmartContractEvent) {
        self.events_by_hash.lock().unwrap().insert(hash.to_string(), event);
    }

    pub fn set_block_events(&self, height: u32, events: Vec<SmartContractEvent>) {
        self.events_by_block.lock().unwrap().insert(height, events);
    }

    pub fn set_latest(&self, height: u64) {
        self.latest.store(height, Ordering::SeqCst);
    }

    pub fn fail_sync_with(&self, message: &str) {
        *self.sync_failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_sync_times(&self, message: &str, times: usize) {
        *self.sync_failures_left.lock().unwrap() = Some((message.to_string(), times));
    }

    pub fn fail_import_with(&self, message: &str) {
        *self.import_failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn synced_batches(&self) -> Vec<(u64, Vec<Vec<u8>>)> {
        self.synced.lock().unwrap().clone()
    }

    pub fn sync_attempts(&self) -> usize {
        self.sync_calls.load(Ordering::SeqCst) as usize
    }

    pub fn confirmed(&self) -> usize {
        self.confirm_calls.load(Ordering::SeqCst) as usize
    }

    pub fn imports(&self) -> Vec<ImportRecord> {
        std::mem::take(&mut *self.import_records.lock().unwrap())
    }

    /// Header with `sigs` signatures and no scheduled rotation.
    pub fn plain_header(height: u32, sigs: usize) -> HubHeader {
        HubHeader {
            height,
            next_bookkeeper: [0; ADDRESS_SIZE],
            consensus_payload: Vec::new(),
            sig_data: vec![test_sig(); sigs],
        }
    }

    /// Header scheduling a rotation to the fixed test keeper set.
    pub fn rotating_header(height: u32, sigs: usize) -> HubHeader {
        Self::header_with_payload(height, consensus_payload(&test_keys()), sigs)
    }

    pub fn header_with_payload(height: u32, payload: Vec<u8>, sigs: usize) -> HubHeader {
        HubHeader {
            height,
            next_bookkeeper: [0x11; ADDRESS_SIZE],
            consensus_payload: payload,
            sig_data: vec![test_sig(); sigs],
        }
    }

    /// An execution event carrying one `makeProof` notification from the
    /// cross-chain manager.
    pub fn make_proof_event(
        hash: &str,
        src_chain_id: u64,
        dst_chain_id: u64,
        tx_id: &str,
        hub_height: u32,
        key: &str,
    ) -> SmartContractEvent {
        SmartContractEvent {
            tx_hash: hash.to_string(),
            state: 1,
            notify: vec![Notification {
                contract_address: crate::chain::CCM_ADDRESS.to_string(),
                states: json!(["makeProof", src_chain_id, dst_chain_id, tx_id, hub_height, key]),
            }],
        }
    }

    /// An execution event from some other contract.
    pub fn unrelated_event(hash: &str) -> SmartContractEvent {
        SmartContractEvent {
            tx_hash: hash.to_string(),
            state: 1,
            notify: vec![Notification {
                contract_address: "9900000000000000000000000000000000000000".to_string(),
                states: json!(["transfer", "from", "to", 5]),
            }],
        }
    }
}

fn test_sig() -> Vec<u8> {
    let mut sig = vec![0x22; 64];
    sig.push(0);
    sig
}

#[async_trait::async_trait]
impl ProofStoreClient for MockNode {
    async fn get_header_by_height(&self, height: u32) -> Result<HubHeader> {
        match self.headers.lock().unwrap().get(&height) {
            Some(header) => Ok(header.clone()),
            None => bail!("no header at height {height}"),
        }
    }

    async fn get_block_height_by_tx_hash(&self, hash: &str) -> Result<u32> {
        match self.tx_heights.lock().unwrap().get(hash) {
            Some(height) => Ok(*height),
            None => bail!("unknown transaction {hash}"),
        }
    }

    async fn get_side_chain_header(&self, chain_id: u64, height: u64) -> Result<Vec<u8>> {
        Ok(self
            .side_headers
            .lock()
            .unwrap()
            .get(&(chain_id, height))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_side_chain_height(&self, chain_id: u64) -> Result<u64> {
        let stored = self.side_headers.lock().unwrap();
        Ok(stored
            .keys()
            .filter(|(chain, _)| *chain == chain_id)
            .map(|(_, height)| *height)
            .max()
            .unwrap_or_default())
    }

    async fn get_cross_states_proof(&self, height: u32, key: &str) -> Result<StateProof> {
        match self.proofs.lock().unwrap().get(&(height, key.to_string())) {
            Some(path) => Ok(StateProof { audit_path: path.clone() }),
            None => bail!("no cross states proof for {key} at {height}"),
        }
    }

    async fn get_smart_contract_event(&self, hash: &str) -> Result<SmartContractEvent> {
        match self.events_by_hash.lock().unwrap().get(hash) {
            Some(event) => Ok(event.clone()),
            None => bail!("no event for {hash}"),
        }
    }

    async fn get_smart_contract_event_by_block(
        &self,
        height: u32,
    ) -> Result<Vec<SmartContractEvent>> {
        Ok(self.events_by_block.lock().unwrap().get(&height).cloned().unwrap_or_default())
    }

    async fn get_merkle_proof(&self, from: u32, to: u32) -> Result<StateProof> {
        match self.merkle_proofs.lock().unwrap().get(&(from, to)) {
            Some(path) => Ok(StateProof { audit_path: path.clone() }),
            None => bail!("no merkle proof from {from} to {to}"),
        }
    }

    async fn latest_height(&self) -> Result<u64> {
        Ok(self.latest.load(Ordering::SeqCst))
    }

    async fn sync_block_header(
        &self,
        chain_id: u64,
        _signer_address: &str,
        headers: &[Vec<u8>],
        _signer: &Signer,
    ) -> Result<String> {
        let call = self.sync_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.sync_failure.lock().unwrap().as_ref() {
            bail!("{message}");
        }
        {
            let mut scripted = self.sync_failures_left.lock().unwrap();
            if let Some((message, left)) = scripted.as_mut() {
                if *left > 0 {
                    *left -= 1;
                    bail!("{}", message.clone());
                }
            }
        }
        self.synced.lock().unwrap().push((chain_id, headers.to_vec()));
        Ok(format!("hubsync{call}"))
    }

    async fn import_outer_transfer(
        &self,
        chain_id: u64,
        value: &[u8],
        proof_height: u32,
        proof: &[u8],
        _beneficiary: &[u8],
        _extra: &[u8],
        _signer: &Signer,
    ) -> Result<String> {
        if let Some(message) = self.import_failure.lock().unwrap().as_ref() {
            bail!("{message}");
        }
        let mut records = self.import_records.lock().unwrap();
        records.push(ImportRecord {
            chain_id,
            value: value.to_vec(),
            proof_height,
            proof: proof.to_vec(),
        });
        Ok(format!("hubimport{}", records.len()))
    }

    async fn confirm(&self, _hash: &str, _min_confirmations: u32, _retries: u32) -> Result<()> {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
