//! Relay message aggregates, error taxonomy and wire encodings.

use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::PublicKey;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use thiserror::Error;

use crate::codec::{CodecError, Sink, Source};

/// Byte length of a hub account address.
pub const ADDRESS_SIZE: usize = 20;

/// A side-chain header as produced by the upstream side-chain listener.
#[derive(Clone, Debug)]
pub struct HeaderRecord {
    /// Side-chain block height.
    pub height: u64,
    /// Serialized header bytes, opaque to the relayer.
    pub data: Vec<u8>,
    /// Header hash, used for the idempotent existence check.
    pub hash: Vec<u8>,
}

/// A hub-chain block header, as returned by a hub node.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HubHeader {
    /// Block height.
    pub height: u32,
    /// Bookkeeper address taking over at the next block; all zero when no
    /// rotation is scheduled.
    pub next_bookkeeper: [u8; ADDRESS_SIZE],
    /// JSON consensus metadata; decodes to [`ConsensusInfo`].
    pub consensus_payload: Vec<u8>,
    /// Keeper signatures over this header, in keeper order.
    pub sig_data: Vec<Vec<u8>>,
}

impl HubHeader {
    /// Whether a bookkeeper rotation is scheduled after this block.
    #[must_use]
    pub fn has_next_bookkeeper(&self) -> bool {
        self.next_bookkeeper != [0u8; ADDRESS_SIZE]
    }
}

/// Consensus metadata embedded in a hub header.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ConsensusInfo {
    /// Present when this block commits a new validator configuration.
    #[serde(default)]
    pub new_chain_config: Option<ChainConfigInfo>,
}

/// A committed validator configuration.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChainConfigInfo {
    /// The new peer set.
    #[serde(default)]
    pub peers: Vec<PeerInfo>,
}

/// One consensus peer entry.
#[derive(Clone, Debug, Deserialize)]
pub struct PeerInfo {
    /// Consensus index of the peer.
    pub index: u32,
    /// Hex SEC1-encoded secp256k1 public key.
    pub id: String,
}

/// Where a transaction record originated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TxType {
    /// Created by an inbound side-chain listener; awaiting hub import.
    #[default]
    Src,
    /// Discovered on the hub; awaiting proof composition and relay out.
    Hub,
}

/// The transaction record carried through the relay pipeline.
///
/// Mutated in place as each stage resolves more of its fields; discarded
/// after successful submission or requeued with `attempts` incremented.
#[derive(Clone, Debug, Default)]
pub struct Tx {
    /// Originating side chain.
    pub src_chain_id: u64,
    /// Source-chain transaction hash (hex).
    pub src_hash: String,
    /// Source-chain block height of the transaction.
    pub src_height: u64,
    /// Side-chain height the source proof was taken at.
    pub src_proof_height: u64,
    /// Hex-encoded source event payload.
    pub src_event: String,
    /// Hex-encoded source Merkle path.
    pub src_proof: String,

    /// Hub confirmation transaction hash (hex).
    pub hub_hash: String,
    /// Hub block height of the confirmation.
    pub hub_height: u32,
    /// State-proof lookup key on the hub, when already known.
    pub hub_key: String,
    /// Header at `hub_height + 1`, whose signatures attest the confirmation.
    pub hub_header: Option<HubHeader>,
    /// Anchor header past a keeper-epoch boundary, when one was required.
    pub anchor_header: Option<HubHeader>,
    /// Hex audit path linking `hub_height + 1` to the anchor header.
    pub anchor_proof: String,
    /// Decoded cross-chain parameter.
    pub merkle_value: Option<CrossStateValue>,
    /// Raw audit path for the cross-chain state.
    pub audit_path: Vec<u8>,

    /// Destination side chain.
    pub dst_chain_id: u64,
    /// Expected destination proxy contract (hex).
    pub dst_proxy: String,
    /// Start height of the keeper epoch the destination chain trusts.
    pub dst_hub_epoch_start_height: u32,
    /// Keeper-set encoding the destination chain currently expects.
    pub dst_hub_keepers: Vec<u8>,
    /// Aggregated signatures in the destination chain's encoding.
    pub dst_sigs: Vec<u8>,

    /// Submission attempts so far.
    pub attempts: u32,
    /// Record origin.
    pub tx_type: TxType,
    /// Source transaction identifier, normalized to hub byte order.
    pub tx_id: String,
}

/// The cross-chain state value proven by an audit path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrossStateValue {
    /// Hub transaction hash the value was recorded under.
    pub tx_hash: Vec<u8>,
    /// Originating chain id.
    pub from_chain_id: u64,
    /// The cross-chain transfer parameter, when present.
    pub transfer: Option<CrossTransfer>,
}

/// The cross-chain transfer parameter embedded in a state value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrossTransfer {
    /// Source transaction hash.
    pub tx_hash: Vec<u8>,
    /// Cross-chain sequence identifier.
    pub cross_chain_id: Vec<u8>,
    /// Source proxy contract.
    pub from_contract: Vec<u8>,
    /// Destination chain id.
    pub to_chain_id: u64,
    /// Destination contract address.
    pub to_contract: Vec<u8>,
    /// Invoked destination method.
    pub method: String,
    /// Method arguments, opaque here.
    pub args: Vec<u8>,
}

impl CrossStateValue {
    /// Decode a state value from audit-path leaf bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut source = Source::new(bytes);
        let tx_hash = source.read_var_bytes()?.to_vec();
        let from_chain_id = source.read_u64()?;
        let transfer = if source.remaining() == 0 {
            None
        } else {
            Some(CrossTransfer::decode(&mut source)?)
        };
        Ok(Self { tx_hash, from_chain_id, transfer })
    }

    /// Encode back to leaf bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut sink = Sink::new();
        sink.write_var_bytes(&self.tx_hash);
        sink.write_u64(self.from_chain_id);
        if let Some(transfer) = &self.transfer {
            transfer.encode(&mut sink);
        }
        sink.into_bytes()
    }
}

impl CrossTransfer {
    fn decode(source: &mut Source<'_>) -> Result<Self, CodecError> {
        let tx_hash = source.read_var_bytes()?.to_vec();
        let cross_chain_id = source.read_var_bytes()?.to_vec();
        let from_contract = source.read_var_bytes()?.to_vec();
        let to_chain_id = source.read_u64()?;
        let to_contract = source.read_var_bytes()?.to_vec();
        let method = String::from_utf8(source.read_var_bytes()?.to_vec())
            .map_err(|e| CodecError::InvalidString(e.to_string()))?;
        let args = source.read_var_bytes()?.to_vec();
        Ok(Self { tx_hash, cross_chain_id, from_contract, to_chain_id, to_contract, method, args })
    }

    fn encode(&self, sink: &mut Sink) {
        sink.write_var_bytes(&self.tx_hash);
        sink.write_var_bytes(&self.cross_chain_id);
        sink.write_var_bytes(&self.from_contract);
        sink.write_u64(self.to_chain_id);
        sink.write_var_bytes(&self.to_contract);
        sink.write_var_bytes(self.method.as_bytes());
        sink.write_var_bytes(&self.args);
    }
}

/// Relay error taxonomy.
///
/// Callers branch on the variant, never on message text; the one sanctioned
/// string match lives in [`is_fork_error`].
#[derive(Debug, Error)]
pub enum RelayError {
    /// The cross-chain parameter is missing, undecodable, or its method is
    /// not allow-listed. Non-retryable; filter or discard.
    #[error("invalid transaction: {detail} (src chain {src_chain_id}, hub tx {hub_hash})")]
    InvalidTx {
        /// Originating side chain.
        src_chain_id: u64,
        /// Hub confirmation hash.
        hub_hash: String,
        /// Diagnostic detail, including the attempted method when known.
        detail: String,
    },
    /// No derivable proof from any available node; data may simply not be
    /// available yet. A candidate for later retry by the caller.
    #[error("transaction proof missing")]
    ProofMissing,
    /// An independently re-derived proof disagrees with the claimed
    /// transaction. Security-relevant; must never be swallowed.
    #[error("transaction violation: {0}")]
    Violation(String),
    /// Required input missing or undecodable, with field-level context.
    #[error("malformed {field}: {detail}")]
    Malformed {
        /// The offending field.
        field: &'static str,
        /// What was wrong with it.
        detail: String,
    },
    /// Transient failure; retried per component policy.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Whether a header-submission error indicates a side-chain fork.
///
/// The hub's import surface reports fork conditions only as message text, so
/// this is the single place the relayer matches on error strings.
#[must_use]
pub fn is_fork_error(message: &str) -> bool {
    message.contains("parent header not exist") || message.contains("missing required field")
}

/// Lowercase a hex string and strip any `0x` prefix.
#[must_use]
pub fn lower_hex(s: &str) -> String {
    s.trim_start_matches("0x").trim_start_matches("0X").to_lowercase()
}

/// Reverse the byte order of a hex string. Returns the input unchanged when
/// it is not valid hex.
#[must_use]
pub fn reverse_hex(s: &str) -> String {
    hex::decode(lower_hex(s)).map_or_else(
        |_| s.to_string(),
        |mut bytes| {
            bytes.reverse();
            hex::encode(bytes)
        },
    )
}

/// The relayer's native record of a keeper key: uncompressed SEC1 bytes.
#[must_use]
pub fn encode_keeper_key(key: &PublicKey) -> Vec<u8> {
    key.to_encoded_point(false).as_bytes().to_vec()
}

/// Address-style digest of a keeper key: the trailing 20 bytes of
/// Keccak-256 over the uncompressed encoding without its prefix byte.
#[must_use]
pub fn keeper_digest(key: &PublicKey) -> [u8; ADDRESS_SIZE] {
    let uncompressed = key.to_encoded_point(false);
    let hash = Keccak256::digest(&uncompressed.as_bytes()[1..]);
    let mut out = [0u8; ADDRESS_SIZE];
    out.copy_from_slice(&hash[12..]);
    out
}

/// Convert a keeper header signature to the destination chain's encoding.
///
/// Header signatures are 65-byte `r ‖ s ‖ v` with `v ∈ {0, 1}`; destination
/// chains expect `v` offset by 27.
pub fn convert_sig_to_dst(sig: &[u8]) -> Result<Vec<u8>, RelayError> {
    if sig.len() != 65 {
        return Err(RelayError::Malformed {
            field: "sig_data",
            detail: format!("expected 65-byte recoverable signature, got {}", sig.len()),
        });
    }
    let mut out = sig.to_vec();
    out[64] = out[64].wrapping_add(27);
    Ok(out)
}
