//! Smart-contract event shapes and the `makeProof` notification schema.
//!
//! Hub-chain notifications carry positional, loosely-typed argument lists.
//! [`MakeProof::parse`] applies the strict schema check (arity, method tag,
//! per-state types) before any field is trusted, so a malformed notification
//! surfaces as a distinguishable decode error rather than a panic deeper in
//! the pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A smart-contract execution event as returned by a hub node.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SmartContractEvent {
    /// Hash of the transaction that produced the event.
    #[serde(rename = "TxHash")]
    pub tx_hash: String,
    /// Execution state flag.
    #[serde(rename = "State", default)]
    pub state: u8,
    /// Notifications emitted during execution.
    #[serde(rename = "Notify", default)]
    pub notify: Vec<Notification>,
}

/// A single contract notification inside an execution event.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Notification {
    /// Address of the emitting contract.
    #[serde(rename = "ContractAddress")]
    pub contract_address: String,
    /// Positional untyped states; shape depends on the contract.
    #[serde(rename = "States")]
    pub states: Value,
}

/// Errors raised while validating a notification against the `makeProof`
/// schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    /// The states field is not a positional list.
    #[error("notification states are not a positional list")]
    NotAList,
    /// Too few positional states.
    #[error("notification has {0} states, expected at least 6")]
    Arity(usize),
    /// The first state is not the `makeProof` method tag.
    #[error("notification is not a makeProof invocation")]
    WrongMethod,
    /// A state is present but has the wrong type.
    #[error("state {index} has unexpected type, expected {expected}")]
    BadState {
        /// Positional index of the offending state.
        index: usize,
        /// What the schema expects at that position.
        expected: &'static str,
    },
}

/// A validated `makeProof` notification from the cross-chain manager,
/// marking a transaction as eligible for relay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MakeProof {
    /// Originating side chain.
    pub src_chain_id: u64,
    /// Destination side chain.
    pub dst_chain_id: u64,
    /// Source-chain transaction identifier (hex, source-chain byte order).
    pub tx_id: String,
    /// Hub block height the proof was recorded at.
    pub hub_height: u32,
    /// State-proof lookup key for the cross-states endpoint.
    pub key: String,
}

impl MakeProof {
    /// Validate `states` against the `makeProof` schema and extract the
    /// typed fields.
    pub fn parse(states: &Value) -> Result<Self, NotificationError> {
        let list = states.as_array().ok_or(NotificationError::NotAList)?;
        if list.len() < 6 {
            return Err(NotificationError::Arity(list.len()));
        }
        let method = list[0]
            .as_str()
            .ok_or(NotificationError::BadState { index: 0, expected: "string" })?;
        if method != "makeProof" {
            return Err(NotificationError::WrongMethod);
        }

        Ok(Self {
            src_chain_id: state_u64(list, 1)?,
            dst_chain_id: state_u64(list, 2)?,
            tx_id: state_str(list, 3)?.to_string(),
            hub_height: u32::try_from(state_u64(list, 4)?)
                .map_err(|_| NotificationError::BadState { index: 4, expected: "u32 height" })?,
            key: state_str(list, 5)?.to_string(),
        })
    }
}

// Numeric states arrive as JSON numbers which some nodes emit as floats.
fn state_u64(list: &[Value], index: usize) -> Result<u64, NotificationError> {
    let err = NotificationError::BadState { index, expected: "number" };
    let value = &list[index];
    value.as_u64().map_or_else(
        || {
            let f = value.as_f64().ok_or(err.clone())?;
            if f.is_sign_negative() || f.fract() != 0.0 {
                return Err(err);
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            Ok(f as u64)
        },
        Ok,
    )
}

fn state_str(list: &[Value], index: usize) -> Result<&str, NotificationError> {
    list[index]
        .as_str()
        .ok_or(NotificationError::BadState { index, expected: "string" })
}
