//! Core library for the hub-chain relayer.
//!
//! Bridges a central consensus-maintaining hub chain with independent side
//! chains: side-chain headers are batched into the hub's header store with
//! fork-recovery rollback, and cross-chain transaction proofs emitted on the
//! hub are composed (Merkle path, anchor header across keeper epochs,
//! aggregated signatures) and cross-validated before they are trusted.

#![warn(clippy::nursery, clippy::pedantic, missing_docs)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod bus;
pub mod chain;
pub mod client;
pub mod codec;
pub mod events;
pub mod header_sync;
pub mod listener;
pub mod msg;
pub mod submitter;

#[cfg(test)]
pub(crate) mod testing;
