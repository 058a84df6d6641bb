//! Configuration parsing and module wiring for the hub-chain relayer.
//!
//! The host process supplies the runtime capabilities (hub node clients, a
//! transaction queue and a signer); this crate turns a parsed configuration
//! into running header-sync engines, a submitter worker pool and a hub
//! listener, and tears them down again on shutdown.

#![warn(clippy::nursery, clippy::pedantic, missing_docs)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod config;
pub mod relayer;

pub use config::{parse_config, RelayerConfig};
pub use relayer::{Relayer, RelayerHandles};
