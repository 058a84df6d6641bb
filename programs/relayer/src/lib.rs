//! Command line entrypoint for the hub-chain relayer.

#![warn(clippy::nursery, clippy::pedantic, missing_docs)]

pub mod cli;
pub mod observability;
