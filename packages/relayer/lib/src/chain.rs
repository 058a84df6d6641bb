//! Chain identifier registry.
//!
//! Chain ids are assigned by the hub's side-chain governance and are stable
//! across deployments; only the handful this crate needs to special-case are
//! named here.

/// Chain id of the hub chain itself.
pub const HUB: u64 = 0;
/// Ontology.
pub const ONT: u64 = 3;
/// Neo legacy.
pub const NEO: u64 = 4;
/// Neo N3.
pub const NEO3: u64 = 14;

/// Address of the hub's native cross-chain manager contract, as it appears in
/// smart-contract event notifications.
pub const CCM_ADDRESS: &str = "0300000000000000000000000000000000000000";

/// Human-readable chain name for logging.
#[must_use]
pub const fn name(chain_id: u64) -> &'static str {
    match chain_id {
        HUB => "hub",
        ONT => "ontology",
        NEO => "neo",
        NEO3 => "neo3",
        _ => "unknown",
    }
}

/// Whether a chain records transaction identifiers in reversed byte order
/// relative to the hub's convention.
#[must_use]
pub const fn uses_reversed_tx_id(chain_id: u64) -> bool {
    matches!(chain_id, ONT | NEO | NEO3)
}
