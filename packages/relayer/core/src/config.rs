//! Relayer configuration.
//!
//! Parsed from JSON with path-aware errors, so a mistyped field deep in a
//! section is reported with its full location instead of a bare type error.

use std::time::Duration;

use anyhow::{bail, Result};
use serde::Deserialize;

use hub_relayer_lib::chain;
use hub_relayer_lib::header_sync::HeaderSyncConfig;
use hub_relayer_lib::listener::ListenerConfig;
use hub_relayer_lib::submitter::{default_allow_methods, SubmitterConfig};

/// Top-level relayer configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayerConfig {
    /// One section per side chain whose headers are synced to the hub.
    #[serde(default)]
    pub header_sync: Vec<HeaderSyncSection>,
    /// Submitter worker pool section.
    #[serde(default)]
    pub submitter: Option<SubmitterSection>,
    /// Hub listener section.
    #[serde(default)]
    pub listener: Option<ListenerSection>,
}

/// Header sync settings for one side chain.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderSyncSection {
    /// The side chain's id; must be nonzero.
    pub chain_id: u64,
    /// Headers per flush; `1` (the default) selects single mode.
    #[serde(default)]
    pub batch: usize,
    /// Header channel capacity; defaults to twice the batch size.
    #[serde(default)]
    pub buffer: usize,
    /// Batch flush timeout in seconds.
    #[serde(default)]
    pub timeout_secs: u64,
    /// Whether this section is active.
    #[serde(default = "enabled")]
    pub enabled: bool,
}

/// Submitter worker pool settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitterSection {
    /// Number of worker tasks.
    #[serde(default = "default_procs")]
    pub procs: usize,
    /// Cross-chain methods accepted during proof composition; defaults to
    /// the built-in allow-list.
    #[serde(default)]
    pub allow_methods: Vec<String>,
    /// Cross-chain manager address override.
    #[serde(default)]
    pub ccm_address: Option<String>,
    /// Whether this section is active.
    #[serde(default = "enabled")]
    pub enabled: bool,
}

/// Hub listener settings.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenerSection {
    /// Cross-chain manager address override.
    #[serde(default)]
    pub ccm_address: Option<String>,
    /// Scan poll interval in seconds.
    #[serde(default)]
    pub listen_check: u64,
    /// Whether this section is active.
    #[serde(default = "enabled")]
    pub enabled: bool,
}

const fn enabled() -> bool {
    true
}

const fn default_procs() -> usize {
    1
}

impl HeaderSyncSection {
    /// Build the engine configuration for this section.
    #[must_use]
    pub const fn to_sync_config(&self) -> HeaderSyncConfig {
        HeaderSyncConfig {
            chain_id: self.chain_id,
            batch: self.batch,
            buffer: self.buffer,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

impl SubmitterSection {
    /// Build the submitter configuration for this section.
    #[must_use]
    pub fn to_submitter_config(&self) -> SubmitterConfig {
        let allow_methods = if self.allow_methods.is_empty() {
            default_allow_methods()
        } else {
            self.allow_methods.iter().cloned().collect()
        };
        SubmitterConfig {
            chain_id: chain::HUB,
            procs: self.procs,
            allow_methods,
            ccm_address: self
                .ccm_address
                .clone()
                .unwrap_or_else(|| chain::CCM_ADDRESS.to_string()),
        }
    }
}

impl ListenerSection {
    /// Build the listener configuration for this section.
    #[must_use]
    pub fn to_listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            ccm_address: self
                .ccm_address
                .clone()
                .unwrap_or_else(|| chain::CCM_ADDRESS.to_string()),
            listen_check: self.listen_check,
        }
    }
}

impl RelayerConfig {
    /// Semantic checks beyond what deserialization enforces.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for section in &self.header_sync {
            if section.chain_id == chain::HUB {
                bail!("header_sync chain_id must be a side chain, got the hub id");
            }
            if !seen.insert(section.chain_id) {
                bail!("duplicate header_sync section for chain {}", section.chain_id);
            }
        }
        if let Some(submitter) = &self.submitter {
            if submitter.enabled && submitter.procs == 0 {
                bail!("submitter.procs must be at least 1");
            }
            if submitter.allow_methods.iter().any(String::is_empty) {
                bail!("submitter.allow_methods entries must be non-empty");
            }
        }
        Ok(())
    }
}

/// Parse and validate a JSON relayer configuration.
pub fn parse_config(contents: &str) -> Result<RelayerConfig> {
    let deserializer = &mut serde_json::Deserializer::from_str(contents);
    let config: RelayerConfig = serde_path_to_error::deserialize(deserializer)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_minimal_config() {
        let config = parse_config("{}").unwrap();
        assert!(config.header_sync.is_empty());
        assert!(config.submitter.is_none());
        assert!(config.listener.is_none());
    }

    #[test]
    fn parses_full_config_with_defaults() {
        let raw = json!({
            "header_sync": [{ "chain_id": 2, "batch": 20 }],
            "submitter": { "procs": 4 },
            "listener": {}
        })
        .to_string();
        let config = parse_config(&raw).unwrap();

        let sync = config.header_sync[0].to_sync_config();
        assert_eq!(sync.chain_id, 2);
        assert_eq!(sync.batch, 20);
        assert_eq!(sync.buffer, 0);
        assert!(config.header_sync[0].enabled);

        let submitter = config.submitter.unwrap().to_submitter_config();
        assert_eq!(submitter.procs, 4);
        assert!(submitter.allow_methods.contains("unlock"));
        assert_eq!(submitter.ccm_address, chain::CCM_ADDRESS);

        let listener = config.listener.unwrap().to_listener_config();
        assert_eq!(listener.ccm_address, chain::CCM_ADDRESS);
    }

    #[test]
    fn error_points_at_offending_path() {
        let raw = json!({
            "header_sync": [{ "chain_id": "two" }]
        })
        .to_string();
        let err = parse_config(&raw).unwrap_err().to_string();
        assert!(err.contains("header_sync[0].chain_id"), "unexpected error: {err}");
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(parse_config(r#"{ "header_scan": [] }"#).is_err());
    }

    #[test]
    fn rejects_hub_chain_header_sync() {
        let raw = json!({ "header_sync": [{ "chain_id": 0 }] }).to_string();
        assert!(parse_config(&raw).is_err());
    }

    #[test]
    fn rejects_duplicate_header_sync_sections() {
        let raw = json!({
            "header_sync": [{ "chain_id": 2 }, { "chain_id": 2 }]
        })
        .to_string();
        assert!(parse_config(&raw).is_err());
    }

    #[test]
    fn rejects_zero_submitter_procs() {
        let raw = json!({ "submitter": { "procs": 0 } }).to_string();
        assert!(parse_config(&raw).is_err());
    }
}
