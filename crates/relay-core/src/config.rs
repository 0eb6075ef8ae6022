//! Runtime configuration snapshot
//!
//! Configuration is stored as key/value rows (see `relay-store`) and parsed
//! into an immutable [`RelayConfig`] snapshot. Updates rebuild the snapshot
//! and swap it atomically so concurrent readers always see a consistent view.

use std::collections::HashMap;

use crate::error::{ProxyError, ProxyResult};

/// Recognized configuration keys.
pub mod keys {
    pub const TARGET_CSMS_URL: &str = "targetCsmsUrl";
    pub const CSMS_FORWARDING_ENABLED: &str = "csmsForwardingEnabled";
    pub const AUTO_CHARGE_ENABLED: &str = "autoChargeEnabled";
    pub const DEFAULT_ID_TAG: &str = "defaultIdTag";
    pub const RECONNECT_MAX_ATTEMPTS: &str = "reconnectMaxAttempts";
    pub const RECONNECT_BASE_DELAY_MS: &str = "reconnectBaseDelayMs";
    pub const CONNECT_TIMEOUT_MS: &str = "connectTimeoutMs";

    pub const ALL: &[&str] = &[
        TARGET_CSMS_URL,
        CSMS_FORWARDING_ENABLED,
        AUTO_CHARGE_ENABLED,
        DEFAULT_ID_TAG,
        RECONNECT_MAX_ATTEMPTS,
        RECONNECT_BASE_DELAY_MS,
        CONNECT_TIMEOUT_MS,
    ];
}

/// Immutable snapshot of the relay's runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// WebSocket base URL of the upstream CSMS.
    pub target_csms_url: String,
    /// When false, sessions operate in standalone mode and no upstream
    /// connect is attempted.
    pub csms_forwarding_enabled: bool,
    /// Gates standalone auto-authorization and auto-start.
    pub auto_charge_enabled: bool,
    /// idTag used for auto-started transactions.
    pub default_id_tag: String,
    /// Upstream reconnect attempt cap.
    pub reconnect_max_attempts: u32,
    /// Base delay before reconnect attempt k is `base * 2^(k-1)`.
    pub reconnect_base_delay_ms: u64,
    /// Upstream connect timeout; a timeout feeds the retry policy.
    pub connect_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            target_csms_url: "ws://localhost:9000".to_string(),
            csms_forwarding_enabled: true,
            auto_charge_enabled: false,
            default_id_tag: "ADMIN_TAG".to_string(),
            reconnect_max_attempts: 3,
            reconnect_base_delay_ms: 1000,
            connect_timeout_ms: 10_000,
        }
    }
}

impl RelayConfig {
    /// Build a snapshot from stored key/value rows, falling back to defaults
    /// for missing keys. Invalid stored values are rejected the same way a
    /// live update would be.
    pub fn from_entries(entries: &HashMap<String, String>) -> ProxyResult<Self> {
        let mut config = Self::default();
        for (key, value) in entries {
            config.apply(key, value)?;
        }
        Ok(config)
    }

    /// Apply a single key update, validating the value.
    pub fn apply(&mut self, key: &str, value: &str) -> ProxyResult<()> {
        match key {
            keys::TARGET_CSMS_URL => {
                if !value.starts_with("ws://") && !value.starts_with("wss://") {
                    return Err(ProxyError::Validation(format!(
                        "{} must be a ws:// or wss:// URL, got '{value}'",
                        keys::TARGET_CSMS_URL
                    )));
                }
                self.target_csms_url = value.to_string();
            }
            keys::CSMS_FORWARDING_ENABLED => {
                self.csms_forwarding_enabled = parse_bool(key, value)?;
            }
            keys::AUTO_CHARGE_ENABLED => {
                self.auto_charge_enabled = parse_bool(key, value)?;
            }
            keys::DEFAULT_ID_TAG => {
                if value.is_empty() {
                    return Err(ProxyError::Validation(format!(
                        "{} must not be empty",
                        keys::DEFAULT_ID_TAG
                    )));
                }
                self.default_id_tag = value.to_string();
            }
            keys::RECONNECT_MAX_ATTEMPTS => {
                self.reconnect_max_attempts = parse_number(key, value)?;
            }
            keys::RECONNECT_BASE_DELAY_MS => {
                self.reconnect_base_delay_ms = parse_number(key, value)?;
            }
            keys::CONNECT_TIMEOUT_MS => {
                self.connect_timeout_ms = parse_number(key, value)?;
            }
            other => {
                return Err(ProxyError::Validation(format!(
                    "unrecognized configuration key '{other}'"
                )));
            }
        }
        Ok(())
    }

    /// The snapshot as key/value rows, for the control surface and the store.
    pub fn entries(&self) -> Vec<(String, String)> {
        vec![
            (keys::TARGET_CSMS_URL.into(), self.target_csms_url.clone()),
            (
                keys::CSMS_FORWARDING_ENABLED.into(),
                self.csms_forwarding_enabled.to_string(),
            ),
            (
                keys::AUTO_CHARGE_ENABLED.into(),
                self.auto_charge_enabled.to_string(),
            ),
            (keys::DEFAULT_ID_TAG.into(), self.default_id_tag.clone()),
            (
                keys::RECONNECT_MAX_ATTEMPTS.into(),
                self.reconnect_max_attempts.to_string(),
            ),
            (
                keys::RECONNECT_BASE_DELAY_MS.into(),
                self.reconnect_base_delay_ms.to_string(),
            ),
            (
                keys::CONNECT_TIMEOUT_MS.into(),
                self.connect_timeout_ms.to_string(),
            ),
        ]
    }

    /// Upstream URL for a charge point: the base URL with the id appended,
    /// inserting a `/` if the base lacks one.
    pub fn upstream_url(&self, charge_point_id: &str) -> String {
        let base = &self.target_csms_url;
        if base.ends_with('/') {
            format!("{base}{charge_point_id}")
        } else {
            format!("{base}/{charge_point_id}")
        }
    }
}

fn parse_bool(key: &str, value: &str) -> ProxyResult<bool> {
    value
        .parse()
        .map_err(|_| ProxyError::Validation(format!("{key} must be 'true' or 'false', got '{value}'")))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> ProxyResult<T> {
    value
        .parse()
        .map_err(|_| ProxyError::Validation(format!("{key} must be a number, got '{value}'")))
}
