//! Kernel configuration, loadable from TOML.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{KernelError, KernelResult};
use crate::types::ReconcilerConfig;

/// Top-level kernel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelConfig {
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    /// Path for the lineage ledger database; in-memory when unset.
    #[serde(default)]
    pub ledger_path: Option<PathBuf>,
    /// Bind address for the gateway.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8700".to_string()
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            reconciler: ReconcilerConfig::default(),
            ledger_path: None,
            bind_addr: default_bind_addr(),
        }
    }
}

impl KernelConfig {
    pub fn from_toml_str(content: &str) -> KernelResult<Self> {
        toml::from_str(content).map_err(|e| KernelError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> KernelResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| KernelError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = KernelConfig::from_toml_str("").unwrap();
        assert_eq!(config.reconciler.heartbeat_interval_seconds, 60);
        assert_eq!(config.reconciler.max_retry_budget, 3);
        assert_eq!(config.reconciler.cooldown_seconds, 300);
        assert_eq!(config.reconciler.circuit_breaker_threshold, 5);
        assert!(config.ledger_path.is_none());
        assert_eq!(config.bind_addr, "127.0.0.1:8700");
    }

    #[test]
    fn partial_toml_overrides_selected_fields() {
        let config = KernelConfig::from_toml_str(
            r#"
            bind_addr = "0.0.0.0:9000"

            [reconciler]
            heartbeat_interval_seconds = 5
            cooldown_seconds = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.reconciler.heartbeat_interval_seconds, 5);
        assert_eq!(config.reconciler.cooldown_seconds, 30);
        // Untouched knobs keep their defaults.
        assert_eq!(config.reconciler.max_retry_budget, 3);
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        assert!(matches!(
            KernelConfig::from_toml_str("reconciler = 3"),
            Err(KernelError::Config(_))
        ));
    }
}
