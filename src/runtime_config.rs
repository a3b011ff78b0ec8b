// =============================================================================
// Runtime Configuration - live settings with atomic save
// =============================================================================
//
// Everything the decision engine reads at evaluation time lives here. The
// scheduler snapshots a `DecisionConfig` from the live value on every cycle,
// so updates apply from the next evaluation without a restart.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::learning::lead_time::MAX_LEAD_SECS;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_instrument() -> String {
    "EURUSD".to_string()
}

fn default_interval_secs() -> u32 {
    60
}

fn default_confluence_threshold() -> u8 {
    2
}

fn default_lead_secs() -> u8 {
    1
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

// =============================================================================
// DecisionConfig
// =============================================================================

/// Immutable per-evaluation view of the settings the engine depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionConfig {
    pub instrument: String,
    pub interval_secs: u32,
    pub confluence_mode: bool,
    pub confluence_threshold: u8,
    pub guard_mode: bool,
    pub default_lead_secs: u8,
}

// =============================================================================
// RuntimeConfig
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Market selection ---------------------------------------------------

    /// Instrument the engine evaluates, e.g. `EURUSD` or `BTCUSD`.
    #[serde(default = "default_instrument")]
    pub instrument: String,

    /// Interval length in seconds; recommendations target its boundaries.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u32,

    // --- Decision gates -----------------------------------------------------

    /// Require technical confluence on top of the learned probability.
    #[serde(default = "default_true")]
    pub confluence_mode: bool,

    /// Minimum number of confluence checks (0..=4) that must pass.
    #[serde(default = "default_confluence_threshold")]
    pub confluence_threshold: u8,

    /// Halt recommendations after a losing streak.
    #[serde(default = "default_true")]
    pub guard_mode: bool,

    /// Entry lead used until the optimizer has enough samples.
    #[serde(default = "default_lead_secs")]
    pub default_lead_secs: u8,

    // --- Process ------------------------------------------------------------

    /// Directory holding the persisted learning documents.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Start the evaluation loop immediately on boot.
    #[serde(default)]
    pub autostart: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            instrument: default_instrument(),
            interval_secs: default_interval_secs(),
            confluence_mode: true,
            confluence_threshold: default_confluence_threshold(),
            guard_mode: true,
            default_lead_secs: default_lead_secs(),
            data_dir: default_data_dir(),
            bind_addr: default_bind_addr(),
            autostart: false,
        }
    }
}

/// Partial update accepted from the API. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default)]
    pub instrument: Option<String>,
    #[serde(default)]
    pub interval_secs: Option<u32>,
    #[serde(default)]
    pub confluence_mode: Option<bool>,
    #[serde(default)]
    pub confluence_threshold: Option<u8>,
    #[serde(default)]
    pub guard_mode: Option<bool>,
    #[serde(default)]
    pub default_lead_secs: Option<u8>,
}

impl RuntimeConfig {
    pub fn decision_config(&self) -> DecisionConfig {
        DecisionConfig {
            instrument: self.instrument.clone(),
            interval_secs: self.interval_secs,
            confluence_mode: self.confluence_mode,
            confluence_threshold: self.confluence_threshold,
            guard_mode: self.guard_mode,
            default_lead_secs: self.default_lead_secs,
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.instrument.trim().is_empty() {
            return Err(EngineError::InvalidInput("instrument must not be empty".into()));
        }
        if self.interval_secs == 0 {
            return Err(EngineError::InvalidInput("interval_secs must be positive".into()));
        }
        if self.confluence_threshold > 4 {
            return Err(EngineError::InvalidInput(format!(
                "confluence_threshold must be within 0..=4, got {}",
                self.confluence_threshold
            )));
        }
        if self.default_lead_secs > MAX_LEAD_SECS {
            return Err(EngineError::InvalidInput(format!(
                "default_lead_secs must be within 0..={MAX_LEAD_SECS}, got {}",
                self.default_lead_secs
            )));
        }
        Ok(())
    }

    /// Apply `update` if the result validates. Returns a description of each
    /// changed field; on error `self` is left untouched.
    pub fn apply(&mut self, update: ConfigUpdate) -> EngineResult<Vec<String>> {
        let mut next = self.clone();
        let mut changes = Vec::new();

        macro_rules! apply_field {
            ($field:ident) => {
                if let Some(val) = update.$field {
                    if next.$field != val {
                        changes.push(format!("{}: {:?} -> {:?}", stringify!($field), next.$field, val));
                        next.$field = val;
                    }
                }
            };
        }

        apply_field!(instrument);
        apply_field!(interval_secs);
        apply_field!(confluence_mode);
        apply_field!(confluence_threshold);
        apply_field!(guard_mode);
        apply_field!(default_lead_secs);

        next.instrument = next.instrument.trim().to_uppercase();
        next.validate()?;
        *self = next;
        Ok(changes)
    }

    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let mut config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;
        config.instrument = config.instrument.trim().to_uppercase();

        config
            .validate()
            .with_context(|| format!("invalid runtime config in {}", path.display()))?;

        info!(
            path = %path.display(),
            instrument = %config.instrument,
            interval_secs = config.interval_secs,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.instrument, "EURUSD");
        assert_eq!(cfg.interval_secs, 60);
        assert!(cfg.confluence_mode);
        assert_eq!(cfg.confluence_threshold, 2);
        assert!(cfg.guard_mode);
        assert_eq!(cfg.default_lead_secs, 1);
        assert!(!cfg.autostart);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.instrument, "EURUSD");
        assert!(cfg.guard_mode);
        assert_eq!(cfg.confluence_threshold, 2);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "instrument": "BTCUSD", "interval_secs": 30, "guard_mode": false }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.instrument, "BTCUSD");
        assert_eq!(cfg.interval_secs, 30);
        assert!(!cfg.guard_mode);
        assert!(cfg.confluence_mode);
    }

    #[test]
    fn decision_config_mirrors_live_values() {
        let mut cfg = RuntimeConfig::default();
        cfg.confluence_mode = false;
        cfg.default_lead_secs = 3;
        let dc = cfg.decision_config();
        assert!(!dc.confluence_mode);
        assert_eq!(dc.default_lead_secs, 3);
        assert_eq!(dc.instrument, "EURUSD");
    }

    #[test]
    fn apply_reports_changes() {
        let mut cfg = RuntimeConfig::default();
        let changes = cfg
            .apply(ConfigUpdate {
                instrument: Some(" ethusd ".into()),
                confluence_threshold: Some(3),
                guard_mode: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(cfg.instrument, "ETHUSD");
        assert_eq!(cfg.confluence_threshold, 3);
        // guard_mode was already on.
        assert_eq!(changes.len(), 2);
    }

    #[test]
    fn apply_rejects_invalid_values_atomically() {
        let mut cfg = RuntimeConfig::default();
        let err = cfg
            .apply(ConfigUpdate {
                confluence_threshold: Some(3),
                default_lead_secs: Some(4),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
        assert_eq!(cfg.confluence_threshold, 2);
        assert_eq!(cfg.default_lead_secs, 1);

        assert!(cfg
            .apply(ConfigUpdate {
                interval_secs: Some(0),
                ..Default::default()
            })
            .is_err());
    }

    #[test]
    fn save_then_load_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signal_config.json");
        let mut cfg = RuntimeConfig::default();
        cfg.instrument = "USDJPY".into();
        cfg.save(&path).unwrap();
        let loaded = RuntimeConfig::load(&path).unwrap();
        assert_eq!(loaded.instrument, "USDJPY");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn load_uppercases_instrument() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signal_config.json");
        std::fs::write(&path, r#"{ "instrument": " eurusd " }"#).unwrap();
        let loaded = RuntimeConfig::load(&path).unwrap();
        assert_eq!(loaded.instrument, "EURUSD");
        assert_eq!(loaded.decision_config().instrument, "EURUSD");
    }

    #[test]
    fn load_missing_file_is_error() {
        assert!(RuntimeConfig::load("/definitely/not/here.json").is_err());
    }
}
