//! Scheduler configuration loading.
//!
//! Every key is optional; missing values fall back to the defaults listed
//! below.  The expected YAML structure is:
//! ```yaml
//! time_base:
//!   tick_rate_khz: 69120
//!   frame_duration_us: 10000
//!   slots_per_frame: 24
//!   subslots_per_slot: 2
//! dispatch:
//!   scheduling_margin_us: 500
//!   look_ahead_window_ms: 1000
//!   max_ops_per_tick: 6
//!   budget_retry_delay_ms: 10
//!   insert_batch_delay_ms: 5
//!   inbox_capacity: 300
//!   max_payload_len: 700
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::time::{
    DEFAULT_FRAME_DURATION_US, DEFAULT_SLOTS_PER_FRAME, DEFAULT_SUBSLOTS_PER_SLOT,
    DEFAULT_TICK_RATE_KHZ,
};

// ── Time base section ─────────────────────────────────────────────────────────

/// Frame geometry of the radio timeline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimeBaseConfig {
    /// Rate of the radio tick counter in kHz.
    pub tick_rate_khz: u64,
    /// Duration of one radio frame in microseconds.
    pub frame_duration_us: u64,
    pub slots_per_frame: u64,
    pub subslots_per_slot: u64,
}

impl Default for TimeBaseConfig {
    fn default() -> Self {
        Self {
            tick_rate_khz: DEFAULT_TICK_RATE_KHZ,
            frame_duration_us: DEFAULT_FRAME_DURATION_US,
            slots_per_frame: DEFAULT_SLOTS_PER_FRAME,
            subslots_per_slot: DEFAULT_SUBSLOTS_PER_SLOT,
        }
    }
}

// ── Dispatch section ──────────────────────────────────────────────────────────

/// Tuning of the dispatch loop and its inbox.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Safety margin added to every operation's end time, covering the time
    /// the radio needs between two consecutive operations.
    pub scheduling_margin_us: u64,

    /// Operations whose frame starts further away than this are not handed to
    /// the radio yet.
    pub look_ahead_window_ms: u64,

    /// Submission budget of a single tick.
    pub max_ops_per_tick: u32,

    /// Timer delay used when the per-tick budget ran out.
    pub budget_retry_delay_ms: u64,

    /// Timer delay used after inserting into a non-empty queue so that
    /// near-simultaneous insertions are scanned together.
    pub insert_batch_delay_ms: u64,

    /// Depth of the Event Intake channel.
    pub inbox_capacity: usize,

    /// Maximum Transmit payload size in bytes.
    pub max_payload_len: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            scheduling_margin_us: 500,
            look_ahead_window_ms: 1_000,
            max_ops_per_tick: 6,
            budget_retry_delay_ms: 10,
            insert_batch_delay_ms: 5,
            inbox_capacity: 300,
            max_payload_len: 700,
        }
    }
}

impl DispatchConfig {
    pub fn budget_retry_delay(&self) -> Duration {
        Duration::from_millis(self.budget_retry_delay_ms)
    }

    pub fn insert_batch_delay(&self) -> Duration {
        Duration::from_millis(self.insert_batch_delay_ms)
    }

    /// Re-arm delay when the queue head is beyond the look-ahead window.
    pub fn look_ahead_recheck_delay(&self) -> Duration {
        Duration::from_millis((self.look_ahead_window_ms / 5).max(1))
    }
}

// ── SchedulerConfig ───────────────────────────────────────────────────────────

/// Complete scheduler configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub time_base: TimeBaseConfig,
    pub dispatch: DispatchConfig,
}

impl SchedulerConfig {
    /// Parses and validates `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, the YAML is
    /// structurally invalid, or a value fails [`validate`](Self::validate).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading scheduler configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let cfg = Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid configuration file: {}", path.display()))?;

        info!(
            tick_rate_khz = cfg.time_base.tick_rate_khz,
            frame_us = cfg.time_base.frame_duration_us,
            window_ms = cfg.dispatch.look_ahead_window_ms,
            max_ops = cfg.dispatch.max_ops_per_tick,
            "Scheduler configuration loaded"
        );
        Ok(cfg)
    }

    /// Parses and validates a YAML document.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let cfg: SchedulerConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML")?;
        debug!(?cfg, "parsed scheduler configuration");
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects values the scheduler cannot operate with.
    pub fn validate(&self) -> Result<()> {
        let tb = &self.time_base;
        if tb.tick_rate_khz == 0 {
            bail!("time_base.tick_rate_khz must be non-zero");
        }
        if tb.frame_duration_us == 0 {
            bail!("time_base.frame_duration_us must be non-zero");
        }
        if tb.slots_per_frame == 0 || tb.subslots_per_slot == 0 {
            bail!(
                "time_base slot geometry must be non-zero (slots_per_frame={}, subslots_per_slot={})",
                tb.slots_per_frame,
                tb.subslots_per_slot
            );
        }
        let d = &self.dispatch;
        if d.max_ops_per_tick == 0 {
            bail!("dispatch.max_ops_per_tick must be at least 1");
        }
        if d.inbox_capacity == 0 {
            bail!("dispatch.inbox_capacity must be at least 1");
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper: write a YAML string to a temp file and return it.
    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = SchedulerConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.time_base.tick_rate_khz, 69_120);
        assert_eq!(cfg.dispatch.max_ops_per_tick, 6);
        assert_eq!(cfg.dispatch.look_ahead_window_ms, 1_000);
    }

    #[test]
    fn load_full_yaml() {
        let yaml = r#"
time_base:
  tick_rate_khz: 1000
  frame_duration_us: 10000
  slots_per_frame: 10
  subslots_per_slot: 4
dispatch:
  scheduling_margin_us: 100
  look_ahead_window_ms: 50
  max_ops_per_tick: 3
  budget_retry_delay_ms: 2
  insert_batch_delay_ms: 1
  inbox_capacity: 16
  max_payload_len: 128
"#;
        let f = yaml_tempfile(yaml);
        let cfg = SchedulerConfig::load_from_file(f.path()).unwrap();

        assert_eq!(cfg.time_base.tick_rate_khz, 1_000);
        assert_eq!(cfg.time_base.slots_per_frame, 10);
        assert_eq!(cfg.time_base.subslots_per_slot, 4);
        assert_eq!(cfg.dispatch.scheduling_margin_us, 100);
        assert_eq!(cfg.dispatch.look_ahead_window_ms, 50);
        assert_eq!(cfg.dispatch.max_ops_per_tick, 3);
        assert_eq!(cfg.dispatch.inbox_capacity, 16);
        assert_eq!(cfg.dispatch.max_payload_len, 128);
        assert_eq!(cfg.dispatch.budget_retry_delay(), Duration::from_millis(2));
    }

    #[test]
    fn partial_yaml_uses_defaults() {
        let yaml = "dispatch:\n  max_ops_per_tick: 2\n";
        let f = yaml_tempfile(yaml);
        let cfg = SchedulerConfig::load_from_file(f.path()).unwrap();

        assert_eq!(cfg.dispatch.max_ops_per_tick, 2);
        assert_eq!(cfg.dispatch.inbox_capacity, 300); // default
        assert_eq!(cfg.time_base, TimeBaseConfig::default());
    }

    #[test]
    fn empty_document_is_all_defaults() {
        let cfg = SchedulerConfig::from_yaml_str("{}").unwrap();
        assert_eq!(cfg, SchedulerConfig::default());
    }

    #[test]
    fn missing_file_returns_error() {
        let result = SchedulerConfig::load_from_file(Path::new("/nonexistent/path/sched.yaml"));
        assert!(result.is_err());
    }

    #[test]
    fn malformed_yaml_returns_error() {
        let f = yaml_tempfile("this is: not: valid: yaml: content:::");
        assert!(SchedulerConfig::load_from_file(f.path()).is_err());
    }

    #[test]
    fn zero_tick_rate_is_rejected() {
        let err = SchedulerConfig::from_yaml_str("time_base:\n  tick_rate_khz: 0\n").unwrap_err();
        assert!(format!("{err:#}").contains("tick_rate_khz"));
    }

    #[test]
    fn zero_budget_is_rejected() {
        assert!(SchedulerConfig::from_yaml_str("dispatch:\n  max_ops_per_tick: 0\n").is_err());
    }

    #[test]
    fn look_ahead_recheck_is_a_fifth_of_window() {
        let d = DispatchConfig {
            look_ahead_window_ms: 1_000,
            ..Default::default()
        };
        assert_eq!(d.look_ahead_recheck_delay(), Duration::from_millis(200));

        let tiny = DispatchConfig {
            look_ahead_window_ms: 2,
            ..Default::default()
        };
        assert_eq!(tiny.look_ahead_recheck_delay(), Duration::from_millis(1));
    }
}
