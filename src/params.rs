//! Detection thresholds and their parameter metadata
//!
//! This module provides the threshold bundle consumed by the state machine
//! along with metadata about each threshold, enabling:
//! - Grid search over margins and hold durations
//! - Parameter documentation
//! - Host-side configuration forms
//!
//! # Example
//!
//! ```rust
//! use reclaim_levels::params::ReclaimParams;
//!
//! for param in ReclaimParams::param_meta() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//! ```

use std::collections::HashMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::{HoldSeconds, ReclaimError, Result, Ticks};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Whole number of ticks (> 0)
  Ticks,
  /// Whole number of seconds (> 0)
  Seconds,
}

/// Metadata for a single threshold
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "points_above_ticks")
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn ticks(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ticks, default, range, description }
  }

  pub const fn seconds(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Seconds, default, range, description }
  }

  /// Generate all values for grid search
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    let mut values = Vec::new();
    let mut v = min;
    while v <= max + f64::EPSILON {
      values.push(v);
      v += step;
    }
    values
  }

  /// Validate a value against the optimization range
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value < min || value > max {
      return Err(ReclaimError::OutOfRange { field: self.name, value, min, max });
    }
    self.check_value(value)
  }

  /// Check that a value is usable at all: a whole number from 1 to `u32::MAX`.
  /// The optimization range does not apply.
  pub fn check_value(&self, value: f64) -> Result<()> {
    if value > f64::from(u32::MAX) {
      return Err(ReclaimError::OutOfRange {
        field: self.name,
        value,
        min: 1.0,
        max: f64::from(u32::MAX),
      });
    }
    if value.is_nan() || value < 1.0 || value.fract() != 0.0 {
      return Err(ReclaimError::InvalidValue(match self.param_type {
        ParamType::Ticks => "Tick count must be a positive integer",
        ParamType::Seconds => "Seconds must be a positive integer",
      }));
    }
    Ok(())
  }
}

const PARAM_META: &[ParamMeta] = &[
  ParamMeta::ticks(
    "points_above_ticks",
    8.0,
    (1.0, 40.0, 1.0),
    "Ticks price must close below a support before it counts as broken",
  ),
  ParamMeta::seconds(
    "held_above_seconds",
    270.0,
    (30.0, 900.0, 30.0),
    "Seconds price must hold at or above the support after reclaiming it",
  ),
  ParamMeta::ticks(
    "stop_down_ticks",
    40.0,
    (4.0, 120.0, 4.0),
    "Stop distance below entry in ticks, reserved for order placement",
  ),
];

// ============================================================
// RECLAIM PARAMS
// ============================================================

/// Thresholds driving the reclaim state machine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReclaimParams {
  pub points_above_ticks: Ticks,
  pub held_above_seconds: HoldSeconds,
  /// Not consumed by detection
  pub stop_down_ticks: Ticks,
}

impl Default for ReclaimParams {
  fn default() -> Self {
    Self {
      // 8 ticks = 2 points on ES/MES
      points_above_ticks: Ticks::new_const(8),
      // 4m30s
      held_above_seconds: HoldSeconds::new_const(270),
      stop_down_ticks: Ticks::new_const(40),
    }
  }
}

impl ReclaimParams {
  /// Metadata for all configurable thresholds
  pub fn param_meta() -> &'static [ParamMeta] {
    PARAM_META
  }

  /// Build params from a name -> value map. Missing names use defaults.
  pub fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    for meta in PARAM_META {
      if let Some(&value) = params.get(meta.name) {
        meta.check_value(value)?;
      }
    }
    Ok(Self {
      points_above_ticks: get_ticks(params, "points_above_ticks", 8)?,
      held_above_seconds: get_seconds(params, "held_above_seconds", 270)?,
      stop_down_ticks: get_ticks(params, "stop_down_ticks", 40)?,
    })
  }

  /// Price distance below a support that counts as a break
  #[inline]
  pub fn margin(&self, tick_size: f64) -> f64 {
    f64::from(self.points_above_ticks.get()) * tick_size
  }

  #[inline]
  pub fn stop_distance(&self, tick_size: f64) -> f64 {
    f64::from(self.stop_down_ticks.get()) * tick_size
  }

  #[inline]
  pub fn hold_duration(&self) -> Duration {
    Duration::seconds(i64::from(self.held_above_seconds.get()))
  }
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Helper to get Ticks from params with default fallback
pub fn get_ticks(params: &HashMap<&str, f64>, key: &str, default: u32) -> Result<Ticks> {
  let value = params.get(key).copied().unwrap_or(f64::from(default));
  Ticks::new(value as u32)
}

/// Helper to get HoldSeconds from params with default fallback
pub fn get_seconds(params: &HashMap<&str, f64>, key: &str, default: u32) -> Result<HoldSeconds> {
  let value = params.get(key).copied().unwrap_or(f64::from(default));
  HoldSeconds::new(value as u32)
}

// ============================================================
// TESTS
// ============================================================
