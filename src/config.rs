//! Session configuration
//!
//! Everything a host collects before the first bar: display-only reclaim
//! levels and historical lows, the support levels the engine watches, the
//! detection thresholds and the instrument tick size. Loaded from JSON;
//! missing fields fall back to the ES/MES reference setup.

use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ladder::LevelLadder;
use crate::machine::ReclaimStateMachine;
use crate::params::ReclaimParams;
use crate::{BarEvent, EngineBuilder, HoldSeconds, ReclaimError, Result, Ticks};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Display reference only
    pub reclaim_levels: Vec<f64>,
    pub major_support_levels: Vec<f64>,
    pub low_of_yesterday: f64,
    pub low_of_two_days_ago: f64,
    pub points_above_ticks: u32,
    pub held_above_seconds: u32,
    /// Reserved for stop placement, not used by detection
    pub stop_down_ticks: u32,
    pub tick_size: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reclaim_levels: vec![7057.0, 7061.0, 7069.0],
            major_support_levels: vec![6855.0, 6859.0, 6866.0],
            low_of_yesterday: 6835.0,
            low_of_two_days_ago: 6825.0,
            points_above_ticks: 8,
            held_above_seconds: 270,
            stop_down_ticks: 40,
            tick_size: 0.25,
        }
    }
}

impl SessionConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SessionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&contents)?;
        info!(path = %path.as_ref().display(), "loaded session config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.tick_size.is_finite() && self.tick_size > 0.0) {
            return Err(ReclaimError::Configuration(format!(
                "tick_size must be positive, got {}",
                self.tick_size
            )));
        }
        self.params().map(|_| ())
    }

    /// Thresholds as validated types
    pub fn params(&self) -> Result<ReclaimParams> {
        let err = |field: &str, e: ReclaimError| ReclaimError::Configuration(format!("{field}: {e}"));
        Ok(ReclaimParams {
            points_above_ticks: Ticks::new(self.points_above_ticks)
                .map_err(|e| err("points_above_ticks", e))?,
            held_above_seconds: HoldSeconds::new(self.held_above_seconds)
                .map_err(|e| err("held_above_seconds", e))?,
            stop_down_ticks: Ticks::new(self.stop_down_ticks)
                .map_err(|e| err("stop_down_ticks", e))?,
        })
    }

    pub fn support_ladder(&self) -> LevelLadder {
        LevelLadder::new(self.major_support_levels.iter().copied())
    }

    /// Break margin in price units
    pub fn margin(&self) -> f64 {
        f64::from(self.points_above_ticks) * self.tick_size
    }

    /// Bar event carrying this session's tick size
    pub fn bar(&self, close: f64, high: f64, timestamp: DateTime<Utc>) -> BarEvent {
        BarEvent::new(close, high, timestamp, self.tick_size)
    }

    /// Validate and build a machine for this session
    pub fn build(&self) -> Result<ReclaimStateMachine> {
        self.validate()?;
        EngineBuilder::new()
            .supports(self.major_support_levels.iter().copied())
            .params(self.params()?)
            .build()
    }

    /// Horizontal reference lines for the chart, each group highest first.
    /// Non-positive prices are left out.
    pub fn reference_levels(&self) -> Vec<ReferenceLevel> {
        let reclaim = LevelLadder::new(self.reclaim_levels.iter().copied());
        let supports = self.support_ladder();

        let lows = [
            (LevelKind::LowOfYesterday, self.low_of_yesterday),
            (LevelKind::LowOfTwoDaysAgo, self.low_of_two_days_ago),
        ];

        reclaim
            .highest_first()
            .map(|price| ReferenceLevel::new(LevelKind::Reclaim, price))
            .chain(
                supports
                    .highest_first()
                    .map(|price| ReferenceLevel::new(LevelKind::MajorSupport, price)),
            )
            .chain(
                lows.into_iter()
                    .filter(|(_, price)| *price > 0.0)
                    .map(|(kind, price)| ReferenceLevel::new(kind, price)),
            )
            .collect()
    }
}

/// Category of a reference line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LevelKind {
    Reclaim,
    MajorSupport,
    LowOfYesterday,
    LowOfTwoDaysAgo,
}

impl LevelKind {
    pub fn label(self) -> &'static str {
        match self {
            LevelKind::Reclaim => "RECLAIM LEVEL",
            LevelKind::MajorSupport => "MAJOR SUPPORT LEVEL",
            LevelKind::LowOfYesterday => "LOW YEST",
            LevelKind::LowOfTwoDaysAgo => "LOW 2 DAY",
        }
    }
}

/// A static price line for the rendering collaborator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceLevel {
    pub kind: LevelKind,
    pub price: f64,
}

impl ReferenceLevel {
    pub fn new(kind: LevelKind, price: f64) -> Self {
        Self { kind, price }
    }
}

impl fmt::Display for ReferenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {:.2}", self.kind.label(), self.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_validates() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.margin() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_default_builds_descending_ladder() {
        let machine = SessionConfig::default().build().unwrap();
        assert_eq!(machine.ladder().levels(), &[6866.0, 6859.0, 6855.0]);
        assert_eq!(machine.params().held_above_seconds.get(), 270);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SessionConfig::from_json_str(
            r#"{ "major_support_levels": [5000.0, 0.0, 5010.0], "held_above_seconds": 60 }"#,
        )
        .unwrap();

        assert_eq!(config.held_above_seconds, 60);
        assert_eq!(config.points_above_ticks, 8);
        assert_eq!(config.support_ladder().levels(), &[5010.0, 5000.0]);
    }

    #[test]
    fn test_rejects_zero_ticks() {
        let err = SessionConfig::from_json_str(r#"{ "points_above_ticks": 0 }"#).unwrap_err();
        assert!(matches!(err, ReclaimError::Configuration(_)));
        assert!(err.to_string().contains("points_above_ticks"));
    }

    #[test]
    fn test_rejects_bad_tick_size() {
        let config = SessionConfig {
            tick_size: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(config.build().is_err());
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = SessionConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ReclaimError::Json(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = SessionConfig::from_file("/nonexistent/reclaim.json").unwrap_err();
        assert!(matches!(err, ReclaimError::Io(_)));
    }

    #[test]
    fn test_reference_levels() {
        let levels = SessionConfig::default().reference_levels();

        assert_eq!(levels.len(), 8);
        assert_eq!(levels[0], ReferenceLevel::new(LevelKind::Reclaim, 7069.0));
        assert_eq!(levels[3], ReferenceLevel::new(LevelKind::MajorSupport, 6866.0));
        assert_eq!(levels[7].kind, LevelKind::LowOfTwoDaysAgo);
        assert_eq!(levels[0].to_string(), "RECLAIM LEVEL - 7069.00");
        assert_eq!(levels[6].to_string(), "LOW YEST - 6835.00");
    }

    #[test]
    fn test_reference_levels_skip_unset_lows() {
        let config = SessionConfig {
            low_of_yesterday: 0.0,
            low_of_two_days_ago: 0.0,
            reclaim_levels: vec![],
            ..Default::default()
        };
        let levels = config.reference_levels();
        assert_eq!(levels.len(), 3);
        assert!(levels.iter().all(|l| l.kind == LevelKind::MajorSupport));
    }
}
