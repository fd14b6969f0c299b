//! # Reclaim Levels
//!
//! Break-and-reclaim detection for configured support levels.
//!
//! Price has to close a margin below a support, recover back to it, and then
//! hold at or above it for a minimum time. When all three happen the engine
//! emits an enter-trade signal. If price falls through to the next lower
//! support along the way, tracking moves down the ladder on the same bar.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{DateTime, Utc};
//! use reclaim_levels::prelude::*;
//!
//! struct Bar { close: f64, high: f64, time: DateTime<Utc> }
//!
//! impl PriceBar for Bar {
//!     fn close(&self) -> f64 { self.close }
//!     fn high(&self) -> f64 { self.high }
//!     fn timestamp(&self) -> DateTime<Utc> { self.time }
//!     fn tick_size(&self) -> f64 { 0.25 }
//! }
//!
//! let mut engine = EngineBuilder::new()
//!     .supports([6866.0, 6859.0, 6855.0])
//!     .points_above_ticks(8)
//!     .held_above_seconds(270)
//!     .build()
//!     .unwrap();
//!
//! let bars: Vec<Bar> = vec![];
//! let signals = engine.replay(&bars).unwrap();
//! assert!(signals.is_empty());
//! ```

use chrono::{DateTime, Utc};
use tracing::warn;

pub mod config;
pub mod ladder;
pub mod machine;
pub mod params;
pub mod signal;

pub use config::{LevelKind, ReferenceLevel, SessionConfig};
pub use ladder::LevelLadder;
pub use machine::{EngineState, Phase, ReclaimStateMachine};
pub use params::ReclaimParams;
pub use signal::{Signal, SignalKind};

pub mod prelude {
    pub use crate::{
        // Config
        config::{LevelKind, ReferenceLevel, SessionConfig},
        // Ladder
        ladder::LevelLadder,
        // Machine
        machine::{EngineState, Phase, ReclaimStateMachine},
        // Parameters
        params::{ParamMeta, ParamType, ReclaimParams},
        // Parallel
        replay_parallel,
        // Signals
        signal::{format_timer, Signal, SignalKind},
        BarEvent,
        BarSignals,
        EngineBuilder,
        HoldSeconds,
        PriceBar,
        ReclaimError,
        ReplayError,
        ReplayResult,
        Result,
        SignalIterator,
        Ticks,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, ReclaimError>;

/// Errors raised while configuring the engine or loading bars in batch
#[derive(Debug, thiserror::Error)]
pub enum ReclaimError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid bar at index {index}: {reason}")]
    InvalidBar { index: usize, reason: &'static str },

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Whole number of price ticks (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticks(u32);

impl Ticks {
    pub fn new(value: u32) -> Result<Self> {
        if value == 0 {
            return Err(ReclaimError::InvalidValue("Ticks must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: u32) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl serde::Serialize for Ticks {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ticks {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = u32::deserialize(d)?;
        Ticks::new(value).map_err(serde::de::Error::custom)
    }
}

/// Hold duration in whole seconds (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HoldSeconds(u32);

impl HoldSeconds {
    pub fn new(value: u32) -> Result<Self> {
        if value == 0 {
            return Err(ReclaimError::InvalidValue("Hold seconds must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: u32) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl serde::Serialize for HoldSeconds {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for HoldSeconds {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = u32::deserialize(d)?;
        HoldSeconds::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// BAR TRAIT
// ============================================================

/// A closed bar as delivered by the host feed
pub trait PriceBar {
    fn close(&self) -> f64;
    fn high(&self) -> f64;
    fn timestamp(&self) -> DateTime<Utc>;
    /// Session-constant minimum price increment
    fn tick_size(&self) -> f64;

    /// Check the bar is usable for batch replay
    fn validate(&self) -> Result<()> {
        if !self.close().is_finite() || !self.high().is_finite() {
            return Err(ReclaimError::InvalidBar {
                index: 0,
                reason: "NaN or infinite price",
            });
        }
        if self.high() < self.close() {
            return Err(ReclaimError::InvalidBar {
                index: 0,
                reason: "high < close",
            });
        }
        if !(self.tick_size().is_finite() && self.tick_size() > 0.0) {
            return Err(ReclaimError::InvalidBar {
                index: 0,
                reason: "tick size must be positive",
            });
        }
        Ok(())
    }
}

impl PriceBar for &dyn PriceBar {
    fn close(&self) -> f64 {
        (*self).close()
    }

    fn high(&self) -> f64 {
        (*self).high()
    }

    fn timestamp(&self) -> DateTime<Utc> {
        (*self).timestamp()
    }

    fn tick_size(&self) -> f64 {
        (*self).tick_size()
    }
}

/// Plain bar-close event
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BarEvent {
    pub close: f64,
    pub high: f64,
    pub timestamp: DateTime<Utc>,
    pub tick_size: f64,
}

impl BarEvent {
    pub fn new(close: f64, high: f64, timestamp: DateTime<Utc>, tick_size: f64) -> Self {
        Self {
            close,
            high,
            timestamp,
            tick_size,
        }
    }
}

impl PriceBar for BarEvent {
    fn close(&self) -> f64 {
        self.close
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn tick_size(&self) -> f64 {
        self.tick_size
    }
}

// ============================================================
// REPLAY
// ============================================================

impl ReclaimStateMachine {
    /// Same ladder and thresholds, fresh state
    pub fn fresh(&self) -> Self {
        Self::new(self.ladder().clone(), *self.params())
    }

    /// Validate and evaluate a batch of bars in order
    pub fn replay<T: PriceBar>(&mut self, bars: &[T]) -> Result<Vec<Signal>> {
        validate_bars(bars)?;
        Ok(bars.iter().flat_map(|bar| self.on_bar(bar)).collect())
    }

    /// Iterate bars with the signals each one produced.
    ///
    /// Bars are not validated up front.
    pub fn iter<'a, T: PriceBar>(&'a mut self, bars: &'a [T]) -> SignalIterator<'a, T> {
        SignalIterator {
            machine: self,
            bars,
            current: 0,
        }
    }
}

fn validate_bars<T: PriceBar>(bars: &[T]) -> Result<()> {
    for (i, bar) in bars.iter().enumerate() {
        bar.validate().map_err(|e| match e {
            ReclaimError::InvalidBar { reason, .. } => ReclaimError::InvalidBar { index: i, reason },
            other => other,
        })?;
    }
    Ok(())
}

/// Signals produced by a specific bar
#[derive(Debug, Clone)]
pub struct BarSignals {
    pub index: usize,
    pub signals: Vec<Signal>,
}

/// Iterator over bars with their signals
pub struct SignalIterator<'a, T: PriceBar> {
    machine: &'a mut ReclaimStateMachine,
    bars: &'a [T],
    current: usize,
}

impl<'a, T: PriceBar> Iterator for SignalIterator<'a, T> {
    type Item = BarSignals;

    fn next(&mut self) -> Option<Self::Item> {
        let bar = self.bars.get(self.current)?;
        let index = self.current;
        let signals = self.machine.on_bar(bar);

        self.current += 1;

        Some(BarSignals { index, signals })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.bars.len().saturating_sub(self.current);
        (remaining, Some(remaining))
    }
}

impl<'a, T: PriceBar> ExactSizeIterator for SignalIterator<'a, T> {}

// ============================================================
// BUILDER
// ============================================================

/// Builder for `ReclaimStateMachine`
#[derive(Debug, Clone)]
pub struct EngineBuilder {
    supports: Vec<f64>,
    points_above_ticks: u32,
    held_above_seconds: u32,
    stop_down_ticks: u32,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        let defaults = ReclaimParams::default();
        Self {
            supports: Vec::new(),
            points_above_ticks: defaults.points_above_ticks.get(),
            held_above_seconds: defaults.held_above_seconds.get(),
            stop_down_ticks: defaults.stop_down_ticks.get(),
        }
    }

    /// Support levels to watch, in any order
    pub fn supports(mut self, levels: impl IntoIterator<Item = f64>) -> Self {
        self.supports.extend(levels);
        self
    }

    pub fn points_above_ticks(mut self, ticks: u32) -> Self {
        self.points_above_ticks = ticks;
        self
    }

    pub fn held_above_seconds(mut self, seconds: u32) -> Self {
        self.held_above_seconds = seconds;
        self
    }

    pub fn stop_down_ticks(mut self, ticks: u32) -> Self {
        self.stop_down_ticks = ticks;
        self
    }

    /// Take all thresholds from an existing bundle
    pub fn params(mut self, params: ReclaimParams) -> Self {
        self.points_above_ticks = params.points_above_ticks.get();
        self.held_above_seconds = params.held_above_seconds.get();
        self.stop_down_ticks = params.stop_down_ticks.get();
        self
    }

    /// Build the machine
    pub fn build(self) -> Result<ReclaimStateMachine> {
        let params = ReclaimParams {
            points_above_ticks: Ticks::new(self.points_above_ticks)?,
            held_above_seconds: HoldSeconds::new(self.held_above_seconds)?,
            stop_down_ticks: Ticks::new(self.stop_down_ticks)?,
        };
        let ladder = LevelLadder::new(self.supports);
        if ladder.is_empty() {
            warn!("no positive support levels configured, engine will never signal");
        }
        Ok(ReclaimStateMachine::new(ladder, params))
    }
}

// ============================================================
// PARALLEL REPLAY
// ============================================================

use rayon::prelude::*;

/// Signals from replaying a single instrument
#[derive(Debug)]
pub struct ReplayResult {
    pub symbol: String,
    pub signals: Vec<Signal>,
}

/// Error from replaying a single instrument
#[derive(Debug)]
pub struct ReplayError {
    pub symbol: String,
    pub error: ReclaimError,
}

/// Replay several instruments in parallel.
///
/// A machine is single-session: its armed support, hold timer and bar count
/// describe one stream of bars, and its ladder is locked once a bar has been
/// seen. Every instrument therefore starts from `template.fresh()`, which
/// keeps the ladder and thresholds but drops whatever state the template has
/// already accumulated. Results match a sequential `fresh().replay()` per
/// instrument.
pub fn replay_parallel<'a, T, I>(
    template: &ReclaimStateMachine,
    instruments: I,
) -> (Vec<ReplayResult>, Vec<ReplayError>)
where
    T: PriceBar + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T])>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, bars)| {
            template
                .fresh()
                .replay(bars)
                .map(|signals| ReplayResult {
                    symbol: symbol.to_string(),
                    signals,
                })
                .map_err(|error| ReplayError {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 6, 14, 30, 0).unwrap() + Duration::seconds(secs)
    }

    fn bar(close: f64, secs: i64) -> BarEvent {
        BarEvent::new(close, close + 0.5, t(secs), 0.25)
    }

    fn engine() -> ReclaimStateMachine {
        EngineBuilder::new()
            .supports([6855.0, 6866.0, 6859.0])
            .build()
            .unwrap()
    }

    #[test]
    fn test_ticks_validation() {
        assert!(Ticks::new(1).is_ok());
        assert!(Ticks::new(0).is_err());
        assert!(HoldSeconds::new(270).is_ok());
        assert!(HoldSeconds::new(0).is_err());
    }

    #[test]
    fn test_ticks_deserialize_rejects_zero() {
        assert!(serde_json::from_str::<Ticks>("0").is_err());
        assert_eq!(serde_json::from_str::<Ticks>("8").unwrap().get(), 8);
    }

    #[test]
    fn test_bar_validation() {
        assert!(bar(6850.0, 0).validate().is_ok());
        assert!(BarEvent::new(f64::NAN, 1.0, t(0), 0.25).validate().is_err());
        assert!(BarEvent::new(10.0, 9.0, t(0), 0.25).validate().is_err());
        assert!(BarEvent::new(10.0, 11.0, t(0), 0.0).validate().is_err());
    }

    #[test]
    fn test_builder_defaults() {
        let engine = engine();
        assert_eq!(engine.ladder().levels(), &[6866.0, 6859.0, 6855.0]);
        assert_eq!(*engine.params(), ReclaimParams::default());
    }

    #[test]
    fn test_builder_rejects_zero_thresholds() {
        assert!(EngineBuilder::new().points_above_ticks(0).build().is_err());
        assert!(EngineBuilder::new().held_above_seconds(0).build().is_err());
        assert!(EngineBuilder::new().stop_down_ticks(0).build().is_err());
    }

    #[test]
    fn test_empty_replay() {
        let mut engine = engine();
        let bars: Vec<BarEvent> = vec![];
        assert!(engine.replay(&bars).unwrap().is_empty());
    }

    #[test]
    fn test_replay_reports_bad_index() {
        let mut engine = engine();
        let bars = vec![bar(6870.0, 0), BarEvent::new(f64::NAN, 1.0, t(60), 0.25)];

        let err = engine.replay(&bars).unwrap_err();
        assert!(matches!(err, ReclaimError::InvalidBar { index: 1, .. }));
        assert_eq!(engine.bars_seen(), 0);
    }

    #[test]
    fn test_iterator() {
        let mut engine = engine();
        let bars = vec![bar(6870.0, 0), bar(6850.0, 60), bar(6870.0, 120)];

        let results: Vec<_> = engine.iter(&bars).collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].signals.is_empty());
        assert_eq!(results[1].signals.len(), 1);
        assert_eq!(results[2].index, 2);
    }

    #[test]
    fn test_iterator_exact_size() {
        let mut engine = engine();
        let bars = vec![bar(6870.0, 0), bar(6870.0, 60)];
        assert_eq!(engine.iter(&bars).len(), 2);
    }

    #[test]
    fn test_fresh_drops_state() {
        let mut engine = engine();
        engine.on_bar(&bar(6850.0, 0));
        assert_eq!(engine.phase(), Phase::CrossedBelow);

        let fresh = engine.fresh();
        assert_eq!(fresh.phase(), Phase::Idle);
        assert_eq!(fresh.bars_seen(), 0);
        assert_eq!(fresh.ladder(), engine.ladder());
    }

    #[test]
    fn test_parallel_replay() {
        let engine = engine();

        let es = vec![bar(6850.0, 0), bar(6870.0, 60), bar(6870.0, 330)];
        let mes = vec![bar(6870.0, 0)];
        let bad = vec![BarEvent::new(6870.0, 6860.0, t(0), 0.25)];

        let instruments: Vec<(&str, &[BarEvent])> = vec![("ES", &es), ("MES", &mes), ("BAD", &bad)];

        let (results, errors) = replay_parallel(&engine, instruments);
        assert_eq!(results.len(), 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].symbol, "BAD");

        let es_result = results.iter().find(|r| r.symbol == "ES").unwrap();
        assert!(es_result
            .signals
            .last()
            .is_some_and(|s| s.kind.is_enter_trade()));
    }

    #[test]
    fn test_parallel_replay_ignores_template_state() {
        let mut template = engine();
        template.on_bar(&bar(6850.0, 0));
        template.on_bar(&bar(6870.0, 60));
        assert_eq!(template.phase(), Phase::Reclaiming);

        // a live template would tick its timer here instead of crossing below
        let bars = vec![bar(6850.0, 0), bar(6870.0, 60)];
        let instruments: Vec<(&str, &[BarEvent])> = vec![("ES", &bars)];
        let (results, errors) = replay_parallel(&template, instruments);

        assert!(errors.is_empty());
        assert_eq!(results[0].signals, engine().replay(&bars).unwrap());
        assert!(matches!(results[0].signals[0].kind, SignalKind::CrossedBelow { .. }));
        assert_eq!(template.bars_seen(), 2);
    }
}
