//! Break-and-reclaim state machine
//!
//! One machine tracks one session. Each bar close is evaluated to completion
//! before the next is accepted:
//!
//! 1. **Idle** - walk the ladder highest first; the first support with
//!    `close <= support - margin` is armed.
//! 2. **CrossedBelow** - wait for `close >= support`, then start the hold timer.
//! 3. **Reclaiming** - every bar at or above the support ticks the timer; once
//!    `elapsed >= held_above_seconds` the trade is entered.
//! 4. **TradeEntered** - terminal, later bars are ignored.
//!
//! Losing the support while the timer runs stops the timer. If the same close
//! is at or below the next lower support, that support is armed on the same
//! bar, without requiring the break margin.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ladder::LevelLadder;
use crate::params::ReclaimParams;
use crate::signal::{Signal, SignalKind};
use crate::{PriceBar, ReclaimError, Result};

/// Where the machine sits in the detection protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    CrossedBelow,
    Reclaiming,
    TradeEntered,
}

/// Mutable per-session record
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    /// Support currently tracked. Only set while crossed below or reclaiming.
    pub armed_support: Option<f64>,
    /// Mirrors `armed_support.is_some()`; kept for hosts that persist the record
    pub crossed_below: bool,
    pub timer_running: bool,
    /// Only meaningful while `timer_running`
    pub timer_start: Option<DateTime<Utc>>,
    /// Price has recovered to the armed support at least once
    pub reclaimed: bool,
    pub trade_entered: bool,
}

impl EngineState {
    pub fn phase(&self) -> Phase {
        if self.trade_entered {
            Phase::TradeEntered
        } else if self.armed_support.is_none() {
            Phase::Idle
        } else if self.timer_running {
            Phase::Reclaiming
        } else {
            Phase::CrossedBelow
        }
    }

    fn stop_timer(&mut self) {
        self.timer_running = false;
        self.timer_start = None;
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Bar being evaluated; stamped onto every signal it produces
#[derive(Debug, Clone, Copy)]
struct BarStamp {
    timestamp: DateTime<Utc>,
    high: f64,
}

impl BarStamp {
    fn signal(self, kind: SignalKind) -> Signal {
        Signal {
            timestamp: self.timestamp,
            bar_high: self.high,
            kind,
        }
    }
}

/// Detects break-below, reclaim and hold of configured support levels
#[derive(Debug, Clone)]
pub struct ReclaimStateMachine {
    ladder: LevelLadder,
    params: ReclaimParams,
    state: EngineState,
    bars_seen: u64,
}

impl ReclaimStateMachine {
    pub fn new(ladder: LevelLadder, params: ReclaimParams) -> Self {
        Self {
            ladder,
            params,
            state: EngineState::default(),
            bars_seen: 0,
        }
    }

    /// Replace the support ladder. Only allowed before the first bar.
    pub fn configure_supports(&mut self, values: impl IntoIterator<Item = f64>) -> Result<()> {
        if self.bars_seen > 0 {
            return Err(ReclaimError::Configuration(format!(
                "support levels cannot change after {} bar(s) were evaluated",
                self.bars_seen
            )));
        }
        self.ladder.configure(values);
        Ok(())
    }

    #[inline]
    pub fn state(&self) -> &EngineState {
        &self.state
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    #[inline]
    pub fn ladder(&self) -> &LevelLadder {
        &self.ladder
    }

    #[inline]
    pub fn params(&self) -> &ReclaimParams {
        &self.params
    }

    #[inline]
    pub fn bars_seen(&self) -> u64 {
        self.bars_seen
    }

    /// Evaluate one closed bar
    pub fn on_bar<B: PriceBar>(&mut self, bar: &B) -> Vec<Signal> {
        self.evaluate(bar.close(), bar.high(), bar.timestamp(), bar.tick_size())
    }

    /// Evaluate one closed bar from raw values.
    ///
    /// Timestamps are expected to be non-decreasing. A time-reversed bar
    /// yields a negative elapsed time, which never satisfies the hold.
    pub fn evaluate(
        &mut self,
        close: f64,
        high: f64,
        timestamp: DateTime<Utc>,
        tick_size: f64,
    ) -> Vec<Signal> {
        self.bars_seen += 1;
        let mut signals = Vec::new();

        if self.state.trade_entered {
            return signals;
        }

        let stamp = BarStamp { timestamp, high };
        let margin = self.params.margin(tick_size);

        match self.state.armed_support {
            None => self.check_crossed_below(close, margin, stamp, &mut signals),
            Some(level) => self.check_reclaim(close, level, margin, stamp, &mut signals),
        }

        signals
    }

    /// Arm the highest support broken by at least `margin`
    fn check_crossed_below(
        &mut self,
        close: f64,
        margin: f64,
        stamp: BarStamp,
        signals: &mut Vec<Signal>,
    ) {
        let Some(level) = self.ladder.highest_first().find(|&s| close <= s - margin) else {
            debug!(close, "no support broken");
            return;
        };

        self.arm(level, close, margin, stamp, signals);
    }

    fn arm(
        &mut self,
        level: f64,
        close: f64,
        margin: f64,
        stamp: BarStamp,
        signals: &mut Vec<Signal>,
    ) {
        self.state.armed_support = Some(level);
        self.state.crossed_below = true;
        info!(level, close, margin, "crossed below support");
        signals.push(stamp.signal(SignalKind::CrossedBelow { level, margin }));
    }

    fn check_reclaim(
        &mut self,
        close: f64,
        level: f64,
        margin: f64,
        stamp: BarStamp,
        signals: &mut Vec<Signal>,
    ) {
        if close >= level {
            if !self.state.timer_running {
                self.state.reclaimed = true;
                self.state.timer_running = true;
                self.state.timer_start = Some(stamp.timestamp);
                info!(level, close, "support reclaimed, hold timer started");
                signals.push(stamp.signal(SignalKind::Reclaimed { level }));
                return;
            }

            let start = self.state.timer_start.unwrap_or(stamp.timestamp);
            let elapsed = stamp.timestamp.signed_duration_since(start);
            debug!(level, elapsed_secs = elapsed.num_seconds(), "hold timer");
            signals.push(stamp.signal(SignalKind::TimerTick { level, elapsed }));

            let held = self.params.hold_duration();
            if elapsed >= held {
                self.state.trade_entered = true;
                self.state.armed_support = None;
                self.state.stop_timer();
                info!(level, held_secs = held.num_seconds(), "enter trade");
                signals.push(stamp.signal(SignalKind::EnterTrade { level, held }));
            }
            return;
        }

        if !self.state.timer_running {
            return;
        }

        self.state.stop_timer();
        info!(level, close, "hold timer reset, price back below support");
        signals.push(stamp.signal(SignalKind::TimerReset { level }));

        let Some(next) = self.ladder.next_lower(level) else {
            return;
        };
        if close <= next {
            self.state.clear();
            info!(from = level, to = next, close, "rearming at next lower support");
            signals.push(stamp.signal(SignalKind::Rearm { from: level, to: next }));
            self.arm(next, close, margin, stamp, signals);
        }
    }
}
