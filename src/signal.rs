//! Signal events emitted by the state machine
//!
//! Signals are plain data for the rendering collaborator: each carries the
//! bar it fired on and enough values (level, elapsed time) to draw or log it.
//! `Display` gives the reference annotation text.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Ticks above the bar high where annotation text is placed
pub const LABEL_OFFSET_TICKS: f64 = 5.0;
/// Timer readout sits above the other labels
pub const TIMER_OFFSET_TICKS: f64 = 10.0;

/// One event produced while evaluating a bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub timestamp: DateTime<Utc>,
    /// High of the bar the signal fired on
    pub bar_high: f64,
    pub kind: SignalKind,
}

impl Signal {
    /// Price at which to anchor this signal's annotation
    pub fn anchor_price(&self, tick_size: f64) -> f64 {
        let offset = match self.kind {
            SignalKind::TimerTick { .. } => TIMER_OFFSET_TICKS,
            _ => LABEL_OFFSET_TICKS,
        };
        self.bar_high + offset * tick_size
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.timestamp, self.kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalKind {
    /// Price closed at least `margin` below `level`; `level` is now armed
    CrossedBelow { level: f64, margin: f64 },
    /// Price recovered to or above the armed level; hold timer started
    Reclaimed { level: f64 },
    /// Hold timer still running
    TimerTick {
        level: f64,
        #[serde(with = "duration_millis")]
        elapsed: Duration,
    },
    /// Price lost the armed level before the hold duration elapsed
    TimerReset { level: f64 },
    /// Price fell through to the next support; tracking moves down
    Rearm { from: f64, to: f64 },
    /// Hold duration met. Terminal.
    EnterTrade {
        level: f64,
        #[serde(with = "duration_millis")]
        held: Duration,
    },
}

impl SignalKind {
    /// The support level this signal refers to
    pub fn level(&self) -> f64 {
        match *self {
            SignalKind::CrossedBelow { level, .. }
            | SignalKind::Reclaimed { level }
            | SignalKind::TimerTick { level, .. }
            | SignalKind::TimerReset { level }
            | SignalKind::EnterTrade { level, .. } => level,
            SignalKind::Rearm { to, .. } => to,
        }
    }

    #[inline]
    pub fn is_enter_trade(&self) -> bool {
        matches!(self, SignalKind::EnterTrade { .. })
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::CrossedBelow { margin, .. } => write!(f, "CROSSED {margin} pts BELOW"),
            SignalKind::Reclaimed { .. } => write!(f, "RECLAIMED LEVEL"),
            SignalKind::TimerTick { elapsed, .. } => write!(f, "Timer: {}", format_timer(*elapsed)),
            SignalKind::TimerReset { .. } => write!(f, "TIMER RESET"),
            SignalKind::Rearm { to, .. } => write!(f, "REARM {to:.2}"),
            SignalKind::EnterTrade { .. } => write!(f, "ENTER THE TRADE"),
        }
    }
}

/// `HH:MM:SS` readout. Negative durations (time-reversed feed) show as zero.
pub fn format_timer(elapsed: Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

mod duration_millis {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.num_milliseconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        i64::deserialize(d).map(Duration::milliseconds)
    }
}
