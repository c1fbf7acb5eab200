//! Trading sessions by UTC hour.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Session windows as `[start, end)` UTC hours. Sydney wraps midnight.
const SYDNEY: (u32, u32) = (21, 6);
const TOKYO: (u32, u32) = (0, 9);
const LONDON: (u32, u32) = (7, 16);
const NEW_YORK: (u32, u32) = (12, 21);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingSession {
    Sydney,
    Tokyo,
    London,
    NewYork,
    /// London and New York both open (12–16 UTC).
    LondonNewYorkOverlap,
}

fn in_window(hour: u32, (start, end): (u32, u32)) -> bool {
    if start < end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}

impl TradingSession {
    /// The most specific session open at `time`.
    ///
    /// Overlap wins; otherwise London, then New York, then Tokyo, then Sydney.
    pub fn at(time: DateTime<Utc>) -> Self {
        let hour = time.hour();
        let london = in_window(hour, LONDON);
        let new_york = in_window(hour, NEW_YORK);
        match () {
            _ if london && new_york => TradingSession::LondonNewYorkOverlap,
            _ if london => TradingSession::London,
            _ if new_york => TradingSession::NewYork,
            _ if in_window(hour, TOKYO) => TradingSession::Tokyo,
            // The four windows cover the whole day.
            _ => TradingSession::Sydney,
        }
    }

    /// Every session open at `time`, ignoring overlap precedence.
    pub fn open_at(time: DateTime<Utc>) -> Vec<Self> {
        let hour = time.hour();
        [
            (TradingSession::Sydney, SYDNEY),
            (TradingSession::Tokyo, TOKYO),
            (TradingSession::London, LONDON),
            (TradingSession::NewYork, NEW_YORK),
        ]
        .into_iter()
        .filter(|(_, window)| in_window(hour, *window))
        .map(|(session, _)| session)
        .collect()
    }
}

impl fmt::Display for TradingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TradingSession::Sydney => "Sydney",
            TradingSession::Tokyo => "Tokyo",
            TradingSession::London => "London",
            TradingSession::NewYork => "New York",
            TradingSession::LondonNewYorkOverlap => "London/New York",
        };
        f.write_str(name)
    }
}
