//! MACD (12/26/9).
//!
//! line = EMA(fast) - EMA(slow), signal = EMA(signal) of the line,
//! histogram = line - signal. All EMAs are seeded with their first input.

use super::ema::ema_of_series;
use super::Indicator;
use crate::domain::Bar;

/// Which MACD output a series refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacdLine {
    Line,
    Signal,
    Histogram,
}

impl MacdLine {
    pub fn name(self) -> &'static str {
        match self {
            MacdLine::Line => "macd",
            MacdLine::Signal => "macd_signal",
            MacdLine::Histogram => "macd_hist",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Macd {
    fast: usize,
    slow: usize,
    signal: usize,
    line: MacdLine,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize, line: MacdLine) -> Self {
        assert!(fast >= 1 && slow > fast && signal >= 1, "invalid MACD periods");
        Self {
            fast,
            slow,
            signal,
            line,
        }
    }

    /// The conventional 12/26/9 configuration.
    pub fn standard(line: MacdLine) -> Self {
        Self::new(12, 26, 9, line)
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        self.line.name()
    }

    fn lookback(&self) -> usize {
        self.slow + self.signal - 2
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let fast = ema_of_series(&closes, self.fast);
        let slow = ema_of_series(&closes, self.slow);
        let line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        if self.line == MacdLine::Line {
            return line;
        }

        let signal = ema_of_series(&line, self.signal);
        match self.line {
            MacdLine::Signal => signal,
            _ => line.iter().zip(&signal).map(|(l, s)| l - s).collect(),
        }
    }
}
