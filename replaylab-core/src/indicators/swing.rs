//! Swing-point detection.
//!
//! A swing high is a bar whose high is strictly above both immediate
//! neighbours; a swing low mirrors that on lows. Strength counts the bars
//! within `lookback` on each side that the point dominates, capped at 5.

use serde::{Deserialize, Serialize};

use crate::domain::Bar;

/// Maximum swing strength score.
pub const MAX_SWING_STRENGTH: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwingKind {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub index: usize,
    pub price: f64,
    pub kind: SwingKind,
    pub strength: u8,
}

/// Detect swing points in `bars`. The first and last bar never qualify.
pub fn detect_swing_points(bars: &[Bar], lookback: usize) -> Vec<SwingPoint> {
    let mut points = Vec::new();
    if bars.len() < 3 {
        return points;
    }

    for i in 1..bars.len() - 1 {
        let (prev, cur, next) = (&bars[i - 1], &bars[i], &bars[i + 1]);

        if cur.high > prev.high && cur.high > next.high {
            let strength = strength(bars, i, lookback, |other| cur.high > other.high);
            points.push(SwingPoint {
                index: i,
                price: cur.high,
                kind: SwingKind::High,
                strength,
            });
        }

        if cur.low < prev.low && cur.low < next.low {
            let strength = strength(bars, i, lookback, |other| cur.low < other.low);
            points.push(SwingPoint {
                index: i,
                price: cur.low,
                kind: SwingKind::Low,
                strength,
            });
        }
    }

    points
}

fn strength(bars: &[Bar], i: usize, lookback: usize, dominates: impl Fn(&Bar) -> bool) -> u8 {
    let start = i.saturating_sub(lookback);
    let end = (i + lookback).min(bars.len() - 1);
    let count = (start..=end)
        .filter(|&j| j != i && dominates(&bars[j]))
        .count();
    count.min(MAX_SWING_STRENGTH as usize) as u8
}

/// Nearest swing low strictly below `price`, searching backwards.
pub fn nearest_swing_low_below(points: &[SwingPoint], price: f64) -> Option<&SwingPoint> {
    points
        .iter()
        .rev()
        .find(|p| p.kind == SwingKind::Low && p.price < price)
}

/// Nearest swing high strictly above `price`, searching backwards.
pub fn nearest_swing_high_above(points: &[SwingPoint], price: f64) -> Option<&SwingPoint> {
    points
        .iter()
        .rev()
        .find(|p| p.kind == SwingKind::High && p.price > price)
}
