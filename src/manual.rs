//! Manual override signals built from multipliers read off another screen.

use chrono::{DateTime, Utc};

use crate::gemini::types::{new_id, node_time, Direction, Signal};

const MANUAL_CONFIDENCE: f64 = 98.0;
const MANUAL_TIME_REMAINING_SECS: f64 = 25.0;
/// A last multiplier above this calls the next round `UP`
const UP_THRESHOLD: f64 = 2.0;
const MULTIPLIER_MARKUP: f64 = 1.05;

/// Parse a comma-separated list, silently dropping entries that are not numbers.
pub fn parse_multipliers(input: &str) -> Vec<f64> {
  input
    .split(',')
    .filter_map(|part| part.trim().parse::<f64>().ok())
    .filter(|v| v.is_finite())
    .collect()
}

/// Build an override signal from the last entered multiplier.
///
/// Returns `None` when no multiplier was entered.
pub fn manual_signal(multipliers: &[f64], node: &str, now: DateTime<Utc>) -> Option<Signal> {
  let last = *multipliers.last()?;

  Some(Signal {
    id: new_id("manual", 5),
    direction: if last > UP_THRESHOLD {
      Direction::Up
    } else {
      Direction::Down
    },
    confidence: MANUAL_CONFIDENCE,
    reasoning: format!(
      "Manual Node Handshake [{}]: Calibrated sequence using external server data. \
       Probability weight maximized for regional node synchronization.",
      node
    ),
    multiplier: last * MULTIPLIER_MARKUP,
    time_remaining: MANUAL_TIME_REMAINING_SECS,
    market_node: node.to_string(),
    timestamp: node_time(now),
    is_manual: true,
  })
}
