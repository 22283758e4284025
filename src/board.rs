//! Active signals counting down to their predicted crash.

use std::time::Duration;

use crate::gemini::types::Signal;

/// Countdown given to a live signal that arrives without one
const DEFAULT_TIME_REMAINING_SECS: f64 = 20.0;

#[derive(Debug, Default)]
pub struct SignalBoard {
  signals: Vec<Signal>,
}

impl SignalBoard {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, mut signal: Signal) {
    if signal.time_remaining <= 0.0 {
      signal.time_remaining = DEFAULT_TIME_REMAINING_SECS;
    }
    self.signals.push(signal);
  }

  /// Count every signal down by `elapsed` and drop the ones that reached zero.
  ///
  /// Returns the expired signals.
  pub fn tick(&mut self, elapsed: Duration) -> Vec<Signal> {
    let step = elapsed.as_secs_f64();
    for signal in &mut self.signals {
      signal.time_remaining = (signal.time_remaining - step).max(0.0);
    }

    let (expired, active) = std::mem::take(&mut self.signals)
      .into_iter()
      .partition(|s| s.time_remaining <= 0.0);
    self.signals = active;
    expired
  }

  /// Override the multiplier and countdown of signal `id`. Returns false if
  /// no such signal is active.
  pub fn update(&mut self, id: &str, multiplier: f64, time_remaining: f64) -> bool {
    match self.signals.iter_mut().find(|s| s.id == id) {
      Some(signal) => {
        signal.multiplier = multiplier;
        signal.time_remaining = time_remaining.max(0.0);
        true
      }
      None => false,
    }
  }

  /// Active signals, soonest crash first.
  pub fn active(&self) -> Vec<&Signal> {
    let mut sorted: Vec<&Signal> = self.signals.iter().collect();
    sorted.sort_by(|a, b| a.time_remaining.total_cmp(&b.time_remaining));
    sorted
  }

  pub fn is_empty(&self) -> bool {
    self.signals.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::gemini::types::Direction;

  fn signal(id: &str, time_remaining: f64) -> Signal {
    Signal {
      id: id.to_string(),
      direction: Direction::Up,
      confidence: 80.0,
      reasoning: "r".to_string(),
      multiplier: 2.0,
      time_remaining,
      market_node: "n".to_string(),
      timestamp: "12:00:00".to_string(),
      is_manual: false,
    }
  }

  #[test]
  fn test_tick_expires_signals() {
    let mut board = SignalBoard::new();
    board.push(signal("a", 1.0));
    board.push(signal("b", 10.0));

    assert!(board.tick(Duration::from_millis(500)).is_empty());
    let expired = board.tick(Duration::from_millis(600));

    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, "a");
    assert_eq!(board.active().len(), 1);
    assert!((board.active()[0].time_remaining - 8.9).abs() < 1e-9);
  }

  #[test]
  fn test_push_defaults_missing_countdown() {
    let mut board = SignalBoard::new();
    board.push(signal("a", 0.0));
    assert_eq!(board.active()[0].time_remaining, 20.0);
  }

  #[test]
  fn test_update_and_ordering() {
    let mut board = SignalBoard::new();
    board.push(signal("a", 5.0));
    board.push(signal("b", 30.0));

    assert!(board.update("b", 4.2, 1.5));
    assert!(!board.update("missing", 1.0, 1.0));

    let active = board.active();
    assert_eq!(active[0].id, "b");
    assert_eq!(active[0].multiplier, 4.2);
    assert_eq!(active[1].id, "a");
  }
}
