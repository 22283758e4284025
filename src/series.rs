//! Synthetic crash-multiplier series fed to market scans.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::collections::VecDeque;

use crate::gemini::types::{node_time, DataPoint};

/// Floor of any multiplier in the series
const MIN_VALUE: f64 = 1.0;
/// Spacing of the backfilled history
const HISTORY_STEP_SECS: i64 = 10;

/// Fixed-length rolling series with a random-walk tick.
#[derive(Debug, Clone)]
pub struct SeriesFeed {
  points: VecDeque<DataPoint>,
  capacity: usize,
}

impl SeriesFeed {
  /// Backfill `capacity` points ending at `now`, uniformly drawn from `[1, 6)`.
  pub fn new<R: Rng>(capacity: usize, now: DateTime<Utc>, rng: &mut R) -> Self {
    let capacity = capacity.max(1);
    let points = (0..capacity)
      .map(|i| {
        let back = (capacity - i) as i64 * HISTORY_STEP_SECS;
        DataPoint {
          time: node_time(now - Duration::seconds(back)),
          value: MIN_VALUE + rng.gen::<f64>() * 5.0,
        }
      })
      .collect();

    Self { points, capacity }
  }

  /// Append a point drifting at most ±0.5 from the last one, dropping the oldest.
  pub fn tick<R: Rng>(&mut self, now: DateTime<Utc>, rng: &mut R) -> &DataPoint {
    let last = self.points.back().map(|p| p.value).unwrap_or(MIN_VALUE);
    let value = (last + (rng.gen::<f64>() - 0.5)).max(MIN_VALUE);

    if self.points.len() == self.capacity {
      self.points.pop_front();
    }
    self.points.push_back(DataPoint {
      time: node_time(now),
      value,
    });
    &self.points[self.points.len() - 1]
  }

  /// The last `n` points, oldest first.
  pub fn recent(&self, n: usize) -> Vec<DataPoint> {
    let skip = self.points.len().saturating_sub(n);
    self.points.iter().skip(skip).cloned().collect()
  }

  pub fn latest(&self) -> Option<&DataPoint> {
    self.points.back()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand::rngs::StdRng;
  use rand::SeedableRng;

  fn start() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
  }

  #[test]
  fn test_backfill_shape() {
    let mut rng = StdRng::seed_from_u64(7);
    let feed = SeriesFeed::new(40, start(), &mut rng);

    assert_eq!(feed.recent(usize::MAX).len(), 40);
    assert!(feed.recent(40).iter().all(|p| (1.0..6.0).contains(&p.value)));
    // Oldest point is 400s before start
    assert_eq!(feed.recent(40)[0].time, node_time(start() - Duration::seconds(400)));
  }

  #[test]
  fn test_tick_keeps_length_and_bounds() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut feed = SeriesFeed::new(10, start(), &mut rng);

    for i in 0..500 {
      let before = feed.latest().unwrap().value;
      let now = start() + Duration::seconds(5 * i);
      let after = feed.tick(now, &mut rng).value;
      assert!(after >= MIN_VALUE);
      assert!((after - before).abs() <= 0.5 || after == MIN_VALUE);
    }
    assert_eq!(feed.recent(usize::MAX).len(), 10);
  }

  #[test]
  fn test_recent_returns_tail_in_order() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut feed = SeriesFeed::new(5, start(), &mut rng);
    let newest = feed.tick(start() + Duration::seconds(5), &mut rng).clone();

    let recent = feed.recent(3);
    assert_eq!(recent.len(), 3);
    assert_eq!(recent[2], newest);
    assert_eq!(feed.recent(50).len(), 5);
  }
}
