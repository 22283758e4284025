//! Domain types handed to the presentation layer.

use chrono::{DateTime, FixedOffset, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::resilience::ErrorClass;

/// Botswana is on CAT (UTC+2) all year round.
const GABORONE_OFFSET_SECS: i32 = 2 * 3600;

/// Format a time as `HH:MM:SS` on the Gaborone wall clock.
pub fn node_time(at: DateTime<Utc>) -> String {
  match FixedOffset::east_opt(GABORONE_OFFSET_SECS) {
    Some(offset) => at.with_timezone(&offset).format("%H:%M:%S").to_string(),
    None => at.format("%H:%M:%S").to_string(),
  }
}

/// Random short id with a readable prefix, e.g. `sig-k3x9q0a`.
pub fn new_id(prefix: &str, len: usize) -> String {
  let suffix: String = rand::thread_rng()
    .sample_iter(&Alphanumeric)
    .take(len)
    .map(|c| char::from(c).to_ascii_lowercase())
    .collect();
  format!("{}-{}", prefix, suffix)
}

/// One sample of the market series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
  pub time: String,
  pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
  Up,
  Down,
  Neutral,
}

impl std::fmt::Display for Direction {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(match self {
      Direction::Up => "UP",
      Direction::Down => "DOWN",
      Direction::Neutral => "NEUTRAL",
    })
  }
}

/// A crash-game prediction, either generated or entered manually.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
  pub id: String,
  pub direction: Direction,
  /// 0 to 100
  pub confidence: f64,
  pub reasoning: String,
  pub multiplier: f64,
  /// Seconds until the predicted crash
  pub time_remaining: f64,
  pub market_node: String,
  /// Predicted crash time on the node's wall clock
  pub timestamp: String,
  pub is_manual: bool,
}

/// Stand-in returned when a market signal could not be produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackSignal {
  pub id: String,
  pub direction: Direction,
  pub confidence: f64,
  pub reasoning: String,
  pub timestamp: String,
  #[serde(skip)]
  pub cause: ErrorClass,
}

impl FallbackSignal {
  pub fn new(reasoning: impl Into<String>, cause: ErrorClass, now: DateTime<Utc>) -> Self {
    Self {
      id: format!("error-{}", now.timestamp_millis()),
      direction: Direction::Neutral,
      confidence: 0.0,
      reasoning: reasoning.into(),
      timestamp: "--:--".to_string(),
      cause,
    }
  }
}

/// Outcome of a market-signal request. Always renderable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SignalOutcome {
  Live(Signal),
  Fallback(FallbackSignal),
}

impl SignalOutcome {
  pub fn direction(&self) -> Direction {
    match self {
      SignalOutcome::Live(s) => s.direction,
      SignalOutcome::Fallback(f) => f.direction,
    }
  }

  pub fn confidence(&self) -> f64 {
    match self {
      SignalOutcome::Live(s) => s.confidence,
      SignalOutcome::Fallback(f) => f.confidence,
    }
  }

  pub fn reasoning(&self) -> &str {
    match self {
      SignalOutcome::Live(s) => &s.reasoning,
      SignalOutcome::Fallback(f) => &f.reasoning,
    }
  }

  pub fn live(&self) -> Option<&Signal> {
    match self {
      SignalOutcome::Live(s) => Some(s),
      SignalOutcome::Fallback(_) => None,
    }
  }

  pub fn is_fallback(&self) -> bool {
    matches!(self, SignalOutcome::Fallback(_))
  }
}

// ============================================================================
// Sports
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchResult {
  W,
  L,
  D,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchHistoryItem {
  pub opponent: String,
  pub score: String,
  pub result: MatchResult,
  #[serde(default)]
  pub date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SquadNode {
  pub name: String,
  pub impact: f64,
}

/// Deep analysis of a single football match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SportsPrediction {
  #[serde(default)]
  pub sport: String,
  #[serde(default)]
  pub league: String,
  #[serde(rename = "match")]
  pub fixture: String,
  pub prediction: String,
  #[serde(default)]
  pub odds: String,
  pub confidence: f64,
  #[serde(default)]
  pub ai_fix: String,
  #[serde(default)]
  pub form: Vec<String>,
  #[serde(default)]
  pub performance_index: Vec<f64>,
  #[serde(default)]
  pub goals_per_game: f64,
  #[serde(default)]
  pub clean_sheet_chance: f64,
  #[serde(default)]
  pub history: Vec<MatchHistoryItem>,
  #[serde(default)]
  pub squad_nodes: Vec<SquadNode>,
}

// ============================================================================
// Global market snapshot
// ============================================================================

/// 1X2 odds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Odds {
  pub home: f64,
  pub draw: f64,
  pub away: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketFixture {
  #[serde(rename = "match")]
  pub fixture: String,
  #[serde(default)]
  pub league: String,
  #[serde(default)]
  pub score: Option<String>,
  #[serde(default)]
  pub odds: Option<Odds>,
  #[serde(default)]
  pub minute: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategorizedSnapshot {
  #[serde(default)]
  pub live: Vec<MarketFixture>,
  #[serde(default)]
  pub upcoming: Vec<MarketFixture>,
  #[serde(default)]
  pub highlighted: Vec<MarketFixture>,
}

impl CategorizedSnapshot {
  pub fn len(&self) -> usize {
    self.live.len() + self.upcoming.len() + self.highlighted.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
