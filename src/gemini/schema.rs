//! Output schemas sent with requests, and validation of what comes back.
//!
//! The service is asked for JSON matching a schema, but nothing guarantees it
//! complies. Every response is parsed into a typed struct and then checked;
//! any mismatch is reported as `Malformed` and never retried.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use super::types::{CategorizedSnapshot, Direction, MarketFixture, SportsPrediction};
use crate::resilience::CallError;

/// Post-parse sanity checks for a response type.
pub trait Validate {
  fn validate(&self) -> Result<(), String>;
}

/// Parse `text` as JSON into `T` and validate it.
pub fn parse_validated<T: DeserializeOwned + Validate>(text: &str) -> Result<T, CallError> {
  let value: T = serde_json::from_str(text.trim()).map_err(CallError::malformed)?;
  value.validate().map_err(CallError::malformed)?;
  Ok(value)
}

/// Longest crash delay accepted from the model
pub const MAX_DELAY_SECS: f64 = 3600.0;

fn check_confidence(confidence: f64) -> Result<(), String> {
  if confidence.is_finite() && (0.0..=100.0).contains(&confidence) {
    Ok(())
  } else {
    Err(format!("confidence {} outside 0..=100", confidence))
  }
}

// ============================================================================
// Market signal
// ============================================================================

/// Raw market-signal payload as produced by the model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalPayload {
  pub direction: Direction,
  pub confidence: f64,
  pub reasoning: String,
  pub multiplier: f64,
  pub delay_seconds: f64,
}

impl Validate for SignalPayload {
  fn validate(&self) -> Result<(), String> {
    check_confidence(self.confidence)?;
    if !self.multiplier.is_finite() || self.multiplier <= 0.0 {
      return Err(format!("multiplier {} is not positive", self.multiplier));
    }
    if !(0.0..=MAX_DELAY_SECS).contains(&self.delay_seconds) {
      return Err(format!(
        "delaySeconds {} outside 0..={}",
        self.delay_seconds, MAX_DELAY_SECS
      ));
    }
    Ok(())
  }
}

pub fn signal_schema() -> Value {
  json!({
    "type": "OBJECT",
    "properties": {
      "direction": { "type": "STRING", "enum": ["UP", "DOWN", "NEUTRAL"] },
      "confidence": { "type": "NUMBER" },
      "reasoning": { "type": "STRING" },
      "multiplier": { "type": "NUMBER" },
      "delaySeconds": { "type": "NUMBER" }
    },
    "required": ["direction", "confidence", "reasoning", "multiplier", "delaySeconds"]
  })
}

// ============================================================================
// Sports analysis
// ============================================================================

impl Validate for SportsPrediction {
  fn validate(&self) -> Result<(), String> {
    if self.fixture.trim().is_empty() {
      return Err("match is empty".to_string());
    }
    check_confidence(self.confidence)?;
    if let Some(bad) = self.squad_nodes.iter().find(|n| !n.impact.is_finite()) {
      return Err(format!("squad node {} has no numeric impact", bad.name));
    }
    Ok(())
  }
}

pub fn sports_schema() -> Value {
  json!({
    "type": "OBJECT",
    "properties": {
      "sport": { "type": "STRING" },
      "league": { "type": "STRING" },
      "match": { "type": "STRING" },
      "prediction": { "type": "STRING" },
      "odds": { "type": "STRING" },
      "confidence": { "type": "NUMBER" },
      "aiFix": { "type": "STRING" },
      "form": { "type": "ARRAY", "items": { "type": "STRING" } },
      "performanceIndex": { "type": "ARRAY", "items": { "type": "NUMBER" } },
      "goalsPerGame": { "type": "NUMBER" },
      "cleanSheetChance": { "type": "NUMBER" },
      "history": {
        "type": "ARRAY",
        "items": {
          "type": "OBJECT",
          "properties": {
            "opponent": { "type": "STRING" },
            "score": { "type": "STRING" },
            "result": { "type": "STRING", "enum": ["W", "L", "D"] },
            "date": { "type": "STRING" }
          },
          "required": ["opponent", "score", "result"]
        }
      },
      "squadNodes": {
        "type": "ARRAY",
        "items": {
          "type": "OBJECT",
          "properties": {
            "name": { "type": "STRING" },
            "impact": { "type": "NUMBER" }
          },
          "required": ["name", "impact"]
        }
      }
    },
    "required": ["match", "prediction", "confidence"]
  })
}

// ============================================================================
// Global market snapshot
// ============================================================================

fn check_fixture(fixture: &MarketFixture) -> Result<(), String> {
  if let Some(odds) = fixture.odds {
    let all_valid = [odds.home, odds.draw, odds.away]
      .iter()
      .all(|o| o.is_finite() && *o > 0.0);
    if !all_valid {
      return Err(format!("invalid odds for {}", fixture.fixture));
    }
  }
  Ok(())
}

/// Snapshot as sent, before individual fixtures are checked.
#[derive(Debug, Deserialize)]
struct RawSnapshot {
  #[serde(default)]
  live: Vec<Value>,
  #[serde(default)]
  upcoming: Vec<Value>,
  #[serde(default)]
  highlighted: Vec<Value>,
}

/// Keep the fixtures that parse and validate, dropping the rest.
fn keep_valid(section: &str, entries: Vec<Value>) -> Vec<MarketFixture> {
  let total = entries.len();
  let kept: Vec<MarketFixture> = entries
    .into_iter()
    .filter_map(|entry| serde_json::from_value::<MarketFixture>(entry).ok())
    .filter(|fixture| check_fixture(fixture).is_ok())
    .collect();

  if kept.len() < total {
    warn!(section, dropped = total - kept.len(), "Dropped unusable fixtures from snapshot");
  }
  kept
}

/// Parse a market snapshot.
///
/// Only a body that is not a snapshot object at all is `Malformed`; a single
/// bad fixture is dropped and the rest of the snapshot kept.
pub fn parse_snapshot(text: &str) -> Result<CategorizedSnapshot, CallError> {
  let raw: RawSnapshot = serde_json::from_str(text.trim()).map_err(CallError::malformed)?;
  Ok(CategorizedSnapshot {
    live: keep_valid("live", raw.live),
    upcoming: keep_valid("upcoming", raw.upcoming),
    highlighted: keep_valid("highlighted", raw.highlighted),
  })
}

pub fn snapshot_schema() -> Value {
  let fixture = json!({
    "type": "OBJECT",
    "properties": {
      "match": { "type": "STRING" },
      "league": { "type": "STRING" },
      "score": { "type": "STRING" },
      "odds": {
        "type": "OBJECT",
        "properties": {
          "home": { "type": "NUMBER" },
          "draw": { "type": "NUMBER" },
          "away": { "type": "NUMBER" }
        },
        "required": ["home", "draw", "away"]
      },
      "minute": { "type": "INTEGER" }
    },
    "required": ["match"]
  });

  json!({
    "type": "OBJECT",
    "properties": {
      "live": { "type": "ARRAY", "items": fixture.clone() },
      "upcoming": { "type": "ARRAY", "items": fixture.clone() },
      "highlighted": { "type": "ARRAY", "items": fixture }
    },
    "required": ["live", "upcoming", "highlighted"]
  })
}
