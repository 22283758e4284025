//! Prediction operations exposed to the presentation layer.
//!
//! `Oracle` owns all state the operations share (the snapshot cache and the
//! scan cooldown), so separate instances never interfere with each other.

use chrono::Duration;
use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::{Config, RetryConfig};
use crate::gemini::schema::{self, SignalPayload};
use crate::gemini::types::{
  new_id, node_time, CategorizedSnapshot, DataPoint, FallbackSignal, Signal, SignalOutcome,
  SportsPrediction,
};
use crate::gemini::{CompletionRequest, CompletionService, Part};
use crate::resilience::{
  with_retry, CacheResult, CallError, CooldownGate, ErrorClass, TtlCache,
};

/// Crash delay assumed when the model predicts none.
const DEFAULT_CRASH_DELAY_SECS: f64 = 30.0;
const IMAGE_UNAVAILABLE: &str = "Analysis result unavailable.";

pub struct Oracle {
  service: Arc<dyn CompletionService>,
  clock: Arc<dyn Clock>,
  text_model: String,
  vision_model: String,
  retry: RetryConfig,
  exhausted_reason: String,
  snapshot_cache: TtlCache<CategorizedSnapshot>,
  signal_gate: CooldownGate,
}

impl Oracle {
  pub fn new(config: &Config, service: Arc<dyn CompletionService>, clock: Arc<dyn Clock>) -> Self {
    let snapshot_cache = TtlCache::new(Duration::milliseconds(config.snapshot.ttl_ms), clock.clone())
      .with_stale_policy(config.snapshot.stale_policy());
    let signal_gate = CooldownGate::new(Duration::milliseconds(config.signal.cooldown_ms), clock.clone());

    Self {
      service,
      clock,
      text_model: config.service.text_model.clone(),
      vision_model: config.service.vision_model.clone(),
      retry: config.retry.clone(),
      exhausted_reason: config.signal.exhausted_reason.clone(),
      snapshot_cache,
      signal_gate,
    }
  }

  /// Predict the next crash for `node` from its recent series.
  ///
  /// Never fails: a blocked or failed scan comes back as a zero-confidence
  /// `NEUTRAL` fallback explaining what happened.
  pub async fn fetch_market_signal(&self, recent: &[DataPoint], node: &str) -> SignalOutcome {
    let result = self
      .signal_gate
      .run(|| {
        with_retry(&self.retry.signal, self.clock.as_ref(), "market_signal", || {
          self.request_signal(recent, node)
        })
      })
      .await;

    match result {
      Ok(signal) => {
        info!(node, direction = %signal.direction, confidence = signal.confidence, "Market signal received");
        SignalOutcome::Live(signal)
      }
      Err(error) => {
        warn!(node, class = %error.class(), error = %error, "Market signal unavailable, using fallback");
        SignalOutcome::Fallback(self.fallback_for(&error))
      }
    }
  }

  fn fallback_for(&self, error: &CallError) -> FallbackSignal {
    let class = error.class();
    let reasoning = match class {
      ErrorClass::LocalRateLimited => error.to_string(),
      _ => self.exhausted_reason.clone(),
    };
    FallbackSignal::new(reasoning, class, self.clock.now())
  }

  async fn request_signal(&self, recent: &[DataPoint], node: &str) -> Result<Signal, CallError> {
    let request = CompletionRequest::text(&self.text_model, signal_prompt(recent, node))
      .with_schema(schema::signal_schema());

    let text = self.service.generate(&request).await?;
    let payload: SignalPayload = schema::parse_validated(&text)?;

    let delay = if payload.delay_seconds > 0.0 {
      payload.delay_seconds
    } else {
      DEFAULT_CRASH_DELAY_SECS
    };
    let crash_at = self
      .clock
      .now()
      .checked_add_signed(Duration::milliseconds((delay * 1000.0).round() as i64))
      .ok_or_else(|| CallError::malformed(format!("delaySeconds {} out of range", delay)))?;

    Ok(Signal {
      id: new_id("sig", 7),
      direction: payload.direction,
      confidence: payload.confidence,
      reasoning: payload.reasoning,
      multiplier: payload.multiplier,
      time_remaining: delay,
      market_node: node.to_string(),
      timestamp: node_time(crash_at),
      is_manual: false,
    })
  }

  /// Analyse a football match described in free text.
  pub async fn fetch_sports_analysis(&self, query: &str) -> Result<SportsPrediction, CallError> {
    let request = CompletionRequest::text(&self.text_model, sports_prompt(query))
      .with_schema(schema::sports_schema());

    let (service, request) = (&self.service, &request);
    with_retry(&self.retry.sports, self.clock.as_ref(), "sports_analysis", || async move {
      let text = service.generate(request).await?;
      schema::parse_validated::<SportsPrediction>(&text)
    })
    .await
    .inspect_err(|error| warn!(query, class = %error.class(), error = %error, "Sports analysis failed"))
  }

  /// Live, upcoming and highlighted fixtures, served from cache within the TTL.
  pub async fn fetch_global_market_snapshot(
    &self,
  ) -> Result<CacheResult<CategorizedSnapshot>, CallError> {
    let request = CompletionRequest::text(&self.text_model, SNAPSHOT_PROMPT)
      .with_schema(schema::snapshot_schema());

    let (service, request) = (&self.service, &request);
    self
      .snapshot_cache
      .get_or_refresh(|| {
        with_retry(&self.retry.snapshot, self.clock.as_ref(), "market_snapshot", || async move {
          let text = service.generate(request).await?;
          if text.trim().is_empty() {
            return Ok(CategorizedSnapshot::default());
          }
          schema::parse_snapshot(&text)
        })
      })
      .await
      .inspect_err(|error| warn!(class = %error.class(), error = %error, "Market snapshot refresh failed"))
  }

  /// Describe a crash-game screenshot. `image` is base64 JPEG data, optionally
  /// as a `data:` URL.
  pub async fn analyze_crash_image(&self, image: &str, prompt: &str) -> Result<String, CallError> {
    let request = CompletionRequest {
      model: self.vision_model.clone(),
      parts: vec![
        Part::InlineImage {
          mime_type: "image/jpeg".to_string(),
          data: strip_data_url(image).to_string(),
        },
        Part::Text(format!(
          "Analyze Aviator image. User says: \"{}\". Identify multipliers and trends.",
          prompt
        )),
      ],
      response_mime_type: None,
      response_schema: None,
    };

    let (service, request) = (&self.service, &request);
    let text = with_retry(&self.retry.image, self.clock.as_ref(), "image_analysis", || {
      service.generate(request)
    })
    .await
    .inspect_err(|error| warn!(class = %error.class(), error = %error, "Image analysis failed"))?;

    if text.trim().is_empty() {
      Ok(IMAGE_UNAVAILABLE.to_string())
    } else {
      Ok(text)
    }
  }
}

/// Payload of a `data:<mime>;base64,<payload>` URL, or the input unchanged.
fn strip_data_url(image: &str) -> &str {
  match image.strip_prefix("data:").and_then(|rest| rest.split_once(',')) {
    Some((_, payload)) => payload,
    None => image,
  }
}

fn signal_prompt(recent: &[DataPoint], node: &str) -> String {
  let series = recent
    .iter()
    .map(|p| format!("[{}: {:.2}]", p.time, p.value))
    .collect::<Vec<_>>()
    .join(", ");

  format!(
    "Analyze this market trend data for the \"{node}\" Aviator/Crash game.\n\
     Current Node: {node}. Focus on specific server patterns for this provider.\n\
     Predict the next crash multiplier and the exact delay (seconds from now).\n\
     Recent values: {series}.\n\
     Return JSON: {{direction: 'UP'|'DOWN', confidence: 0-100, reasoning: string, \
     multiplier: number, delaySeconds: number}}."
  )
}

fn sports_prompt(query: &str) -> String {
  format!(
    "Perform deep football analysis for Betway Botswana: \"{}\".\n\
     Return strictly JSON with full metrics.",
    query
  )
}

const SNAPSHOT_PROMPT: &str = "Scan global markets. For live matches, include real-time scores and \
  1X2 odds. Return JSON: {live:[{match:string, league:string, score:string, \
  odds:{home:number, draw:number, away:number}, minute:number}], upcoming:[], highlighted:[]}";

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::ManualClock;
  use crate::gemini::types::Direction;
  use crate::resilience::CacheSource;
  use futures::future::BoxFuture;
  use std::collections::VecDeque;
  use std::sync::Mutex;

  /// Completion service replaying scripted responses. Once the script runs
  /// out, every call returns `tail`.
  struct FakeService {
    script: Mutex<VecDeque<Result<String, CallError>>>,
    tail: Result<String, CallError>,
    requests: Mutex<Vec<CompletionRequest>>,
  }

  impl FakeService {
    fn new(script: Vec<Result<&str, CallError>>, tail: Result<&str, CallError>) -> Arc<Self> {
      Arc::new(Self {
        script: Mutex::new(script.into_iter().map(|r| r.map(String::from)).collect()),
        tail: tail.map(String::from),
        requests: Mutex::new(Vec::new()),
      })
    }

    fn calls(&self) -> usize {
      self.requests.lock().unwrap().len()
    }

    fn last_request(&self) -> CompletionRequest {
      self.requests.lock().unwrap().last().cloned().unwrap()
    }
  }

  impl CompletionService for FakeService {
    fn generate<'a>(&'a self, request: &'a CompletionRequest) -> BoxFuture<'a, Result<String, CallError>> {
      self.requests.lock().unwrap().push(request.clone());
      let next = self
        .script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| self.tail.clone());
      Box::pin(async move { next })
    }
  }

  const SIGNAL_JSON: &str = r#"{"direction":"UP","confidence":91,"reasoning":"Pattern lock",
    "multiplier":3.2,"delaySeconds":30}"#;

  fn oracle(service: &Arc<FakeService>, clock: &ManualClock) -> Oracle {
    Oracle::new(&Config::default(), service.clone(), Arc::new(clock.clone()))
  }

  fn series() -> Vec<DataPoint> {
    vec![
      DataPoint {
        time: "10:00:00".to_string(),
        value: 1.5,
      },
      DataPoint {
        time: "10:00:05".to_string(),
        value: 2.25,
      },
    ]
  }

  fn throttled() -> CallError {
    CallError::from_response(429, Some("RESOURCE_EXHAUSTED"), "quota")
  }

  #[tokio::test]
  async fn test_market_signal_success() {
    let clock = ManualClock::new();
    let service = FakeService::new(vec![], Ok(SIGNAL_JSON));
    let oracle = oracle(&service, &clock);

    let outcome = oracle.fetch_market_signal(&series(), "Betway Botswana").await;
    let signal = outcome.live().expect("live signal");

    assert_eq!(signal.direction, Direction::Up);
    assert_eq!(signal.confidence, 91.0);
    assert_eq!(signal.market_node, "Betway Botswana");
    assert_eq!(signal.time_remaining, 30.0);
    // epoch + 30s on a UTC+2 wall clock
    assert_eq!(signal.timestamp, "02:00:30");
    assert!(!signal.is_manual);

    let request = service.last_request();
    assert!(request.prompt().contains("[10:00:05: 2.25]"));
    assert!(request.response_schema.is_some());
  }

  #[tokio::test]
  async fn test_market_signal_zero_delay_defaults_to_thirty_seconds() {
    let clock = ManualClock::new();
    let service = FakeService::new(
      vec![],
      Ok(r#"{"direction":"DOWN","confidence":40,"reasoning":"r","multiplier":1.1,"delaySeconds":0}"#),
    );
    let oracle = oracle(&service, &clock);

    let outcome = oracle.fetch_market_signal(&series(), "n").await;
    assert_eq!(outcome.live().unwrap().time_remaining, 30.0);
  }

  #[tokio::test]
  async fn test_market_signal_cooldown() {
    let clock = ManualClock::new();
    let service = FakeService::new(vec![], Ok(SIGNAL_JSON));
    let oracle = oracle(&service, &clock);

    assert!(!oracle.fetch_market_signal(&series(), "n").await.is_fallback());
    assert_eq!(service.calls(), 1);

    clock.set_ms(14_999);
    let blocked = oracle.fetch_market_signal(&series(), "n").await;
    match &blocked {
      SignalOutcome::Fallback(f) => {
        assert_eq!(f.cause, ErrorClass::LocalRateLimited);
        assert!(f.reasoning.starts_with("Local Rate Limit"));
      }
      other => panic!("expected fallback, got {:?}", other),
    }
    assert_eq!(blocked.confidence(), 0.0);
    assert_eq!(service.calls(), 1);

    clock.set_ms(15_001);
    assert!(!oracle.fetch_market_signal(&series(), "n").await.is_fallback());
    assert_eq!(service.calls(), 2);
  }

  #[tokio::test]
  async fn test_market_signal_exhaustion_returns_sentinel() {
    let clock = ManualClock::new();
    let service = FakeService::new(vec![], Err(throttled()));
    let oracle = oracle(&service, &clock);

    let outcome = oracle.fetch_market_signal(&series(), "n").await;

    assert!(outcome.is_fallback());
    assert_eq!(outcome.confidence(), 0.0);
    assert_eq!(outcome.direction(), Direction::Neutral);
    assert!(!outcome.reasoning().is_empty());
    assert_eq!(outcome.reasoning(), Config::default().signal.exhausted_reason);
    // Default signal policy: 2 attempts, one 15s backoff
    assert_eq!(service.calls(), 2);
    assert_eq!(clock.sleeps(), vec![std::time::Duration::from_millis(15_000)]);
  }

  #[tokio::test]
  async fn test_failed_scan_does_not_start_cooldown() {
    let clock = ManualClock::new();
    let service = FakeService::new(vec![Err(CallError::from_response(400, None, "bad"))], Ok(SIGNAL_JSON));
    let oracle = oracle(&service, &clock);

    assert!(oracle.fetch_market_signal(&series(), "n").await.is_fallback());
    assert!(!oracle.fetch_market_signal(&series(), "n").await.is_fallback());
    assert_eq!(service.calls(), 2);
  }

  #[tokio::test]
  async fn test_malformed_signal_is_not_retried() {
    let clock = ManualClock::new();
    let service = FakeService::new(
      vec![],
      Ok(r#"{"direction":"SIDEWAYS","confidence":50,"reasoning":"?","multiplier":2,"delaySeconds":5}"#),
    );
    let oracle = oracle(&service, &clock);

    let outcome = oracle.fetch_market_signal(&series(), "n").await;
    match outcome {
      SignalOutcome::Fallback(f) => assert_eq!(f.cause, ErrorClass::Malformed),
      other => panic!("expected fallback, got {:?}", other),
    }
    assert_eq!(service.calls(), 1);
  }

  #[tokio::test]
  async fn test_huge_delay_becomes_fallback() {
    let clock = ManualClock::new();
    let service = FakeService::new(
      vec![],
      Ok(r#"{"direction":"UP","confidence":50,"reasoning":"r","multiplier":2,"delaySeconds":1e13}"#),
    );
    let oracle = oracle(&service, &clock);

    let outcome = oracle.fetch_market_signal(&[], "n").await;
    match outcome {
      SignalOutcome::Fallback(f) => assert_eq!(f.cause, ErrorClass::Malformed),
      other => panic!("expected fallback, got {:?}", other),
    }
    assert_eq!(service.calls(), 1);
  }

  #[tokio::test]
  async fn test_snapshot_keeps_good_fixtures() {
    let clock = ManualClock::new();
    let service = FakeService::new(
      vec![],
      Ok(r#"{"live":[{"match":"S1","minute":"HT"},{"match":"S2","minute":30}]}"#),
    );
    let oracle = oracle(&service, &clock);

    let snapshot = oracle.fetch_global_market_snapshot().await.unwrap();
    assert_eq!(snapshot.data.live.len(), 1);
    assert_eq!(snapshot.data.live[0].fixture, "S2");
  }

  #[tokio::test]
  async fn test_sports_analysis_retries_server_errors() {
    let clock = ManualClock::new();
    let service = FakeService::new(
      vec![Err(CallError::from_response(503, None, "overloaded"))],
      Ok(r#"{"match":"Zebras vs Bafana","prediction":"Draw","confidence":55}"#),
    );
    let oracle = oracle(&service, &clock);

    let prediction = oracle.fetch_sports_analysis("Zebras vs Bafana").await.unwrap();
    assert_eq!(prediction.prediction, "Draw");
    assert_eq!(service.calls(), 2);
    assert_eq!(clock.sleeps(), vec![std::time::Duration::from_millis(10_000)]);
    assert!(service.last_request().prompt().contains("\"Zebras vs Bafana\""));
  }

  #[tokio::test]
  async fn test_sports_analysis_propagates_malformed() {
    let clock = ManualClock::new();
    let service = FakeService::new(vec![], Ok("not json at all"));
    let oracle = oracle(&service, &clock);

    let err = oracle.fetch_sports_analysis("anything").await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Malformed);
    assert_eq!(service.calls(), 1);
  }

  #[tokio::test]
  async fn test_snapshot_cache_scenario() {
    let clock = ManualClock::new();
    let service = FakeService::new(
      vec![
        Ok(r#"{"live":[{"match":"S1"}],"upcoming":[],"highlighted":[]}"#),
        Ok(r#"{"live":[{"match":"S2"}],"upcoming":[],"highlighted":[]}"#),
      ],
      Err(throttled()),
    );
    let oracle = oracle(&service, &clock);

    let first = oracle.fetch_global_market_snapshot().await.unwrap();
    assert_eq!(first.data.live[0].fixture, "S1");
    assert_eq!(first.source, CacheSource::Network);

    clock.set_ms(599_999);
    let second = oracle.fetch_global_market_snapshot().await.unwrap();
    assert_eq!(second.data, first.data);
    assert_eq!(second.source, CacheSource::CacheFresh);
    assert_eq!(service.calls(), 1);

    clock.set_ms(600_001);
    let third = oracle.fetch_global_market_snapshot().await.unwrap();
    assert_eq!(third.data.live[0].fixture, "S2");
    assert_eq!(service.calls(), 2);
  }

  #[tokio::test]
  async fn test_snapshot_empty_body_is_empty_snapshot() {
    let clock = ManualClock::new();
    let service = FakeService::new(vec![], Ok("  "));
    let oracle = oracle(&service, &clock);

    let snapshot = oracle.fetch_global_market_snapshot().await.unwrap();
    assert!(snapshot.data.is_empty());
  }

  #[tokio::test]
  async fn test_snapshot_failure_propagates_after_retries() {
    let clock = ManualClock::new();
    let service = FakeService::new(vec![], Err(throttled()));
    let oracle = oracle(&service, &clock);

    let err = oracle.fetch_global_market_snapshot().await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::RateLimited);
    assert_eq!(service.calls(), 2);
    assert_eq!(clock.sleeps(), vec![std::time::Duration::from_millis(20_000)]);
  }

  #[tokio::test]
  async fn test_instances_do_not_share_state() {
    let clock = ManualClock::new();
    let service = FakeService::new(vec![], Ok(SIGNAL_JSON));
    let first = oracle(&service, &clock);
    let second = oracle(&service, &clock);

    assert!(!first.fetch_market_signal(&series(), "n").await.is_fallback());
    assert!(!second.fetch_market_signal(&series(), "n").await.is_fallback());
    assert_eq!(service.calls(), 2);
  }

  #[tokio::test]
  async fn test_image_analysis_strips_data_url() {
    let clock = ManualClock::new();
    let service = FakeService::new(vec![], Ok("Multipliers trending 1.2x to 4.8x"));
    let oracle = oracle(&service, &clock);

    let text = oracle
      .analyze_crash_image("data:image/jpeg;base64,QUJD", "what next?")
      .await
      .unwrap();
    assert_eq!(text, "Multipliers trending 1.2x to 4.8x");

    let request = service.last_request();
    assert_eq!(request.model, Config::default().service.vision_model);
    assert_eq!(
      request.parts[0],
      Part::InlineImage {
        mime_type: "image/jpeg".to_string(),
        data: "QUJD".to_string(),
      }
    );
  }

  #[tokio::test]
  async fn test_image_analysis_empty_response() {
    let clock = ManualClock::new();
    let service = FakeService::new(vec![], Ok(""));
    let oracle = oracle(&service, &clock);

    let text = oracle.analyze_crash_image("QUJD", "?").await.unwrap();
    assert_eq!(text, IMAGE_UNAVAILABLE);
  }

  #[test]
  fn test_strip_data_url() {
    assert_eq!(strip_data_url("data:image/png;base64,AAAA"), "AAAA");
    assert_eq!(strip_data_url("AAAA"), "AAAA");
  }
}
