use crate::board::SignalBoard;
use crate::clock::Clock;
use crate::commands::{self, Parsed};
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::gemini::types::{CategorizedSnapshot, Signal, SignalOutcome};
use crate::manual;
use crate::oracle::Oracle;
use crate::query::Query;
use crate::resilience::{CacheResult, CacheSource};
use crate::series::SeriesFeed;
use color_eyre::Result;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Points of history sent with each market scan
const SCAN_WINDOW: usize = 10;
const TICK_RATE: Duration = Duration::from_millis(100);

/// State of the `watch` loop
pub struct App {
  node: String,
  config: Config,
  clock: Arc<dyn Clock>,

  /// Market series, shared with the scan fetcher
  series: Arc<Mutex<SeriesFeed>>,
  board: SignalBoard,
  signal: Query<SignalOutcome>,
  snapshot: Query<CacheResult<CategorizedSnapshot>>,

  last_tick: Instant,
  should_quit: bool,
}

impl App {
  pub fn new(config: Config, oracle: Arc<Oracle>, clock: Arc<dyn Clock>, node: String) -> Self {
    let series = Arc::new(Mutex::new(SeriesFeed::new(
      config.watch.series_len,
      clock.now(),
      &mut rand::thread_rng(),
    )));

    let signal = {
      let (oracle, series, node) = (oracle.clone(), series.clone(), node.clone());
      Query::new(move || {
        let recent = series
          .lock()
          .unwrap_or_else(PoisonError::into_inner)
          .recent(SCAN_WINDOW);
        let (oracle, node) = (oracle.clone(), node.clone());
        async move { Ok(oracle.fetch_market_signal(&recent, &node).await) }
      })
    };

    let snapshot = Query::new(move || {
      let oracle = oracle.clone();
      async move { oracle.fetch_global_market_snapshot().await }
    });

    Self {
      node,
      config,
      clock,
      series,
      board: SignalBoard::new(),
      signal,
      snapshot,
      last_tick: Instant::now(),
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    let mut events = EventHandler::new(TICK_RATE, &self.config.watch);

    info!(node = %self.node, "Watch loop started");
    println!(
      "Watching {} (scan every {}s). Type `help` for commands, Ctrl-C to stop.",
      self.node, self.config.watch.signal_interval_secs
    );

    // Initial data load
    self.signal.fetch();
    self.snapshot.fetch();

    while !self.should_quit {
      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }

    events.stop();
    info!("Watch loop stopped");
    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Tick => self.on_tick(),
      Event::SeriesTick => {
        let now = self.clock.now();
        let mut series = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        let point = series.tick(now, &mut rand::thread_rng());
        debug!(time = %point.time, value = point.value, "Series tick");
      }
      Event::ScanDue => self.signal.fetch(),
      Event::SnapshotDue => self.snapshot.fetch(),
      Event::Command(line) => self.handle_command(&line),
      Event::Shutdown => self.should_quit = true,
    }
  }

  fn on_tick(&mut self) {
    let now = Instant::now();
    let elapsed = now.duration_since(self.last_tick);
    self.last_tick = now;

    for signal in self.board.tick(elapsed) {
      println!("[{}] expired at x{:.2}", signal.id, signal.multiplier);
    }

    if self.signal.poll() {
      self.on_signal();
    }
    if self.snapshot.poll() {
      let state = self.snapshot.state();
      if let Some(result) = state.data() {
        println!("{}", render_snapshot(result));
      } else if let Some(e) = state.error() {
        match self.snapshot.last_data() {
          Some(last) => println!("Market sync failed ({}), showing {}", e, render_age(last)),
          None => println!("Market sync failed: {}", e),
        }
      }
    }
  }

  fn on_signal(&mut self) {
    let Some(outcome) = self.signal.state().data() else {
      return;
    };
    println!("{}", render_outcome(outcome));
    if let Some(signal) = outcome.live().cloned() {
      self.board.push(signal);
    }
  }

  fn handle_command(&mut self, line: &str) {
    let (cmd, args) = match commands::parse(line) {
      Parsed::Command(cmd, args) => (cmd, args),
      Parsed::Empty => return,
      Parsed::Unknown(head) => {
        match commands::get_suggestions(head).first() {
          Some(guess) => println!("Unknown command `{}`. Did you mean `{}`?", head, guess.name),
          None => println!("Unknown command `{}`. Type `help`.", head),
        }
        return;
      }
    };

    match cmd.name {
      "scan" => {
        if self.signal.is_loading() {
          println!("Scan already in progress");
        } else {
          self.signal.fetch();
        }
      }
      "manual" => {
        let values = manual::parse_multipliers(args);
        match manual::manual_signal(&values, &self.node, self.clock.now()) {
          Some(signal) => {
            println!("{}", render_signal(&signal));
            self.board.push(signal);
          }
          None => println!("Usage: {}", cmd.usage),
        }
      }
      "edit" => self.edit_signal(args, cmd.usage),
      "signals" => {
        let series = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(point) = series.latest() {
          println!("{} at x{:.2} ({})", self.node, point.value, point.time);
        }
        drop(series);
        if self.board.is_empty() {
          println!("No active signals");
        }
        for signal in self.board.active() {
          println!("{}", render_signal(signal));
        }
      }
      "markets" => match self.snapshot.last_data() {
        Some(result) => println!("{}", render_snapshot(result)),
        None if self.snapshot.is_loading() => println!("Market sync in progress"),
        None => println!("No market data yet"),
      },
      "help" => {
        for c in commands::COMMANDS {
          println!("  {:<36} {}", c.usage, c.description);
        }
      }
      "quit" => self.should_quit = true,
      _ => {}
    }
  }

  fn edit_signal(&mut self, args: &str, usage: &str) {
    let parts: Vec<&str> = args.split_whitespace().collect();
    let parsed = match parts.as_slice() {
      [id, multiplier, seconds] => multiplier
        .parse::<f64>()
        .ok()
        .zip(seconds.parse::<f64>().ok())
        .filter(|(m, s)| m.is_finite() && s.is_finite())
        .map(|(m, s)| (*id, m, s)),
      _ => None,
    };

    match parsed {
      Some((id, multiplier, seconds)) => {
        if self.board.update(id, multiplier, seconds) {
          println!("[{}] now x{:.2} in {:.1}s", id, multiplier, seconds);
        } else {
          println!("No active signal {}", id);
        }
      }
      None => println!("Usage: {}", usage),
    }
  }
}

fn render_signal(signal: &Signal) -> String {
  format!(
    "[{}] {}{} {:.0}% x{:.2} in {:.1}s (crash {}) | {}",
    signal.id,
    if signal.is_manual { "MANUAL " } else { "" },
    signal.direction,
    signal.confidence,
    signal.multiplier,
    signal.time_remaining,
    signal.timestamp,
    signal.reasoning
  )
}

fn render_outcome(outcome: &SignalOutcome) -> String {
  match outcome.live() {
    Some(signal) => render_signal(signal),
    None => format!(
      "{} {:.0}% | {}",
      outcome.direction(),
      outcome.confidence(),
      outcome.reasoning()
    ),
  }
}

fn render_age(result: &CacheResult<CategorizedSnapshot>) -> String {
  format!("data from {}", result.fetched_at.format("%H:%M:%S UTC"))
}

fn render_snapshot(result: &CacheResult<CategorizedSnapshot>) -> String {
  let source = match result.source {
    CacheSource::Network => "live",
    CacheSource::CacheFresh => "cached",
    CacheSource::Offline => "stale",
  };
  let mut out = format!("Markets ({}, {}):", source, render_age(result));

  let sections = [
    ("LIVE", &result.data.live),
    ("UPCOMING", &result.data.upcoming),
    ("HIGHLIGHTED", &result.data.highlighted),
  ];
  for (title, fixtures) in sections {
    for f in fixtures.iter() {
      out.push_str(&format!("\n  {:<11} {}", title, f.fixture));
      if !f.league.is_empty() {
        out.push_str(&format!(" [{}]", f.league));
      }
      if let Some(score) = &f.score {
        out.push_str(&format!(" {}", score));
      }
      if let Some(minute) = f.minute {
        out.push_str(&format!(" {}'", minute));
      }
      if let Some(odds) = &f.odds {
        out.push_str(&format!(" 1X2 {:.2}/{:.2}/{:.2}", odds.home, odds.draw, odds.away));
      }
    }
  }
  if result.data.is_empty() {
    out.push_str("\n  (no fixtures)");
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::ManualClock;
  use crate::gemini::types::{Direction, FallbackSignal, MarketFixture, Odds};
  use crate::gemini::{CompletionRequest, CompletionService};
  use crate::resilience::{CallError, ErrorClass};
  use futures::future::BoxFuture;

  /// Service that is always down.
  struct Offline;

  impl CompletionService for Offline {
    fn generate<'a>(&'a self, _request: &'a CompletionRequest) -> BoxFuture<'a, Result<String, CallError>> {
      Box::pin(async { Err(CallError::from_response(400, None, "offline")) })
    }
  }

  fn watch_app() -> App {
    let clock = Arc::new(ManualClock::new());
    let config = Config::default();
    let oracle = Arc::new(Oracle::new(&config, Arc::new(Offline), clock.clone()));
    App::new(config, oracle, clock, "Betway Botswana".to_string())
  }

  #[tokio::test]
  async fn test_manual_command_adds_signal() {
    let mut app = watch_app();
    app.handle_event(Event::Command("manual 1.4, 3.0".to_string()));

    let active = app.board.active();
    assert_eq!(active.len(), 1);
    assert!(active[0].is_manual);
    assert_eq!(active[0].direction, Direction::Up);
  }

  #[tokio::test]
  async fn test_edit_command_overrides_signal() {
    let mut app = watch_app();
    app.handle_event(Event::Command("m 1.5".to_string()));
    let id = app.board.active()[0].id.clone();

    app.handle_event(Event::Command(format!("edit {} 7.5 3", id)));

    let signal = app.board.active()[0];
    assert_eq!(signal.multiplier, 7.5);
    assert_eq!(signal.time_remaining, 3.0);
  }

  #[tokio::test]
  async fn test_edit_rejects_non_finite_values() {
    let mut app = watch_app();
    app.handle_event(Event::Command("m 1.5".to_string()));
    let (id, multiplier, remaining) = {
      let s = app.board.active()[0];
      (s.id.clone(), s.multiplier, s.time_remaining)
    };

    app.handle_event(Event::Command(format!("edit {} NaN 3", id)));
    app.handle_event(Event::Command(format!("edit {} 2.0 inf", id)));
    app.handle_event(Event::Command(format!("edit {} -inf 3", id)));

    let signal = app.board.active()[0];
    assert_eq!(signal.multiplier, multiplier);
    assert_eq!(signal.time_remaining, remaining);
  }

  #[tokio::test]
  async fn test_quit_and_shutdown() {
    let mut app = watch_app();
    app.handle_event(Event::Command("q".to_string()));
    assert!(app.should_quit);

    let mut app = watch_app();
    app.handle_event(Event::Shutdown);
    assert!(app.should_quit);
  }

  #[tokio::test]
  async fn test_failed_scan_keeps_board_empty() {
    let mut app = watch_app();
    app.handle_event(Event::ScanDue);
    assert!(app.signal.is_loading());

    tokio::time::sleep(Duration::from_millis(20)).await;
    app.handle_event(Event::Tick);

    assert!(app.signal.state().data().is_some_and(|o| o.is_fallback()));
    assert!(app.board.is_empty());
  }

  #[tokio::test]
  async fn test_series_tick_advances_series() {
    let mut app = watch_app();
    let before = app.series.lock().unwrap().latest().cloned();
    app.handle_event(Event::SeriesTick);
    let after = app.series.lock().unwrap().latest().cloned();

    assert_eq!(
      app.series.lock().unwrap().recent(usize::MAX).len(),
      Config::default().watch.series_len
    );
    assert_ne!(before, after);
  }

  #[test]
  fn test_render_fallback_outcome() {
    let outcome = SignalOutcome::Fallback(FallbackSignal::new(
      "Node busy",
      ErrorClass::LocalRateLimited,
      chrono::DateTime::from_timestamp(0, 0).unwrap(),
    ));
    assert_eq!(render_outcome(&outcome), "NEUTRAL 0% | Node busy");
  }

  #[test]
  fn test_render_snapshot() {
    let result = CacheResult {
      data: CategorizedSnapshot {
        live: vec![MarketFixture {
          fixture: "Rollers vs Galaxy".to_string(),
          league: "BPL".to_string(),
          score: Some("1-0".to_string()),
          odds: Some(Odds {
            home: 1.8,
            draw: 3.2,
            away: 4.5,
          }),
          minute: Some(63),
        }],
        ..Default::default()
      },
      source: CacheSource::CacheFresh,
      fetched_at: chrono::DateTime::from_timestamp(0, 0).unwrap(),
    };

    let text = render_snapshot(&result);
    assert!(text.starts_with("Markets (cached, data from 00:00:00 UTC):"));
    assert!(text.contains("LIVE        Rollers vs Galaxy [BPL] 1-0 63' 1X2 1.80/3.20/4.50"));
  }
}
