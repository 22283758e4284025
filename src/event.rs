use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::WatchConfig;
use crate::query::Periodic;

/// Watch loop events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
  /// Periodic tick for query polling and signal countdown
  Tick,
  /// Time to append a point to the market series
  SeriesTick,
  /// Time for an automatic market scan
  ScanDue,
  /// Time to refresh the global market snapshot
  SnapshotDue,
  /// A line typed on stdin
  Command(String),
  /// Ctrl-C or end of input
  Shutdown,
}

/// Produces events from timers, stdin and Ctrl-C.
///
/// Dropping the handler cancels every timer.
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
  timers: Vec<Periodic>,
}

impl EventHandler {
  pub fn new(tick_rate: Duration, watch: &WatchConfig) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    let timers = vec![
      timer(&tx, tick_rate, Event::Tick),
      timer(&tx, Duration::from_secs(watch.series_interval_secs), Event::SeriesTick),
      timer(&tx, Duration::from_secs(watch.signal_interval_secs), Event::ScanDue),
      timer(&tx, Duration::from_secs(watch.snapshot_interval_secs), Event::SnapshotDue),
    ];

    // stdin reader
    let stdin_tx = tx.clone();
    tokio::spawn(async move {
      let mut lines = BufReader::new(tokio::io::stdin()).lines();
      loop {
        match lines.next_line().await {
          Ok(Some(line)) => {
            if stdin_tx.send(Event::Command(line)).is_err() {
              break;
            }
          }
          Ok(None) | Err(_) => {
            debug!("stdin closed");
            let _ = stdin_tx.send(Event::Shutdown);
            break;
          }
        }
      }
    });

    // Ctrl-C
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        let _ = tx.send(Event::Shutdown);
      }
    });

    Self {
      rx,
      timers,
    }
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }

  /// Stop every timer. Stdin and Ctrl-C events may still arrive.
  pub fn stop(&self) {
    for timer in &self.timers {
      timer.cancel();
    }
  }
}

fn timer(tx: &mpsc::UnboundedSender<Event>, period: Duration, event: Event) -> Periodic {
  let tx = tx.clone();
  Periodic::spawn(period, move || tx.send(event.clone()).is_ok())
}
