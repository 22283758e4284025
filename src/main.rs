mod app;
mod board;
mod clock;
mod commands;
mod config;
mod event;
mod gemini;
mod logging;
mod manual;
mod oracle;
mod query;
mod resilience;
mod series;

use base64::{engine::general_purpose::STANDARD, Engine};
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::gemini::GeminiClient;
use crate::oracle::Oracle;
use crate::series::SeriesFeed;

#[derive(Parser, Debug)]
#[command(name = "bwu")]
#[command(about = "Resilient prediction client for the BetWireless Ultra dashboard")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./bwu.yaml, then $XDG_CONFIG_HOME/bwu/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
  /// Predict the next crash from a synthetic market series
  Signal {
    /// Market node label (default: signal.default_node)
    #[arg(short, long)]
    node: Option<String>,

    /// Number of recent points sent with the scan
    #[arg(short, long, default_value_t = 10)]
    points: usize,
  },
  /// Analyse a football match
  Sports {
    /// Free-text match description, e.g. "Township Rollers vs Jwaneng Galaxy"
    #[arg(required = true)]
    query: Vec<String>,
  },
  /// Show live, upcoming and highlighted fixtures
  Markets,
  /// Describe a crash-game screenshot
  Scan {
    /// JPEG screenshot
    image: PathBuf,

    #[arg(short, long, default_value = "Predict the next multiplier")]
    prompt: String,
  },
  /// Build a manual override signal from comma-separated multipliers
  Manual {
    multipliers: String,

    #[arg(short, long)]
    node: Option<String>,
  },
  /// Scan periodically and count signals down until Ctrl-C
  Watch {
    #[arg(short, long)]
    node: Option<String>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&Config::log_dir()?)?;

  let clock: Arc<dyn Clock> = Arc::new(SystemClock);

  match args.command {
    Cmd::Manual { multipliers, node } => {
      let node = node.unwrap_or_else(|| config.signal.default_node.clone());
      let values = manual::parse_multipliers(&multipliers);
      let signal = manual::manual_signal(&values, &node, clock.now())
        .ok_or_else(|| eyre!("No valid multipliers in {:?}", multipliers))?;
      print_json(&signal)
    }
    Cmd::Signal { node, points } => {
      let node = node.unwrap_or_else(|| config.signal.default_node.clone());
      let oracle = build_oracle(&config, clock.clone())?;
      let feed = SeriesFeed::new(
        config.watch.series_len.max(points),
        clock.now(),
        &mut rand::thread_rng(),
      );
      let outcome = oracle.fetch_market_signal(&feed.recent(points), &node).await;
      info!(node = %node, fallback = outcome.is_fallback(), "Market signal fetched");
      print_json(&outcome)
    }
    Cmd::Sports { query } => {
      let oracle = build_oracle(&config, clock)?;
      let prediction = oracle.fetch_sports_analysis(&query.join(" ")).await?;
      print_json(&prediction)
    }
    Cmd::Markets => {
      let oracle = build_oracle(&config, clock)?;
      let snapshot = oracle.fetch_global_market_snapshot().await?;
      print_json(&snapshot.data)
    }
    Cmd::Scan { image, prompt } => {
      let bytes = std::fs::read(&image)
        .map_err(|e| eyre!("Failed to read image {}: {}", image.display(), e))?;
      let oracle = build_oracle(&config, clock)?;
      let text = oracle.analyze_crash_image(&STANDARD.encode(bytes), &prompt).await?;
      println!("{}", text);
      Ok(())
    }
    Cmd::Watch { node } => {
      let node = node.unwrap_or_else(|| config.signal.default_node.clone());
      let oracle = Arc::new(build_oracle(&config, clock.clone())?);
      let mut app = app::App::new(config, oracle, clock, node);
      app.run().await
    }
  }
}

fn build_oracle(config: &Config, clock: Arc<dyn Clock>) -> Result<Oracle> {
  let client = GeminiClient::new(&config.service, Config::get_api_key()?)?;
  info!(model = %config.service.text_model, "Completion client ready");
  Ok(Oracle::new(config, Arc::new(client), clock))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
