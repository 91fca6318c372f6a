//! `levelup` — command-line front end for Level Up! progress.
//!
//! Every command loads the local snapshot, applies one transition and exits.
//! Nothing touches the network except `sync` and `screen`.
//!
//! # Usage
//!
//! ```
//! levelup complete 3
//! levelup mood 😊 7 --note "good day"
//! levelup --url http://localhost:3000 --token $JWT sync
//! ```

// Local traits use native `async fn`; the futures are only awaited on the
// current-thread runtime.
#![allow(async_fn_in_trait)]

mod client;
mod session;
mod snapshot;
mod sync;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use client::{ApiClient, ClientConfig};
use levelup_core::{
  clock::SystemClock,
  gate::Screen,
  journal::{Intensity, NewIcebergEntry, NewMoodEntry},
  machine::ProgressMachine,
  progress::{Emotion, LevelData, LevelId, LevelValue, UserProgress},
};
use serde::Deserialize;
use session::AuthEvent;
use snapshot::FileSnapshotStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

type Machine = ProgressMachine<FileSnapshotStore>;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "levelup", about = "Level Up! progress on the command line")]
struct Args {
  /// Path to a TOML config file (url, token, state).
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Base URL of the levelup server (default: http://localhost:3000).
  #[arg(long, env = "LEVELUP_URL")]
  url: Option<String>,

  /// Access token issued by the auth provider.
  #[arg(long, env = "LEVELUP_TOKEN", hide_env_values = true)]
  token: Option<String>,

  /// Where the local snapshot lives.
  #[arg(long, env = "LEVELUP_STATE", value_name = "FILE")]
  state: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show stars, streaks and levels.
  Status,
  /// Award stars.
  Stars { amount: u32 },
  /// Mark a level (1-8) complete.
  Complete { level: u8 },
  /// Save a value in a level's scratch data. Several values make a list.
  LevelProgress {
    level:  u8,
    key:    String,
    #[arg(required = true, num_args = 1..)]
    values: Vec<String>,
  },
  /// Record activity for today.
  Streak,
  /// Log a mood check-in.
  Mood {
    emoji:     String,
    /// 1 to 10.
    intensity: u8,
    #[arg(long)]
    trigger:   Option<String>,
    #[arg(long)]
    note:      Option<String>,
  },
  /// Log an iceberg reflection.
  Iceberg {
    #[arg(long)]
    behavior: String,
    #[arg(long)]
    feeling:  String,
    #[arg(long)]
    need:     String,
  },
  /// Replace the calm-down tools for one feeling.
  Kit {
    #[arg(value_enum)]
    emotion: EmotionArg,
    tools:   Vec<String>,
  },
  /// Replace the list of qualities.
  Qualities { qualities: Vec<String> },
  /// List unlocked achievements.
  Achievements,
  /// Show the mood and iceberg journals, newest first.
  Journal,
  /// Pull, push and upload journals.
  Sync,
  /// Check the subscription and print which screen applies.
  Screen,
  /// Wipe all local progress and journals.
  Reset {
    /// Required; there is no undo.
    #[arg(long)]
    yes: bool,
  },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum EmotionArg {
  Mad,
  Sad,
  Worried,
  Stressed,
}

impl From<EmotionArg> for Emotion {
  fn from(e: EmotionArg) -> Self {
    match e {
      EmotionArg::Mad => Emotion::Mad,
      EmotionArg::Sad => Emotion::Sad,
      EmotionArg::Worried => Emotion::Worried,
      EmotionArg::Stressed => Emotion::Stressed,
    }
  }
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default, Debug, PartialEq)]
struct ConfigFile {
  #[serde(default)]
  url:   String,
  #[serde(default)]
  token: String,
  #[serde(default)]
  state: Option<PathBuf>,
}

fn default_state_path() -> PathBuf {
  match std::env::var_os("HOME") {
    Some(home) => PathBuf::from(home).join(".local/share/levelup/state.json"),
    None => PathBuf::from("levelup-state.json"),
  }
}

/// A level value as typed on the command line.
fn level_value(mut values: Vec<String>) -> LevelValue {
  if values.len() != 1 {
    return LevelValue::List(values);
  }
  let raw = values.remove(0);
  match raw.as_str() {
    "true" => LevelValue::Flag(true),
    "false" => LevelValue::Flag(false),
    s => match s.parse::<f64>() {
      Ok(n) if n.is_finite() => LevelValue::Number(n),
      _ => LevelValue::Text(raw),
    },
  }
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .init();

  let args = Args::parse();

  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  // Flags and environment override the config file, which overrides defaults.
  let client_config = ClientConfig {
    base_url: args
      .url
      .or_else(|| (!file_cfg.url.is_empty()).then(|| file_cfg.url.clone()))
      .unwrap_or_else(|| "http://localhost:3000".to_string()),
    token:    args
      .token
      .or_else(|| (!file_cfg.token.is_empty()).then(|| file_cfg.token.clone())),
  };
  let state_path = args.state.or(file_cfg.state).unwrap_or_else(default_state_path);

  let snapshots = FileSnapshotStore::new(&state_path);
  let mut machine: Machine = ProgressMachine::load(snapshots, SystemClock)
    .with_context(|| format!("loading local state from {}", state_path.display()))?;

  run(args.command, client_config, &mut machine).await
}

async fn run(command: Command, config: ClientConfig, machine: &mut Machine) -> Result<()> {
  match command {
    Command::Status => print_status(machine),

    Command::Stars { amount } => {
      machine.add_stars(amount)?;
      println!("⭐ {}", machine.progress().total_stars);
    }

    Command::Complete { level } => {
      let level = LevelId::new(level)?;
      if machine.complete_level(level)? {
        println!("Level {level} complete! ⭐ {}", machine.progress().total_stars);
      } else {
        println!("Level {level} was already complete.");
      }
    }

    Command::LevelProgress { level, key, values } => {
      let level = LevelId::new(level)?;
      let data = LevelData::from([(key, level_value(values))]);
      machine.update_level_progress(level, data)?;
    }

    Command::Streak => {
      machine.update_streak()?;
      let p = machine.progress();
      println!("🔥 {} day(s), best {}", p.current_streak, p.longest_streak);
    }

    Command::Mood { emoji, intensity, trigger, note } => {
      let entry =
        NewMoodEntry { trigger, note, ..NewMoodEntry::new(emoji, Intensity::new(intensity)?) };
      machine.add_mood_log(entry)?;
    }

    Command::Iceberg { behavior, feeling, need } => {
      machine.add_iceberg_entry(NewIcebergEntry { behavior, feeling, need })?;
    }

    Command::Kit { emotion, tools } => {
      let mut kit = machine.progress().calm_down_kit.clone();
      *kit.tools_mut(emotion.into()) = tools;
      machine.update_calm_down_kit(kit)?;
    }

    Command::Qualities { qualities } => machine.update_qualities(qualities)?,

    Command::Achievements => {
      for a in machine.achievements() {
        println!("🏆 {}", a.name());
      }
    }

    Command::Journal => {
      for m in machine.mood_logs() {
        let note = m.note.as_deref().unwrap_or("");
        let at = m.created_at.format("%Y-%m-%d %H:%M");
        println!("{at} {} {}/10 {note}", m.emoji, m.intensity.get());
      }
      for e in machine.iceberg_entries() {
        println!(
          "{} {} / {} / {}",
          e.created_at.format("%Y-%m-%d %H:%M"),
          e.behavior,
          e.feeling,
          e.need
        );
      }
    }

    Command::Sync => {
      let client = signed_in_client(config)?;
      let report = sync::sync_all(&client, machine).await?;
      println!(
        "Synced: progress {}, {} mood(s) and {} iceberg(s) uploaded.",
        if report.pushed { "pushed" } else { "up to date" },
        report.moods_uploaded,
        report.icebergs_uploaded
      );
    }

    Command::Screen => {
      let event = if config.token.is_some() { AuthEvent::SignedIn } else { AuthEvent::SignedOut };
      let client = ApiClient::new(config)?;
      let screen = session::on_auth_change(event, &client, machine).await?;
      println!(
        "{}",
        match screen {
          Screen::SignIn => "Sign in to continue.",
          Screen::Subscribe => "Choose a plan to unlock Level Up!",
          Screen::Unlocked => "Unlocked. Have fun!",
        }
      );
    }

    Command::Reset { yes } => {
      if !yes {
        bail!("reset wipes all progress; pass --yes to confirm");
      }
      machine.reset()?;
      println!("Progress reset.");
    }
  }
  Ok(())
}

fn signed_in_client(config: ClientConfig) -> Result<ApiClient> {
  if config.token.is_none() {
    bail!("not signed in; pass --token or set LEVELUP_TOKEN");
  }
  ApiClient::new(config)
}

/// One line per level: completion mark, number and badge.
fn level_lines(p: &UserProgress) -> Vec<String> {
  LevelId::all()
    .map(|level| {
      let mark = if p.is_level_complete(level) { "✔" } else { " " };
      let badge = if p.has_badge(level) { " 🏅" } else { "" };
      format!("[{mark}] Level {level}{badge}")
    })
    .collect()
}

fn print_status(machine: &Machine) {
  let p = machine.progress();
  println!("⭐ {} stars", p.total_stars);
  println!("🔥 {} day streak (best {})", p.current_streak, p.longest_streak);
  if let Some(day) = p.last_active_date {
    println!("   last active {day}");
  }
  for line in level_lines(p) {
    println!("{line}");
  }
  if !machine.pending_patch().is_empty() {
    println!("(local changes not yet synced)");
  }
  println!("state: {}", machine.snapshots().path().display());
}
