use std::fs;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::EnvFilter;

use roe_kernel::catalog::config::{CatalogConfig, ScheduleConfig};
use roe_kernel::config::SystemConfig;
use roe_kernel::dispatch::{Datagram, TriggerError, TriggerParams, TriggerSink};
use roe_kernel::invariants::InvariantEngine;
use roe_kernel::log::store::{InMemoryRecordStore, JsonFileStore, RecordLogStore};
use roe_kernel::log::RecordLogSnapshot;
use roe_kernel::notify::{Notification, NotificationLog};
use roe_kernel::schedule::clock::{Clock, FixedClock, SystemClock};
use roe_kernel::schedule::LoadOutcome;
use roe_kernel::{Collaborators, EventType, Player, PlayerId, RecordCatalog, RecordId, RecordSystem};

/// Records of Eminence CLI
#[derive(Parser, Debug)]
#[command(name = "roe")]
#[command(about = "Records of Eminence record log tool (dry-run)", long_about = None)]
struct Cli {
    /// Path to record catalog JSON
    #[arg(long)]
    catalog: String,

    /// Path to weekly timed schedule JSON
    #[arg(long)]
    schedule: String,

    /// Path to system config JSON (defaults to enabled, JST)
    #[arg(long)]
    config: Option<String>,

    /// Evaluate at this RFC 3339 instant instead of now
    #[arg(long, global = true)]
    at: Option<DateTime<Utc>>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the timed record active at the evaluation instant
    Active,

    /// Load a player and apply any missed daily / timed resets
    Login(PlayerArgs),

    /// Take a record into the player's log
    Take {
        #[command(flatten)]
        player: PlayerArgs,

        #[arg(long)]
        record: RecordId,
    },

    /// Route a gameplay event to the player's records
    Dispatch {
        #[command(flatten)]
        player: PlayerArgs,

        /// Event trigger index
        #[arg(long)]
        event: i64,

        /// Integer datagram, `key=value`
        #[arg(long = "int", value_parser = parse_int_datagram)]
        ints: Vec<Datagram>,

        /// Text datagram, `key=value`
        #[arg(long = "text", value_parser = parse_text_datagram)]
        texts: Vec<Datagram>,
    },

    /// Claim a held record
    Claim {
        #[command(flatten)]
        player: PlayerArgs,

        #[arg(long)]
        record: RecordId,
    },
}

#[derive(Args, Debug)]
struct PlayerArgs {
    /// Path to player JSON
    #[arg(long)]
    player: String,

    /// Directory to write saved record logs to
    #[arg(long)]
    save_dir: Option<String>,
}

/// Player document accepted by the CLI.
#[derive(Debug, Deserialize)]
struct PlayerFile {
    id: PlayerId,
    name: String,
    last_online: DateTime<Utc>,
    #[serde(default)]
    log: RecordLogSnapshot,
}

#[derive(Debug, Serialize)]
struct TriggerRecord {
    record: RecordId,
    params: TriggerParams,
}

/// Sink that logs and keeps every trigger it receives.
#[derive(Default)]
struct LoggingSink {
    calls: Mutex<Vec<TriggerRecord>>,
}

impl LoggingSink {
    fn take(&self) -> Vec<TriggerRecord> {
        self.calls
            .lock()
            .map(|mut calls| std::mem::take(&mut *calls))
            .unwrap_or_default()
    }
}

impl TriggerSink for LoggingSink {
    fn on_record_trigger(
        &self,
        player: &Player,
        record: RecordId,
        params: &TriggerParams,
    ) -> Result<(), TriggerError> {
        tracing::info!(player = %player.name, record, progress = params.progress, "record trigger");
        let mut calls = self.calls.lock().map_err(|_| TriggerError::Unavailable)?;
        calls.push(TriggerRecord {
            record,
            params: params.clone(),
        });
        Ok(())
    }
}

/// Wrapper for JSON output
#[derive(Debug, Serialize)]
struct CliOutput {
    load: Option<LoadOutcome>,
    result: Option<bool>,
    active: Vec<ActiveRecord>,
    completed: Vec<RecordId>,
    violations: Vec<String>,
    triggers: Vec<TriggerRecord>,
    notifications: Vec<Notification>,
}

#[derive(Debug, Serialize)]
struct ActiveRecord {
    slot: usize,
    record: RecordId,
    progress: u32,
}

fn parse_datagram(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))
}

fn parse_int_datagram(raw: &str) -> Result<Datagram, String> {
    let (key, value) = parse_datagram(raw)?;
    let value = value
        .parse::<u32>()
        .map_err(|e| format!("`{key}` is not an unsigned integer: {e}"))?;
    Ok(Datagram::integer(key, value))
}

fn parse_text_datagram(raw: &str) -> Result<Datagram, String> {
    let (key, value) = parse_datagram(raw)?;
    Ok(Datagram::text(key, value))
}

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    // ----------------------------
    // Load configuration
    // ----------------------------
    let config = match &cli.config {
        Some(path) => SystemConfig::from_path(path)
            .with_context(|| format!("loading system config {path}"))?,
        None => SystemConfig::enabled(),
    };

    let records = CatalogConfig::from_path(&cli.catalog)
        .with_context(|| format!("loading catalog {}", cli.catalog))?;
    let schedule = ScheduleConfig::from_path(&cli.schedule)
        .with_context(|| format!("loading schedule {}", cli.schedule))?;
    let catalog = RecordCatalog::load(&records, &schedule);

    // ----------------------------
    // Wire collaborators
    // ----------------------------
    let clock: Arc<dyn Clock> = match cli.at {
        Some(at) => Arc::new(FixedClock(at)),
        None => Arc::new(SystemClock),
    };
    let save_dir = match &cli.command {
        Command::Active => None,
        Command::Login(player)
        | Command::Take { player, .. }
        | Command::Dispatch { player, .. }
        | Command::Claim { player, .. } => player.save_dir.clone(),
    };
    let store: Arc<dyn RecordLogStore> = match save_dir {
        Some(dir) => Arc::new(JsonFileStore::new(dir)),
        None => Arc::new(InMemoryRecordStore::new()),
    };
    let notices = Arc::new(NotificationLog::new());
    let sink = Arc::new(LoggingSink::default());

    let system = RecordSystem::new(
        config,
        catalog,
        Collaborators {
            notifier: notices.clone(),
            store,
            sink: sink.clone(),
            clock,
        },
    );

    // ----------------------------
    // Run command
    // ----------------------------
    let player_args = match &cli.command {
        Command::Active => {
            let record = system.active_timed_record();
            let output = serde_json::json!({ "timed_record": record });
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }
        Command::Login(player)
        | Command::Take { player, .. }
        | Command::Dispatch { player, .. }
        | Command::Claim { player, .. } => player,
    };

    let mut player = load_player(&player_args.player)?;

    let violations: Vec<String> = InvariantEngine::with_defaults()
        .audit(system.catalog(), &player.log)
        .iter()
        .map(|v| {
            tracing::warn!(player = %player.id, "{v}");
            v.to_string()
        })
        .collect();

    let load = system.on_character_load(&mut player);

    let result = match &cli.command {
        Command::Active | Command::Login(_) => None,
        Command::Take { record, .. } => {
            let taken = system.add_record(&mut player, *record);
            if taken {
                system.on_record_taken(&player, *record);
            }
            Some(taken)
        }
        Command::Dispatch {
            event, ints, texts, ..
        } => {
            let event = EventType::from_index(*event)
                .ok_or_else(|| anyhow!("unknown event trigger index {event}"))?;
            let payload: Vec<Datagram> = ints.iter().chain(texts).cloned().collect();
            Some(system.dispatch(event, Some(&player), &payload))
        }
        Command::Claim { record, .. } => Some(system.on_record_claim(&player, *record)),
    };

    system.on_logout(&mut player);

    // ----------------------------
    // Output
    // ----------------------------
    let output = CliOutput {
        load: Some(load),
        result,
        active: player
            .log
            .slots()
            .iter()
            .zip(player.log.slot_progress())
            .enumerate()
            .filter(|&(_, (&record, _))| record != 0)
            .map(|(slot, (&record, &progress))| ActiveRecord {
                slot,
                record,
                progress,
            })
            .collect(),
        completed: player.log.completed().ids().collect(),
        violations,
        triggers: sink.take(),
        notifications: notices.take().into_iter().map(|(_, n)| n).collect(),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

fn load_player(path: &str) -> Result<Player> {
    let data = fs::read_to_string(path).with_context(|| format!("reading player {path}"))?;
    let file: PlayerFile =
        serde_json::from_str(&data).with_context(|| format!("parsing player {path}"))?;
    if file.name.is_empty() {
        bail!("player {path} has no name");
    }
    Ok(Player::from_snapshot(
        file.id,
        file.name,
        file.last_online,
        &file.log,
    ))
}
