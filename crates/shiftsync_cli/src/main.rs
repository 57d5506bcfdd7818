//! Command-line surface for the shiftsync engine.
//!
//! # Responsibility
//! - Expose read / reconcile / tombstone and the shared roster over a
//!   SQLite file.
//! - Keep handlers thin; all rules live in `shiftsync_core`.

use std::error::Error;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use log::error;
use rusqlite::Connection;
use serde::Serialize;

use shiftsync_core::model::shared::ShiftVolunteerItem;
use shiftsync_core::repo::shift_type_repo::{upsert_category, upsert_position_type};
use shiftsync_core::{
    CollectionId, DesiredShiftType, EngineConfig, EventBroadcaster, LiveCache, RoleService,
    ShiftTypeInfo, ShiftTypeService, SignupService, SqliteRoleRepository,
    SqliteShiftTypeRepository, SqliteSignupRepository, SubscriptionFilter,
};

type CliResult<T = ()> = Result<T, Box<dyn Error>>;

#[derive(Parser, Debug)]
#[command(
    name = "shiftsync",
    version,
    about = "Shift type reconciliation and live roster engine",
    infer_subcommands = true,
    arg_required_else_help = true
)]
struct Cli {
    /// SQLite database file (created and migrated on first use).
    #[arg(long, global = true, value_name = "PATH", default_value = "shiftsync.db")]
    db: PathBuf,

    /// Engine config JSON (default: built-in defaults).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Absolute log directory; overrides `logging.dir` from the config.
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that the engine links and report its version.
    Ping,

    /// Insert or rename a shift category.
    Category { id: i64, name: String },

    /// Insert or rename a position type.
    PositionType {
        id: i64,
        name: String,
        #[arg(long)]
        role_id: Option<i64>,
    },

    /// Create an empty shift type from a JSON info payload.
    Create(PayloadArgs),

    /// Print the live state of one shift type.
    Read { id: i64 },

    /// Reconcile one shift type to a JSON desired-state payload.
    Reconcile {
        id: i64,
        #[command(flatten)]
        payload: PayloadArgs,
    },

    /// Tombstone one shift type.
    Tombstone { id: i64 },

    /// Manage the shared role roster.
    #[command(subcommand)]
    Roles(RolesCmd),

    /// Manage volunteer signups on a shift time.
    #[command(subcommand)]
    Signups(SignupsCmd),

    /// Run two in-process viewers and print the events one receives.
    Watch {
        /// Role names the editing viewer creates.
        #[arg(default_values_t = vec!["Lead".to_string(), "Support".to_string()])]
        names: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct PayloadArgs {
    /// JSON payload file; `-` reads stdin.
    #[arg(long, short = 'f', value_name = "PATH")]
    file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum RolesCmd {
    List,
    Create { name: String },
    Rename { name: String, new_name: String },
    Toggle { name: String },
    Remove { name: String },
}

#[derive(Subcommand, Debug)]
enum SignupsCmd {
    List {
        time_id: i64,
    },
    Add {
        time_id: i64,
        volunteer_id: String,
        #[arg(long)]
        position_id: i64,
        #[arg(long, default_value = "")]
        display_name: String,
    },
    Remove {
        time_id: i64,
        volunteer_id: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_command module=cli status=error error={err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult {
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    match &cli.log_dir {
        Some(dir) => shiftsync_core::init_logging(&config.logging.level, dir)?,
        None => {
            shiftsync_core::init_from_config(&config.logging)?;
        }
    }

    if let Commands::Ping = cli.command {
        println!("shiftsync_core ping={}", shiftsync_core::ping());
        println!("shiftsync_core version={}", shiftsync_core::core_version());
        return Ok(());
    }

    let conn = shiftsync_core::open_db(&cli.db)?;
    match cli.command {
        Commands::Ping => {}
        Commands::Category { id, name } => upsert_category(&conn, id, &name)?,
        Commands::PositionType { id, name, role_id } => {
            upsert_position_type(&conn, id, &name, role_id)?
        }
        Commands::Create(payload) => {
            let info: ShiftTypeInfo = serde_json::from_str(&read_payload(&payload.file)?)?;
            let service =
                ShiftTypeService::new(SqliteShiftTypeRepository::try_new(&conn)?, config);
            print_json(&service.create(&info)?)?;
        }
        Commands::Read { id } => {
            let service =
                ShiftTypeService::new(SqliteShiftTypeRepository::try_new(&conn)?, config);
            match service.read(id)? {
                Some(snapshot) => print_json(&snapshot)?,
                None => return Err(format!("shift type not found: {id}").into()),
            }
        }
        Commands::Reconcile { id, payload } => {
            let desired: DesiredShiftType =
                serde_json::from_str(&read_payload(&payload.file)?)?;
            let service =
                ShiftTypeService::new(SqliteShiftTypeRepository::try_new(&conn)?, config);
            service.reconcile(id, &desired)?;
        }
        Commands::Tombstone { id } => {
            let service =
                ShiftTypeService::new(SqliteShiftTypeRepository::try_new(&conn)?, config);
            service.tombstone(id)?;
        }
        Commands::Roles(cmd) => {
            let service = RoleService::new(
                SqliteRoleRepository::try_new(&conn)?,
                EventBroadcaster::new(config.broadcast),
            );
            match cmd {
                RolesCmd::List => print_json(&service.list_roles()?)?,
                RolesCmd::Create { name } => print_json(&service.create_role(&name, None)?)?,
                RolesCmd::Rename { name, new_name } => {
                    print_json(&service.rename_role(&name, &new_name, None)?)?
                }
                RolesCmd::Toggle { name } => print_json(&service.toggle_display(&name, None)?)?,
                RolesCmd::Remove { name } => service.remove_role(&name, None)?,
            }
        }
        Commands::Signups(cmd) => {
            let service = SignupService::new(
                SqliteSignupRepository::try_new(&conn)?,
                EventBroadcaster::new(config.broadcast),
            );
            match cmd {
                SignupsCmd::List { time_id } => print_json(&service.list(time_id)?)?,
                SignupsCmd::Add {
                    time_id,
                    volunteer_id,
                    position_id,
                    display_name,
                } => service.add(
                    &ShiftVolunteerItem {
                        volunteer_id,
                        shift_time_id: time_id,
                        shift_position_id: position_id,
                        display_name,
                    },
                    None,
                )?,
                SignupsCmd::Remove {
                    time_id,
                    volunteer_id,
                } => service.remove(time_id, &volunteer_id, None)?,
            }
        }
        Commands::Watch { names } => watch(&conn, &config, &names)?,
    }
    Ok(())
}

/// Editor creates, toggles and removes roles; the watcher patches its cache
/// from the events it receives and prints both.
fn watch(conn: &Connection, config: &EngineConfig, names: &[String]) -> CliResult {
    let broadcaster = EventBroadcaster::new(config.broadcast);
    let watcher = broadcaster.subscribe(SubscriptionFilter::only(CollectionId::roles()))?;
    let editor = broadcaster.subscribe(SubscriptionFilter::only(CollectionId::roles()))?;
    let service = RoleService::new(SqliteRoleRepository::try_new(conn)?, broadcaster.clone());

    let seq = broadcaster.current_seq(CollectionId::roles())?;
    let mut cache = LiveCache::new(CollectionId::roles(), service.list_roles()?, seq);

    for name in names {
        service.create_role(name, Some(editor.id()))?;
    }
    if let Some(first) = names.first() {
        service.toggle_display(first, Some(editor.id()))?;
    }
    if let Some(last) = names.last().filter(|_| names.len() > 1) {
        service.remove_role(last, Some(editor.id()))?;
    }

    while let Ok(event) = watcher.try_recv() {
        println!("{}", serde_json::to_string(&event)?);
        cache.apply(&event)?;
    }
    print_json(&cache.items())?;
    Ok(())
}

fn read_payload(path: &Path) -> CliResult<String> {
    if path == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin().read_to_string(&mut raw)?;
        return Ok(raw);
    }
    Ok(std::fs::read_to_string(path)?)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
