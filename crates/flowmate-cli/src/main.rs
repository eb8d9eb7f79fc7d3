//! FlowMate CLI
//!
//! Command-line interface for FlowMate - clinical notes, note sharing and
//! shift scheduling.

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use flowmate_core::{Config, LocalIdentity, Session, SessionSettings, SqliteStore, User};

mod commands;
mod editor;
mod output;

use commands::note::NoteFields;
use commands::shift::ShiftChanges;
use commands::CliSession;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "flowmate")]
#[command(about = "FlowMate - Notes and shifts for clinicians")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file to use instead of the default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Act as this signed-in user (anonymous when omitted)
    #[arg(long, global = true, env = "FLOWMATE_USER")]
    user: Option<String>,

    /// Display name for --user
    #[arg(long, global = true)]
    name: Option<String>,

    /// Email for --user
    #[arg(long, global = true)]
    email: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage your notes
    Note {
        #[command(subcommand)]
        command: NoteCommands,
    },
    /// Open a shared note from its link
    Open {
        /// Share link, `?share=` query or token
        link: String,
    },
    /// Copy a shared note into your notes
    Copy {
        /// Share link, `?share=` query or token
        link: String,
    },
    /// Manage your shifts
    Shift {
        #[command(subcommand)]
        command: ShiftCommands,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Show upcoming shifts and recently updated notes
    Home,
    /// Show status (user, counts, database)
    Status,
}

#[derive(Subcommand)]
enum NoteCommands {
    /// Create a new note
    #[command(alias = "add")]
    Create {
        #[command(flatten)]
        fields: NoteFields,
    },
    /// List your notes
    #[command(alias = "ls")]
    List {
        /// Filter by type (all, normal, soap)
        #[arg(short, long)]
        kind: Option<String>,
        /// Filter by tag
        #[arg(short, long)]
        tag: Option<String>,
    },
    /// Show a note
    Show {
        /// Note ID (full ID or prefix)
        id: String,
    },
    /// Edit a note
    Edit {
        /// Note ID (full ID or prefix)
        id: String,
        #[command(flatten)]
        fields: NoteFields,
        /// Tags to remove
        #[arg(long)]
        untag: Vec<String>,
    },
    /// Delete a note
    #[command(alias = "rm")]
    Delete {
        /// Note ID (full ID or prefix)
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Share a note and print its link
    Share {
        /// Note ID (full ID or prefix)
        id: String,
    },
    /// Stop sharing a note
    Unshare {
        /// Note ID (full ID or prefix)
        id: String,
    },
    /// Search your notes
    Search {
        /// Search query
        query: String,
    },
}

#[derive(Subcommand)]
enum ShiftCommands {
    /// Add a shift
    #[command(alias = "create")]
    Add {
        /// Date (YYYY-MM-DD, default today)
        #[arg(short, long)]
        date: Option<String>,
        /// Shift type (morning, evening, night, custom)
        #[arg(short = 'T', long = "type", default_value = "morning")]
        kind: String,
        /// Location
        #[arg(short, long)]
        location: String,
        /// Start time (HH:MM)
        #[arg(long)]
        start: Option<String>,
        /// End time (HH:MM)
        #[arg(long)]
        end: Option<String>,
        /// Notes
        #[arg(short, long)]
        notes: Option<String>,
    },
    /// List your shifts
    #[command(alias = "ls")]
    List {
        /// Only shifts on this date (YYYY-MM-DD)
        #[arg(short, long)]
        date: Option<String>,
    },
    /// Edit a shift
    Edit {
        /// Shift ID (full ID or prefix)
        id: String,
        #[command(flatten)]
        changes: ShiftChanges,
    },
    /// Delete a shift
    #[command(alias = "rm")]
    Delete {
        /// Shift ID (full ID or prefix)
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, base_url, resolve_timeout_secs, log_file)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands don't need the store
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), cli.config.as_ref(), &output);
    }

    let config = Config::load_with_cli_override(cli.config.as_ref())
        .context("Failed to load configuration")?;
    init_logging(&config);

    let store = SqliteStore::open(&config).context("Failed to open database")?;
    let settings = SessionSettings::from_config(&config)?;

    let identity = match cli.user {
        Some(ref id) => {
            let mut user = User::new(id.as_str(), cli.name.clone().unwrap_or_else(|| id.clone()));
            if let Some(ref email) = cli.email {
                user = user.with_email(email.as_str());
            }
            LocalIdentity::signed_in(user)
        }
        None => LocalIdentity::anonymous(),
    };

    let mut session = Session::new(&store, identity, settings);
    if let Commands::Open { ref link } | Commands::Copy { ref link } = cli.command {
        let location = commands::share::link_location(link, &session.settings().base_url)?;
        session = session.with_location(location);
    }

    let result = match session.handle_identity_change().await {
        Ok(()) => run_command(cli.command, &session, &config, &output).await,
        Err(e) => Err(e.into()),
    };

    output.print_notices(&session.notices().drain());

    match result {
        Err(e) if is_silent(&e) => Ok(()),
        other => other,
    }
}

async fn run_command(
    command: Commands,
    session: &CliSession<'_>,
    config: &Config,
    output: &Output,
) -> Result<()> {
    match command {
        Commands::Note { command } => handle_note_command(command, session, output).await,
        Commands::Open { .. } => commands::share::open(session, output).await,
        Commands::Copy { .. } => commands::share::copy(session, output).await,
        Commands::Shift { command } => handle_shift_command(command, session, output).await,
        Commands::Home => commands::home::show(session, output),
        Commands::Status => commands::status::show(session, config, output),
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

async fn handle_note_command(
    command: NoteCommands,
    session: &CliSession<'_>,
    output: &Output,
) -> Result<()> {
    match command {
        NoteCommands::Create { fields } => commands::note::create(session, fields, output).await,
        NoteCommands::List { kind, tag } => commands::note::list(session, kind, tag, output),
        NoteCommands::Show { id } => commands::note::show(session, id, output),
        NoteCommands::Edit { id, fields, untag } => {
            commands::note::edit(session, id, fields, untag, output).await
        }
        NoteCommands::Delete { id, yes } => commands::note::delete(session, id, yes, output).await,
        NoteCommands::Share { id } => commands::note::share(session, id, output).await,
        NoteCommands::Unshare { id } => commands::note::unshare(session, id).await,
        NoteCommands::Search { query } => commands::note::search(session, query, output),
    }
}

async fn handle_shift_command(
    command: ShiftCommands,
    session: &CliSession<'_>,
    output: &Output,
) -> Result<()> {
    match command {
        ShiftCommands::Add {
            date,
            kind,
            location,
            start,
            end,
            notes,
        } => {
            let draft = commands::shift::shift_draft(
                date.as_deref(),
                &kind,
                location,
                start.as_deref(),
                end.as_deref(),
                notes,
            )?;
            commands::shift::add(session, draft, output).await
        }
        ShiftCommands::Edit { id, changes } => {
            commands::shift::edit(session, id, changes, output).await
        }
        ShiftCommands::List { date } => commands::shift::list(session, date, output),
        ShiftCommands::Delete { id, yes } => {
            commands::shift::delete(session, id, yes, output).await
        }
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

/// Errors the user already knows about, such as a cancelled save
fn is_silent(err: &anyhow::Error) -> bool {
    err.downcast_ref::<flowmate_core::Error>()
        .map(flowmate_core::Error::is_silent)
        .unwrap_or(false)
}

/// Initialize logging
///
/// Only initializes if FLOWMATE_LOG environment variable is set.
/// Logs to config.log_file when set, otherwise to stderr.
fn init_logging(config: &Config) {
    let Ok(log_level) = std::env::var("FLOWMATE_LOG") else {
        return;
    };

    let env_filter = EnvFilter::new(format!(
        "flowmate_core={},flowmate_cli={}",
        log_level, log_level
    ));

    match config.log_file {
        Some(ref log_path) => {
            let log_file = match File::create(log_path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
                    return;
                }
            };
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(log_file)
                .try_init();
            info!("Logging to {:?}", log_path);
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}
