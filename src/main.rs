use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use chatlog::cli::{history, maintenance, record, session};
use chatlog::config::Config;
use chatlog::store::HistoryStore;

#[derive(Parser)]
#[command(name = "chatlog")]
#[command(about = "Persistent chat history: interactions, sessions and their links")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "chatlog.yaml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Record an interaction (linked to the active session unless --no-link)
    Record {
        /// The question or input
        problem: String,

        /// Proposed answer or command
        #[arg(short, long)]
        answer: Option<String>,

        /// Realized output
        #[arg(short, long)]
        output: Option<String>,

        /// Role tag (default, code, or any custom label)
        #[arg(short, long)]
        role: Option<String>,

        /// Do not link the entry to the active session
        #[arg(long)]
        no_link: bool,
    },

    /// Browse recorded history
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },

    /// Session management
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },

    /// Deletions, orphaned links and statistics
    Maintenance {
        #[command(subcommand)]
        command: MaintenanceCommands,
    },
}

#[derive(Subcommand)]
enum HistoryCommands {
    /// List recent entries, newest first
    List {
        /// Only entries with this role
        #[arg(short, long)]
        role: Option<String>,

        /// Number of entries (defaults to history.list_count)
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Oldest first instead of newest first
        #[arg(long)]
        oldest_first: bool,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one entry
    Show {
        id: i64,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Show entries picked by a selection (N, A-B or A,B,C)
    Pick { selection: String },
    /// Print the JSON context list for a selection or the active session
    Context {
        /// Selection (N, A-B or A,B,C); active session when omitted
        selection: Option<String>,

        /// Append a new question to the list
        #[arg(long)]
        ask: Option<String>,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Start a session (ends active sessions when no id is given)
    Start {
        /// Session identifier
        session_id: Option<String>,
    },
    /// End a session
    End { id: i64 },
    /// List all sessions
    List,
    /// Show the active session
    Current,
    /// Link a message to a session
    Link {
        /// Session row id
        session: i64,
        /// Message (entry) id
        message: i64,
    },
    /// Show the messages linked to a session
    Messages { session: i64 },
}

#[derive(Subcommand)]
enum MaintenanceCommands {
    /// Delete an entry, applying the configured orphan policy
    DeleteEntry { id: i64 },
    /// Delete a session, applying the configured orphan policy
    DeleteSession { id: i64 },
    /// List links whose session or entry no longer exists
    Orphans {
        /// Delete them as well
        #[arg(long)]
        prune: bool,
    },
    /// Show row counts
    Stats,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Load config
    let config = Config::load(&cli.config)?;

    // Initialize store
    let db_path = config.database_path();
    let store = HistoryStore::open(&db_path, config.store_options())
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    match cli.command {
        Commands::Record {
            problem,
            answer,
            output,
            role,
            no_link,
        } => {
            record::run(&store, problem, answer, output, role, no_link)?;
        }
        Commands::History { command } => match command {
            HistoryCommands::List {
                role,
                limit,
                oldest_first,
                json,
            } => {
                let limit = limit.unwrap_or(config.history.list_count);
                history::list(&store, role, limit, oldest_first, json)?;
            }
            HistoryCommands::Show { id, json } => {
                history::show(&store, id, json)?;
            }
            HistoryCommands::Pick { selection } => {
                history::pick(&store, &selection)?;
            }
            HistoryCommands::Context { selection, ask } => {
                history::context(&store, selection, ask)?;
            }
        },
        Commands::Session { command } => match command {
            SessionCommands::Start { session_id } => {
                session::start(&store, session_id)?;
            }
            SessionCommands::End { id } => {
                session::end(&store, id)?;
            }
            SessionCommands::List => {
                session::list(&store)?;
            }
            SessionCommands::Current => {
                session::current(&store)?;
            }
            SessionCommands::Link { session, message } => {
                session::link(&store, session, message)?;
            }
            SessionCommands::Messages { session } => {
                session::messages(&store, session)?;
            }
        },
        Commands::Maintenance { command } => match command {
            MaintenanceCommands::DeleteEntry { id } => {
                maintenance::delete_entry(&store, id)?;
            }
            MaintenanceCommands::DeleteSession { id } => {
                maintenance::delete_session(&store, id)?;
            }
            MaintenanceCommands::Orphans { prune } => {
                maintenance::orphans(&store, prune)?;
            }
            MaintenanceCommands::Stats => {
                maintenance::stats(&store)?;
            }
        },
    }

    Ok(())
}
