mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "watchlist",
    about = "Keep named watchlists of ticker symbols in a local store",
    version,
    propagate_version = true
)]
struct Cli {
    /// Directory holding .watchlist/ (default: nearest ancestor with one, else $HOME)
    #[arg(long, global = true, env = "WATCHLIST_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all watchlists
    List,

    /// Show a watchlist and its tickers
    Show {
        /// Watchlist id or name
        watchlist: String,
    },

    /// Create a new watchlist
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Add this ticker to the new watchlist right away
        #[arg(long)]
        ticker: Option<String>,
    },

    /// Rename a watchlist
    Rename {
        /// Watchlist id or name
        watchlist: String,
        /// New name
        name: String,
        /// Replace the description ("" clears it)
        #[arg(long)]
        description: Option<String>,
    },

    /// Delete a watchlist
    Delete {
        /// Watchlist id or name
        watchlist: String,
    },

    /// Add a ticker to a watchlist
    Add { watchlist: String, ticker: String },

    /// Remove a ticker from a watchlist
    Remove { watchlist: String, ticker: String },

    /// Add the ticker if absent, remove it if present
    Toggle { watchlist: String, ticker: String },

    /// Print whether a ticker is watched (in one watchlist or any)
    Check {
        ticker: String,
        /// Only look in this watchlist (id or name)
        #[arg(long = "watchlist", short = 'w')]
        watchlist: Option<String>,
    },

    /// List the watchlists containing a ticker
    Which { ticker: String },

    /// Inspect and validate configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    tracing::debug!(root = %root.display(), "resolved watchlist root");

    let result = match cli.command {
        Commands::List => cmd::watchlist::list(&root, cli.json),
        Commands::Show { watchlist } => cmd::watchlist::show(&root, &watchlist, cli.json),
        Commands::Create {
            name,
            description,
            ticker,
        } => cmd::watchlist::create(
            &root,
            &name,
            description.as_deref(),
            ticker.as_deref(),
            cli.json,
        ),
        Commands::Rename {
            watchlist,
            name,
            description,
        } => cmd::watchlist::rename(&root, &watchlist, &name, description.as_deref(), cli.json),
        Commands::Delete { watchlist } => cmd::watchlist::delete(&root, &watchlist, cli.json),
        Commands::Add { watchlist, ticker } => {
            cmd::watchlist::add(&root, &watchlist, &ticker, cli.json)
        }
        Commands::Remove { watchlist, ticker } => {
            cmd::watchlist::remove(&root, &watchlist, &ticker, cli.json)
        }
        Commands::Toggle { watchlist, ticker } => {
            cmd::watchlist::toggle(&root, &watchlist, &ticker, cli.json)
        }
        Commands::Check { ticker, watchlist } => {
            cmd::watchlist::check(&root, &ticker, watchlist.as_deref(), cli.json)
        }
        Commands::Which { ticker } => cmd::watchlist::which(&root, &ticker, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
