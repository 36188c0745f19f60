use std::{io, sync::Arc};

use clap::{Parser, Subcommand};
use colored::Colorize;
use holgithub_collab::{
    AuthError, Collab, Config, DatabaseError, PgDatabase, ScrapeError, Scraper, ScraperConfig,
    SharedDatabase,
};
use holgithub_server::{run_server, ServerConfig, DEFAULT_PORT};
use log::{error, info};
use thiserror::Error;
use tokio::runtime;

mod logging;

#[derive(Parser)]
#[command(name = "holgithub", about = "Guess which GitHub repository has more stars")]
struct Args {
    #[arg(long, env = "DATABASE_URL", help = "Postgres connection url")]
    database_url: String,

    #[arg(long, env = "HOLGITHUB_SERVER_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(
        long,
        env = "HOLGITHUB_SESSION_DAYS",
        default_value_t = 7,
        help = "How many days a session stays valid"
    )]
    session_days: i64,

    #[arg(
        long,
        env = "HOLGITHUB_INSECURE_COOKIES",
        help = "Allow the session cookie over plain http"
    )]
    insecure_cookies: bool,

    #[arg(long, help = "Log debug messages")]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Runs the game server (default)
    Serve,
    /// Replaces the repository pool with the most starred repositories on GitHub
    Seed {
        #[arg(long, help = "Accept incomplete search results instead of retrying")]
        allow_incomplete: bool,

        #[arg(long, default_value_t = 5)]
        retries: usize,
    },
}

#[derive(Debug, Error)]
enum StartupError {
    #[error("Could not initialize database: {0}")]
    Database(#[from] DatabaseError),

    #[error("Could not initialize authentication: {0}")]
    Auth(#[from] AuthError),

    #[error("Could not seed repositories: {0}")]
    Scrape(#[from] ScrapeError),

    #[error("Fatal error: {0}")]
    Fatal(#[from] io::Error),
}

impl StartupError {
    fn hint(&self) -> String {
        match self {
            StartupError::Database(_) => "This is a database error. Make sure DATABASE_URL points to a running Postgres instance, then try again.".to_string(),
            StartupError::Auth(_) => "Password hashing could not be set up. This should not happen.".to_string(),
            StartupError::Scrape(_) => "GitHub could not be reached or is rate limiting. Wait a bit, then try again.".to_string(),
            StartupError::Fatal(_) => "Check that the port is free and the process may bind to it.".to_string(),
        }
    }
}

fn run(args: Args) -> Result<(), StartupError> {
    info!("Building async runtime...");
    let runtime = runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("holgithub-async")
        .build()?;

    runtime.block_on(async move {
        info!("Connecting to database...");
        let database = PgDatabase::new(&args.database_url).await?;
        database.migrate().await?;

        let database: SharedDatabase = Arc::new(database);

        match args.command.unwrap_or(Command::Serve) {
            Command::Serve => {
                let config = Config {
                    session_duration_in_days: args.session_days,
                };

                let collab = Collab::new(database, &config)?;

                info!("Initialized successfully.");
                run_server(
                    ServerConfig {
                        port: args.port,
                        secure_cookies: !args.insecure_cookies,
                    },
                    collab,
                )
                .await?;
            }
            Command::Seed {
                allow_incomplete,
                retries,
            } => {
                let scraper = Scraper::new(ScraperConfig {
                    allow_incomplete,
                    incomplete_retries: retries,
                    ..Default::default()
                })?;

                scraper.seed(&database).await?;
            }
        }

        Ok(())
    })
}

fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    if let Err(error) = logging::init_logger(args.verbose) {
        eprintln!("Could not initialize logging: {}", error);
    }

    if let Err(error) = run(args) {
        error!("{} Read the error below to troubleshoot the issue. If you think this might be a bug, please report it by making a GitHub issue.", "holgithub failed to start!".bold().red());
        error!("{}", error);
        error!("{}", format!("Hint: {}", error.hint()).bright_black().italic());

        std::process::exit(1);
    }
}
