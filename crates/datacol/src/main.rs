use anyhow::Result;
use clap::Parser;
use tracing::{debug, info, trace, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod connection;
mod error;
mod output;

use cli::{Cli, Commands};
use connection::ConnectionManager;
use error::DatacolError;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity level
    init_tracing(cli.verbose);

    match execute_command(&cli).await {
        Ok(0) => Ok(()),
        Ok(status) => {
            debug!("Exiting with remote status {}", status);
            std::process::exit(status);
        }
        Err(e) => {
            eprintln!("{}", e.display_with_suggestions());
            std::process::exit(1);
        }
    }
}

fn init_tracing(verbose: u8) {
    // Check for RUST_LOG env var first, then fall back to verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "datacol=warn,datacol_core=warn",
            1 => "datacol=info,datacol_core=info",
            2 => "datacol=debug,datacol_core=debug",
            _ => "datacol=trace,datacol_core=trace",
        };
        tracing_subscriber::EnvFilter::new(level)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .compact(),
        )
        .init();

    debug!("Tracing initialized with verbosity level: {}", verbose);
}

/// Run the selected command; the value is the process exit status
async fn execute_command(cli: &Cli) -> Result<i32, DatacolError> {
    trace!("Executing command: {:?}", cli.command);

    if let Commands::Version = cli.command {
        print_version(cli.output)?;
        return Ok(0);
    }

    let conn = ConnectionManager::open(cli.home.as_deref(), cli.stack.clone())?;
    let start = std::time::Instant::now();

    let result = match &cli.command {
        Commands::Init(args) => {
            commands::stack::handle_init(&conn, cli.init_stack_name(), args, cli.output)
                .await
                .map(|()| 0)
        }
        Commands::Destroy { yes } => commands::stack::handle_destroy(&conn, *yes)
            .await
            .map(|()| 0),
        Commands::Stacks => commands::stack::handle_stacks(&conn, cli.output)
            .await
            .map(|()| 0),
        Commands::Apps(apps_cmd) => {
            commands::apps::handle_apps_command(apps_cmd, &conn, cli.output)
                .await
                .map(|()| 0)
        }
        Commands::Env(env_cmd) => commands::env::handle_env_command(env_cmd, &conn, cli.output)
            .await
            .map(|()| 0),
        Commands::Logs {
            name,
            follow,
            since,
        } => commands::logs::handle_logs(&conn, name.as_deref(), *follow, *since)
            .await
            .map(|()| 0),
        Commands::Run {
            app,
            controller,
            command,
        } => commands::run::handle_run(&conn, app, command, *controller).await,
        Commands::Version => Ok(0),
    };

    info!("Command finished in {:?}", start.elapsed());
    finish(result, conn.close())
}

/// The command's own result wins; a failed store release is only logged
fn finish<T>(
    result: Result<T, DatacolError>,
    closed: Result<(), DatacolError>,
) -> Result<T, DatacolError> {
    if let Err(e) = closed {
        warn!("Failed to release the state store: {}", e);
    }
    result
}

fn print_version(format: output::OutputFormat) -> Result<(), DatacolError> {
    if format.is_structured() {
        let output_data = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "name": env!("CARGO_PKG_NAME"),
        });
        output::print_output(&output_data, format)?;
    } else {
        println!("datacol {}", env!("CARGO_PKG_VERSION"));
    }
    Ok(())
}
