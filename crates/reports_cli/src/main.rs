//! Operator CLI for the reports database.
//!
//! # Responsibility
//! - Run schema migrations against a configured environment.
//! - Reset the `testing` database the same way the test harness does.

use clap::{Parser, Subcommand};
use log::error;
use reports_core::db::migrations::{current_version, downgrade, latest_version};
use reports_core::db::reset::reset_database;
use reports_core::db::schema::list_tables;
use reports_core::{create_app, App, Environment};
use std::error::Error;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "reports")]
#[command(about = "Reports service database tooling")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Environment to load settings for
    #[arg(long, global = true, default_value = "development")]
    env: String,
}

#[derive(Subcommand)]
enum Command {
    /// Apply all pending migrations
    Upgrade,
    /// Revert migrations down to a target version
    Downgrade {
        #[arg(long)]
        to: u32,
    },
    /// Drop every schema object and migrate again (testing only)
    Reset,
    /// Print the schema version and tables
    Status,
    /// Print the core library version
    Version,
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

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    if let Command::Version = cli.command {
        println!("reports_core version={}", reports_core::core_version());
        return Ok(());
    }

    let app = create_app(&cli.env)?;
    app.init_logging()?;

    match cli.command {
        Command::Upgrade => {
            let version = app.upgrade()?;
            println!("schema version={version}");
        }
        Command::Downgrade { to } => {
            let mut conn = app.engine().connect()?;
            downgrade(&mut conn, to)?;
            println!("schema version={}", current_version(&conn)?);
            conn.close()?;
        }
        Command::Reset => {
            if app.environment() != Environment::Testing {
                return Err(format!(
                    "reset is only allowed for `testing`, not `{}`",
                    app.environment().as_str()
                )
                .into());
            }
            let report = reset_database(app.engine())?;
            println!(
                "dropped tables={} views={} sequences={}; schema version={}",
                report.cleared.tables_dropped,
                report.cleared.views_dropped,
                report.cleared.sequences_dropped,
                report.schema_version
            );
        }
        Command::Status => print_status(&app)?,
        Command::Version => {}
    }
    Ok(())
}

fn print_status(app: &App) -> Result<(), Box<dyn Error>> {
    let conn = app.engine().connect()?;
    println!("environment={}", app.environment().as_str());
    println!("database={}", app.engine().path().display());
    println!(
        "schema version={} latest={}",
        current_version(&conn)?,
        latest_version()
    );
    for table in list_tables(&conn)? {
        println!("table {table}");
    }
    conn.close()?;
    Ok(())
}
