mod scripts;

use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::error;

use mongo_migrator::logging;
use mongo_migrator::{Directive, MigrationReport, Migrator, MigratorConfig, MongoSettings};

#[derive(Parser)]
#[command(author, version, about = "Apply versioned MongoDB migrations", long_about = None)]
struct Cli {
    /// Collection holding the control record
    #[arg(long, value_name = "NAME", global = true)]
    collection: Option<String>,

    /// Do not emit migrator log lines
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate to a version: `latest`, `3`, `latest,exit`, `2,rerun`
    Migrate {
        #[arg(value_name = "COMMAND")]
        target: String,
    },
    /// Print the installed version
    Version,
    /// Print the control record and registered migrations
    Status,
    /// Clear a lock left behind by a crashed run
    Unlock,
    /// Delete all control state
    Reset,
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::set_panic_hook();
    logging::init_logging_with_fallback();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Migration command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = MigratorConfig::from_env();
    if let Some(collection) = cli.collection {
        config.collection_name = collection;
    }
    if cli.quiet {
        config.log = false;
    }

    let settings = MongoSettings::from_env();
    let db = settings
        .connect()
        .await
        .with_context(|| format!("connecting to {}", settings.uri))?;

    let mut migrator = Migrator::new(config);
    migrator.connect_database(&db);
    for migration in scripts::all_migrations(&db) {
        migrator.add(migration)?;
    }

    match cli.command {
        Commands::Migrate { target } => {
            let directive = Directive::parse(target)?;
            let report = migrator.migrate(&directive).await?;
            print_report(&report)?;
            // `exit` ends the process once the report is out, whatever it says.
            if directive.exits() {
                std::process::exit(0);
            }
            Ok(if report.success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Commands::Version => {
            println!("{}", migrator.get_version().await?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status => {
            let control = migrator.control().await?;
            let migrations: Vec<_> = migrator
                .registry()
                .iter()
                .map(|m| {
                    serde_json::json!({
                        "version": m.version(),
                        "name": m.name(),
                        "reversible": m.is_reversible(),
                        "applied": m.version() <= control.version,
                    })
                })
                .collect();
            let status = serde_json::json!({
                "collection": migrator.config().collection_name,
                "version": control.version,
                "locked": control.locked,
                "lockedAt": control.locked_at.map(|at| at.to_rfc3339()),
                "latest": migrator.registry().latest_version(),
                "migrations": migrations,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Unlock => {
            migrator.unlock().await?;
            println!("unlocked");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Reset => {
            migrator.reset().await?;
            println!("control state cleared");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_report(report: &MigrationReport) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_migrate_command() {
        let cli = Cli::try_parse_from(["mongo-migrator", "--quiet", "migrate", "2,rerun"]).unwrap();
        assert!(cli.quiet);
        match cli.command {
            Commands::Migrate { target } => {
                let directive = Directive::parse(target).unwrap();
                assert!(directive.is_rerun());
            }
            _ => panic!("expected migrate"),
        }
    }

    #[tokio::test]
    #[ignore = "requires MongoDB (set MONGODB_TEST_URI)"]
    async fn test_bundled_migrations_round_trip() {
        let uri = std::env::var("MONGODB_TEST_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
        let settings = MongoSettings {
            uri,
            database: format!("migrator_{}", uuid::Uuid::new_v4().simple()),
            ..MongoSettings::default()
        };
        let db = settings.connect().await.expect("Failed to connect to MongoDB");
        db.collection::<mongodb::bson::Document>("urls")
            .insert_one(mongodb::bson::doc! { "short_code": "abc1234" }, None)
            .await
            .unwrap();

        let mut migrator = Migrator::new(MigratorConfig::default());
        migrator.connect_database(&db);
        for migration in scripts::all_migrations(&db) {
            migrator.add(migration).unwrap();
        }

        let report = migrator.migrate_to("latest").await.unwrap();
        assert!(report.success, "{:?}", report.error);
        assert_eq!(migrator.get_version().await.unwrap(), 3);

        // the backfill has no down step, so nothing can be reverted past it
        let report = migrator.migrate_to(0).await.unwrap();
        assert!(!report.success);
        assert_eq!(report.migrations_run, 0);
        assert_eq!(migrator.get_version().await.unwrap(), 3);

        let report = migrator.migrate_to("1,rerun").await.unwrap();
        assert!(report.success);

        db.drop(None).await.unwrap();
    }
}
