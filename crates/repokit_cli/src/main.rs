//! Command-line smoke run of the data-access core.
//!
//! Usage: `repokit_cli [CONFIG] [--log-dir ABS_DIR]`
//!
//! Connects (in-memory SQLite when no config is given), applies the bundled
//! migrations, runs a short risk-register scenario and prints statistics.

use clap::Parser;
use log::info;
use repokit_core::repo::{NewRisk, RiskRepository, RiskStatus, SqlRiskRepository};
use repokit_core::{default_log_level, init_logging, ConnectionConfig, Database};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "repokit_cli")]
#[command(about = "Smoke run of the repokit data-access core")]
struct Cli {
    /// JSON connection config; in-memory SQLite when omitted
    config: Option<PathBuf>,

    /// Absolute directory for rolling log files; logging stays off when omitted
    #[arg(long, value_name = "ABS_DIR")]
    log_dir: Option<String>,
}

fn run(args: Cli) -> Result<(), Box<dyn Error>> {
    if let Some(log_dir) = &args.log_dir {
        init_logging(default_log_level(), log_dir)?;
    }

    let config = match &args.config {
        Some(path) => ConnectionConfig::from_json_file(path)?,
        None => ConnectionConfig::sqlite_in_memory(),
    };
    let db = Database::connect(config)?;
    let version = db.run_migrations()?;
    info!("event=cli_start module=cli status=ok schema_version={version}");

    let risks = SqlRiskRepository::try_new(&db)?;
    let ids = risks.import_risks(
        &[
            NewRisk::new("Supplier outage", 3, 4),
            NewRisk::new("Credential leak", 2, 5).with_description("rotate keys quarterly"),
        ],
        0,
    )?;
    risks.add_review(ids[0], "cli", Some("smoke review"))?;
    risks.soft_delete_risk(ids[1])?;

    let assessed = risks.list_by_status(RiskStatus::Assessed, None)?;
    let report = serde_json::json!({
        "schema_version": version,
        "assessed": assessed,
        "remaining": risks.core().count(&Default::default())?,
        "query_stats": db.query_stats(),
        "transactions": db.transaction_counters(),
        "connection": db.last_connect_report(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("repokit_cli failed: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::error::ErrorKind;
    use clap::Parser;
    use std::path::Path;

    #[test]
    fn parses_config_and_log_dir() {
        let cli = Cli::try_parse_from(["repokit_cli", "db.json", "--log-dir", "/tmp/logs"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some(Path::new("db.json")));
        assert_eq!(cli.log_dir.as_deref(), Some("/tmp/logs"));
    }

    #[test]
    fn everything_is_optional() {
        let cli = Cli::try_parse_from(["repokit_cli"]).unwrap();
        assert!(cli.config.is_none());
        assert!(cli.log_dir.is_none());
    }

    #[test]
    fn rejects_unknown_flags_and_extra_arguments() {
        let unknown = Cli::try_parse_from(["repokit_cli", "--verbose"]).unwrap_err();
        assert_eq!(unknown.kind(), ErrorKind::UnknownArgument);
        assert!(Cli::try_parse_from(["repokit_cli", "a.json", "b.json"]).is_err());
        assert!(Cli::try_parse_from(["repokit_cli", "--log-dir"]).is_err());
    }
}
