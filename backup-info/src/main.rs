//! backup-info - command line access to backup metadata.

use anyhow::{Context, Result};
use backup_info::{
    utils, AnnotationCommand, AnnotationRequest, Config, FieldValue, InfoStore, Validity,
};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", env = "BACKUP_INFO_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List all backups of a server
    List { server: String },

    /// Show one backup (oldest, latest/newest or a label)
    Show {
        server: String,
        backup: String,
        /// Print a single field, e.g. LABEL or TABLESPACE_PATH1
        #[arg(long)]
        field: Option<String>,
    },

    /// Create a backup directory with its initial record
    Create {
        server: String,
        /// Defaults to the current local time as YYYYMMDDHHMMSS
        #[arg(long)]
        label: Option<String>,
        /// Record the backup as failed
        #[arg(long)]
        invalid: bool,
    },

    /// Set one field of a backup record
    Set {
        server: String,
        backup: String,
        key: String,
        value: String,
        #[arg(long, value_enum, default_value_t = Kind::String)]
        kind: Kind,
    },

    /// Add, update or remove an annotation
    Annotate {
        server: String,
        backup: String,
        #[arg(value_parser = ["add", "update", "remove"])]
        action: String,
        key: String,
        comment: Option<String>,
    },

    /// Count valid backups of a server
    CountValid { server: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Kind {
    String,
    Unsigned,
    Bool,
}

impl Kind {
    fn value(self, raw: &str) -> Result<FieldValue> {
        Ok(match self {
            Kind::String => FieldValue::Text(raw.to_string()),
            Kind::Unsigned => FieldValue::Unsigned(
                raw.parse()
                    .with_context(|| format!("'{}' is not an unsigned integer", raw))?,
            ),
            Kind::Bool => FieldValue::Bool(match raw {
                "1" | "true" => true,
                "0" | "false" => false,
                other => anyhow::bail!("'{}' is not a boolean", other),
            }),
        })
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)
            .with_context(|| format!("loading {}", config_path.display()))?
    } else {
        Config::default()
    };

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::debug!("backup-info v{} ({} servers)", env!("CARGO_PKG_VERSION"), config.servers.len());

    let store = InfoStore::new(Arc::new(config));

    match args.command {
        Command::List { server } => print_json(&store.list(&server)?)?,
        Command::Show { server, backup, field } => match field {
            Some(key) => println!("{}", store.field(&server, &backup, &key)?),
            None => print_json(&store.find(&server, &backup)?)?,
        },
        Command::Create { server, label, invalid } => {
            let label = label.unwrap_or_else(|| chrono::Local::now().format("%Y%m%d%H%M%S").to_string());
            let validity = if invalid { Validity::Invalid } else { Validity::Valid };
            let directory = store.create(&server, &label, validity)?;
            println!("{}", directory.display());
        }
        Command::Set { server, backup, key, value, kind } => {
            let entry = store.set_field(&server, &backup, &key, &kind.value(&value)?)?;
            print_json(&entry)?;
        }
        Command::Annotate { server, backup, action, key, comment } => {
            let request = AnnotationRequest {
                server,
                backup,
                command: AnnotationCommand::parse(&action, &key, comment.as_deref())?,
            };
            match store.annotate(&request) {
                Ok(report) => print_json(&report)?,
                Err(failure) => {
                    print_json(&failure.report)?;
                    return Err(failure.into());
                }
            }
        }
        Command::CountValid { server } => println!("{}", store.count_valid(&server)),
    }

    Ok(())
}
