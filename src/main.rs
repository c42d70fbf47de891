use std::path::PathBuf;

use anyhow::{Context, Result};
use bankfeed::app::{self, NormalizeArgs, SimulateRequest};
use bankfeed::config::{default_config_path, ResolvedConfig};
use bankfeed::models::TransactionType;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "bankfeed")]
#[command(about = "Consent-gated bank transaction ingestion")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show current configuration
    Config,

    /// Run a consent through the synthetic aggregator and store what it delivers
    Simulate {
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "DEPOSIT")]
        fi_type: String,
        /// First day to fetch (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,
        /// Last day to fetch, inclusive (YYYY-MM-DD)
        #[arg(long)]
        to: NaiveDate,
    },

    /// List stored transactions with category overrides applied
    Transactions {
        #[arg(long)]
        user: String,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List a user's consents
    Consents {
        #[arg(long)]
        user: String,
    },

    /// Show the normalized form and dedup hash of one record
    Normalize {
        description: String,
        #[arg(long, default_value_t = 0.0)]
        amount: f64,
        #[arg(long, default_value = "INR")]
        currency: String,
        #[arg(long = "type", value_enum, default_value_t = TypeArg::Debit)]
        txn_type: TypeArg,
        #[arg(long, default_value = "1970-01-01T00:00:00Z")]
        posted_at: String,
        #[arg(long, default_value = "")]
        account_ref: String,
    },

    /// Sign a webhook body with the configured secret
    Sign { body: String },

    /// Manage category overrides
    Override {
        #[command(subcommand)]
        command: OverrideCommand,
    },
}

#[derive(Subcommand)]
enum OverrideCommand {
    /// Add an override. Wrap the pattern in slashes for a regex.
    Add {
        #[arg(long)]
        user: String,
        #[arg(long)]
        pattern: String,
        #[arg(long)]
        category: String,
        #[arg(long)]
        subcategory: Option<String>,
    },
    /// List overrides in the order they apply
    List {
        #[arg(long)]
        user: String,
    },
    /// Remove an override by id
    Remove {
        #[arg(long)]
        user: String,
        id: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum TypeArg {
    Debit,
    Credit,
}

impl From<TypeArg> for TransactionType {
    fn from(value: TypeArg) -> Self {
        match value {
            TypeArg::Debit => TransactionType::Debit,
            TypeArg::Credit => TransactionType::Credit,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .json(),
        )
        .init();

    let cli = Cli::parse();

    let config = ResolvedConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load bankfeed config: {}", cli.config.display()))?;

    match cli.command {
        Command::Config => print_json(&app::config_output(&cli.config, &config))?,
        Command::Simulate {
            user,
            fi_type,
            from,
            to,
        } => {
            let output = app::simulate(
                &config,
                SimulateRequest {
                    user,
                    fi_type,
                    from,
                    to,
                },
            )
            .await?;
            print_json(&output)?;
        }
        Command::Transactions {
            user,
            from,
            to,
            limit,
        } => {
            let service = app::open_service(&config)?;
            print_json(&app::list_transactions(&service, &user, from, to, limit).await?)?;
        }
        Command::Consents { user } => {
            let service = app::open_service(&config)?;
            print_json(&app::list_consents(&service, &user).await?)?;
        }
        Command::Normalize {
            description,
            amount,
            currency,
            txn_type,
            posted_at,
            account_ref,
        } => print_json(&app::normalize_output(NormalizeArgs {
            description,
            amount,
            currency,
            txn_type: txn_type.into(),
            posted_at,
            account_ref,
        }))?,
        Command::Sign { body } => print_json(&app::sign_body(&config, &body)?)?,
        Command::Override { command } => {
            let service = app::open_service(&config)?;
            match command {
                OverrideCommand::Add {
                    user,
                    pattern,
                    category,
                    subcategory,
                } => {
                    let rule = app::add_override(
                        &service,
                        &user,
                        &pattern,
                        &category,
                        subcategory.as_deref(),
                    )
                    .await?;
                    print_json(&rule)?;
                }
                OverrideCommand::List { user } => {
                    print_json(&app::list_overrides(&service, &user).await?)?;
                }
                OverrideCommand::Remove { user, id } => {
                    print_json(&app::remove_override(&service, &user, &id).await?)?;
                }
            }
        }
    }

    Ok(())
}
