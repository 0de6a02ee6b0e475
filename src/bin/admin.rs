use std::collections::VecDeque;
use std::sync::Arc;

use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use statement_ledger::domain::NewStatement;
use statement_ledger::infra::{LedgerStore, PgLedgerStore, RetryConfig};
use statement_ledger::ledger::ChainLinker;
use statement_ledger::metrics::MetricsRegistry;

fn print_help() {
    eprintln!(
        "\
ledger-admin

USAGE:
  ledger-admin <command> [options]

COMMANDS:
  migrate                         Run database migrations
  verify-chain                    Walk the chain from the tail and recompute fingerprints
  tail                            Print the current tail entry
  show-entry                      Print one ledger entry
  append                          Append a statement to the chain

COMMON OPTIONS:
  --database-url <postgres_url>    (defaults to env DATABASE_URL)

show-entry OPTIONS:
  --id <uuid>                     (required)

append OPTIONS:
  --statement <text>              (required)
  --speaker <name>                (required)
  --source-url <url>              (optional)
  --statement-date <YYYY-MM-DD>   (optional)
  --max-retries <n>               (default: 5) CAS retries before giving up
"
    );
}

fn require_database_url(database_url: Option<String>) -> anyhow::Result<String> {
    database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required (or pass --database-url)"))
}

fn take_value(args: &mut VecDeque<String>, flag: &str) -> anyhow::Result<String> {
    args.pop_front()
        .ok_or_else(|| anyhow::anyhow!("missing value for {flag}"))
}

async fn connect(database_url: Option<String>) -> anyhow::Result<PgPool> {
    let database_url = require_database_url(database_url)?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;
    Ok(pool)
}

fn linker(pool: PgPool, retry: RetryConfig) -> ChainLinker {
    let store: Arc<dyn LedgerStore> = Arc::new(PgLedgerStore::new(pool));
    ChainLinker::new(store, Arc::new(MetricsRegistry::new())).with_retry(retry)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args: VecDeque<String> = std::env::args().skip(1).collect();
    let Some(command) = args.pop_front() else {
        print_help();
        return Ok(());
    };

    if matches!(command.as_str(), "-h" | "--help" | "help") {
        print_help();
        return Ok(());
    }

    match command.as_str() {
        "migrate" => {
            let mut database_url: Option<String> = None;
            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--database-url" => database_url = Some(take_value(&mut args, &arg)?),
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let pool = connect(database_url).await?;
            statement_ledger::migrations::run_postgres(&pool).await?;
            println!("ok: migrations applied");
            Ok(())
        }
        "verify-chain" | "tail" => {
            let mut database_url: Option<String> = None;
            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--database-url" => database_url = Some(take_value(&mut args, &arg)?),
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let linker = linker(connect(database_url).await?, RetryConfig::chain_append());
            if command == "tail" {
                return print_json(&linker.tail().await?);
            }

            let report = linker.verify_chain().await?;
            print_json(&report)?;
            if !report.valid {
                anyhow::bail!("chain verification failed");
            }
            Ok(())
        }
        "show-entry" => {
            let mut database_url: Option<String> = None;
            let mut id: Option<Uuid> = None;
            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--database-url" => database_url = Some(take_value(&mut args, &arg)?),
                    "--id" => id = Some(Uuid::parse_str(&take_value(&mut args, &arg)?)?),
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }
            let id = id.ok_or_else(|| anyhow::anyhow!("--id is required"))?;

            let store = PgLedgerStore::new(connect(database_url).await?);
            match store.get_by_id(id).await? {
                Some(entry) => print_json(&entry),
                None => anyhow::bail!("entry not found: {id}"),
            }
        }
        "append" => {
            let mut database_url: Option<String> = None;
            let mut statement: Option<String> = None;
            let mut speaker: Option<String> = None;
            let mut source_url: Option<String> = None;
            let mut statement_date: Option<NaiveDate> = None;
            let mut max_retries = RetryConfig::chain_append().max_retries;

            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--database-url" => database_url = Some(take_value(&mut args, &arg)?),
                    "--statement" => statement = Some(take_value(&mut args, &arg)?),
                    "--speaker" => speaker = Some(take_value(&mut args, &arg)?),
                    "--source-url" => source_url = Some(take_value(&mut args, &arg)?),
                    "--statement-date" => {
                        let raw = take_value(&mut args, &arg)?;
                        statement_date = Some(NaiveDate::parse_from_str(&raw, "%Y-%m-%d")?);
                    }
                    "--max-retries" => max_retries = take_value(&mut args, &arg)?.parse()?,
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let statement = statement.ok_or_else(|| anyhow::anyhow!("--statement is required"))?;
            let speaker = speaker.ok_or_else(|| anyhow::anyhow!("--speaker is required"))?;

            let mut candidate = NewStatement::new(statement, speaker);
            if let Some(url) = source_url {
                candidate = candidate.with_source_url(url);
            }
            if let Some(date) = statement_date {
                candidate = candidate.with_statement_date(date);
            }

            let retry = RetryConfig::chain_append().with_max_retries(max_retries);
            let entry = linker(connect(database_url).await?, retry)
                .append(candidate)
                .await?;
            print_json(&entry)
        }
        other => {
            print_help();
            anyhow::bail!("unknown command: {other}")
        }
    }
}
