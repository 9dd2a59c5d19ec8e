use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use interfaces::MailSender;
use mail_notifier::{MailerConfig, SmtpMailer};
use mws_client::report_manager::RequestFilter;
use mws_client::{ClientConfig, FeedSubmission, KeyBy, KeyedDiskStore, MwsClient};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// Channel whose listings the export leaves out.
const EXCLUDED_CHANNEL: &str = "AMAZON_NA";

#[derive(Parser)]
#[command(name = "mws", about = "Marketplace feeds and reports from the command line")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Open listings inventory
    Inventory {
        #[arg(long, value_enum, default_value = "sku")]
        by: KeyColumn,
        /// Keep the result as a store at this path
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// FBA inventory
    Inbound {
        #[arg(long, value_enum, default_value = "sku")]
        by: KeyColumn,
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Orders in a date range (RFC 3339), the last day by default
    Orders {
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        #[arg(long)]
        to: Option<DateTime<Utc>>,
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Report requests on record
    Requests {
        #[arg(long = "type")]
        report_type: Option<String>,
    },
    /// Submit a feed from a JSON file holding a list of items, each a list
    /// of [path, value] pairs
    Submit {
        #[arg(long = "type")]
        feed_type: String,
        #[arg(long)]
        items: PathBuf,
        #[arg(long)]
        no_wait: bool,
    },
    /// Processing status of feed submissions
    Status { ids: Vec<String> },
    /// Cancel feed submissions
    Cancel { ids: Vec<String> },
    /// Write merchant listings to a CSV file and optionally mail it
    ExportListings {
        #[arg(long)]
        out: PathBuf,
        #[arg(long = "mail-to")]
        mail_to: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KeyColumn {
    Sku,
    Asin,
}

impl From<KeyColumn> for KeyBy {
    fn from(column: KeyColumn) -> Self {
        match column {
            KeyColumn::Sku => KeyBy::Sku,
            KeyColumn::Asin => KeyBy::Asin,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env().context("Failed to load client configuration")?;
    let mut client = MwsClient::connect(config).await?;

    match cli.command {
        Command::Inventory { by, save } => {
            let report = client.reports().inventory(by.into()).await?;
            print_store(report.rows, save)?;
        }
        Command::Inbound { by, save } => {
            let report = client.reports().inbound(by.into()).await?;
            if report.stale_fallback {
                eprintln!("warning: inbound inventory comes from an older report");
            }
            print_store(report.rows, save)?;
        }
        Command::Orders { from, to, save } => {
            let orders = client.reports().orders(from, to).await?;
            print_store(orders, save)?;
        }
        Command::Requests { report_type } => {
            let filter = match report_type {
                Some(report_type) => RequestFilter::Type(report_type),
                None => RequestFilter::All,
            };
            for request in client.reports().request_list(filter).await? {
                println!("{}", serde_json::to_string(&request)?);
            }
        }
        Command::Submit { feed_type, items, no_wait } => {
            let raw = fs::read_to_string(&items)
                .with_context(|| format!("Failed to read {}", items.display()))?;
            let messages: Vec<Vec<(String, String)>> = serde_json::from_str(&raw)?;
            let mut feeds = client.feeds();
            for message in messages {
                feeds.add_item(&feed_type, message)?;
            }
            match feeds.submit_feed(&feed_type, !no_wait).await? {
                FeedSubmission::Submitted { submission_id } => println!("{}", submission_id),
                FeedSubmission::Completed(report) => {
                    println!("{} {}", report.submission_id, report.status);
                    for entry in report.results.iter() {
                        let (_, record) = entry?;
                        println!("{}", serde_json::to_string(&record)?);
                    }
                }
            }
        }
        Command::Status { ids } => {
            let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
            for (id, status) in client.feeds().submission_statuses(&ids, true).await? {
                println!("{}\t{}", id, status);
            }
        }
        Command::Cancel { ids } => {
            let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
            for (id, status) in client.feeds().cancel_submissions(&ids).await? {
                println!("{}\t{}", id, status);
            }
        }
        Command::ExportListings { out, mail_to } => {
            let export = client.reports().merchant_listings(Some(EXCLUDED_CHANNEL)).await?;
            let mut writer = csv::Writer::from_path(&out)?;
            writer.write_record(&export.header)?;
            for row in &export.rows {
                writer.write_record(export.header.iter().map(|name| row.get(name).map_or("", |v| v.as_str())))?;
            }
            writer.flush()?;
            info!("Exported {} listings to {}", export.rows.len(), out.display());

            if !mail_to.is_empty() {
                let mailer = SmtpMailer::new(MailerConfig::from_env()?)?;
                let body = format!("<p>{} listings exported.</p>", export.rows.len());
                if !mailer.send("Merchant listings", &body, Some(&out), &mail_to) {
                    bail!("Failed to mail {}", out.display());
                }
            }
        }
    }

    let stats = client.take_stats();
    info!("Transferred {} bytes out, {} bytes in", stats.bytes_out, stats.bytes_in);
    Ok(())
}

fn print_store<V>(mut store: KeyedDiskStore<V>, save: Option<PathBuf>) -> Result<()>
where
    V: Serialize + serde::de::DeserializeOwned,
{
    for entry in store.iter() {
        let (key, value) = entry?;
        println!("{}\t{}", key, serde_json::to_string(&value)?);
    }
    if let Some(path) = save {
        store.save(&path)?;
        info!("Saved {} entries to {}", store.len(), path.display());
    }
    Ok(())
}
