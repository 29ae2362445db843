use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

mod aggregate;
mod error;
mod ingest;
mod models;
mod report;
mod risk;
mod rules;
mod server;

use models::{RiskLevel, ScoredRecord};
use report::RecordFilter;
use risk::Pipeline;

#[derive(Parser)]
#[command(name = "risk-triage")]
#[command(about = "Rule-based risk triage for disbursement and audit records", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    #[arg(long, value_enum)]
    level: Option<RiskLevel>,
    #[arg(long)]
    state: Option<String>,
    #[arg(long)]
    department: Option<String>,
    #[arg(long)]
    scheme: Option<String>,
    /// Case-insensitive text matched against vendor, department, scheme, state and reasons
    #[arg(long)]
    search: Option<String>,
}

impl From<FilterArgs> for RecordFilter {
    fn from(args: FilterArgs) -> Self {
        RecordFilter {
            level: args.level,
            state: args.state,
            department: args.department,
            scheme: args.scheme,
            search: args.search,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the upload endpoint over HTTP
    Serve {
        #[arg(long, default_value = "127.0.0.1:8000")]
        bind: SocketAddr,
        #[arg(long, default_value_t = 64)]
        max_upload_mb: usize,
    },
    /// Score a CSV file and print the riskiest records
    Score {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, value_enum, default_value_t = Pipeline::Disbursement)]
        pipeline: Pipeline,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Print every scored record as a JSON array
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Generate a markdown triage report
    Report {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, value_enum, default_value_t = Pipeline::Disbursement)]
        pipeline: Pipeline,
        #[arg(long, default_value_t = 75)]
        min_score: u32,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Export scored records as CSV
    Export {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, value_enum, default_value_t = Pipeline::Disbursement)]
        pipeline: Pipeline,
        #[arg(long, default_value = "scored.csv")]
        out: PathBuf,
        /// Keep only records scoring above the high-risk cutoff
        #[arg(long)]
        high_only: bool,
        #[command(flatten)]
        filter: FilterArgs,
    },
}

fn score_file(
    path: &Path,
    pipeline: Pipeline,
    filter: FilterArgs,
) -> anyhow::Result<Vec<ScoredRecord>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let records = pipeline
        .score_upload(&bytes)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(report::filter(records, &filter.into()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            bind,
            max_upload_mb,
        } => {
            server::serve(server::ServerConfig {
                bind,
                max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
            })
            .await?;
        }
        Commands::Score {
            csv,
            pipeline,
            limit,
            json,
            filter,
        } => {
            let records = score_file(&csv, pipeline, filter)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
                return Ok(());
            }

            if records.is_empty() {
                println!("No matching records in {}.", csv.display());
                return Ok(());
            }

            println!("Top records by risk score:");
            for record in risk::ranked(&records).into_iter().take(limit) {
                println!(
                    "- {} / {} ({}) score {} [{}]: {}",
                    record.details.scheme(),
                    record.details.vendor_name(),
                    record.details.department(),
                    record.risk_score,
                    record.risk_level.as_str(),
                    record.risk_reasons.join("; ")
                );
            }
        }
        Commands::Report {
            csv,
            pipeline,
            min_score,
            out,
            filter,
        } => {
            let records = score_file(&csv, pipeline, filter)?;
            let source = csv.display().to_string();
            let markdown = report::build_report(pipeline, &source, min_score, &records);
            std::fs::write(&out, markdown)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export {
            csv,
            pipeline,
            out,
            high_only,
            filter,
        } => {
            let records = score_file(&csv, pipeline, filter)?;
            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            let written = report::write_csv(&records, high_only, file)?;
            println!("Exported {written} records to {}.", out.display());
        }
    }

    Ok(())
}
