use crate::infra::{build_pipeline, parse_date, parse_identity_type};
use crate::server;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use credit_pipeline::config::AppConfig;
use credit_pipeline::error::AppError;
use credit_pipeline::telemetry;
use credit_pipeline::workflows::assessment::{
    AssessmentError, CorrelationContext, IdentityRequest, IdentityType,
};
use serde_json::json;

#[derive(Parser, Debug)]
#[command(
    name = "Credit Assessment Orchestrator",
    about = "Run the credit assessment orchestration service or a one-shot assessment from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Run a single assessment against the configured bureau and print the result
    Assess(AssessArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct AssessArgs {
    /// Identity document kind: national_id, passport, or tax_number
    #[arg(long, value_parser = parse_identity_type, default_value = "national_id")]
    identity_type: IdentityType,
    /// Identity document number to look up
    #[arg(long)]
    identity_no: String,
    /// Applicant full name as printed on the identity document
    #[arg(long)]
    full_name: String,
    /// Applicant mother's maiden name, when available
    #[arg(long)]
    mother_name: Option<String>,
    /// Applicant birth date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    birth_date: Option<NaiveDate>,
    /// Override the configured cache-freshness tolerance in days
    #[arg(long)]
    tolerance_days: Option<i64>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Assess(args) => run_assess(args).await,
    }
}

async fn run_assess(args: AssessArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let pipeline = build_pipeline(&config)?;
    let request = IdentityRequest {
        identity_type: args.identity_type,
        identity_no: args.identity_no,
        full_name: args.full_name,
        mother_name: args.mother_name,
        birth_date: args.birth_date,
        tolerance_days: args.tolerance_days,
    };
    let ctx = CorrelationContext::new("corr-cli", "req-cli-000001");

    match pipeline.assess(&ctx, &request).await {
        Ok(result) => {
            let rendered = serde_json::to_string_pretty(&result)
                .expect("assessment result serializes to JSON");
            println!("{rendered}");
            Ok(())
        }
        Err(AssessmentError::Rejected { reason }) => {
            let rendered =
                serde_json::to_string_pretty(&json!({ "rejected": true, "reason": reason }))
                    .expect("rejection payload serializes to JSON");
            println!("{rendered}");
            Ok(())
        }
        Err(err) => {
            eprintln!("assessment failed: {err}");
            std::process::exit(1);
        }
    }
}
