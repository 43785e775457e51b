mod job;

use anyhow::{Context, Result};
use arbiter_common::config::EngineConfig;
use arbiter_engine::Grader;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "arbiter-worker")]
#[command(about = "Arbiter Worker - grade untrusted submissions against test cases", long_about = None)]
struct Cli {
    /// Engine config file (defaults to $ARBITER_CONFIG, then config/arbiter.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade one job and print the report as JSON on stdout
    Grade {
        /// Job file; `-` or omitted reads stdin
        #[arg(short, long)]
        job: Option<PathBuf>,

        /// Pretty-print the report
        #[arg(long, default_value = "false")]
        pretty: bool,

        /// Skip the interpreter check at startup
        #[arg(long, default_value = "false")]
        skip_runtime_check: bool,
    },

    /// Check that every configured interpreter can be launched
    Check,

    /// List configured languages
    Languages,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // stdout carries the report; logs go to stderr
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = EngineConfig::resolve(cli.config.as_deref()).map_err(|e| {
        error!("Failed to load engine configuration: {:#}", e);
        e
    })?;
    config.validate()?;

    info!("Loaded language configurations for: {:?}", config.list_languages());

    let grader = Grader::new(&config).context("Failed to initialize grader")?;

    match cli.command {
        Commands::Grade {
            job: job_path,
            pretty,
            skip_runtime_check,
        } => {
            if !skip_runtime_check {
                grader.verify_runtimes().await.context("Runtime check failed")?;
            }

            let job = job::read_job(job_path.as_deref()).await?;
            info!(
                language = %job.request.language,
                test_cases = job.test_cases.len(),
                source_size = job.request.source_code.len(),
                "Received job"
            );

            // Grading blocks on child processes; keep it off the main task
            let grader = std::sync::Arc::new(grader);
            let report = tokio::spawn({
                let grader = grader.clone();
                async move { grader.grade(&job.request, &job.test_cases).await }
            })
            .await
            .context("Grading task failed")??;

            let rendered = if pretty {
                serde_json::to_string_pretty(&report)?
            } else {
                serde_json::to_string(&report)?
            };
            println!("{}", rendered);
        }
        Commands::Check => {
            for (language, version) in grader.verify_runtimes().await? {
                println!("{}: {}", language, version);
            }
        }
        Commands::Languages => {
            for language in grader.languages() {
                let command = config
                    .get_language(language)
                    .map(|c| c.command.as_str())
                    .unwrap_or("-");
                println!("{}\t{}", language, command);
            }
        }
    }

    Ok(())
}
