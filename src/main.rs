use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use fristwatch::analysis::kpi;
use fristwatch::config::EngineConfig;
use fristwatch::detect::engine::InsightEngine;
use fristwatch::records::{self, DispatchRecord, RawRecord};

#[derive(Parser)]
#[command(
    name = "fristwatch",
    about = "Response-time compliance analytics and anomaly detection for emergency dispatch data",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the insight engine over a batch of dispatch records
    Analyze {
        /// Path to a JSON file with raw dispatch records
        #[arg(long)]
        input: PathBuf,

        /// Bound on the number of reported insights
        #[arg(long)]
        max_insights: Option<usize>,

        /// Optional TOML file overriding detection thresholds
        #[arg(long)]
        config: Option<PathBuf>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Compute the batch KPI report (quotas, means, 90th percentiles)
    Kpi {
        /// Path to a JSON file with raw dispatch records
        #[arg(long)]
        input: PathBuf,

        /// Optional TOML file overriding compliance targets
        #[arg(long)]
        config: Option<PathBuf>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    // Initialize tracing; logs go to stderr so `--json` output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            input,
            max_insights,
            config,
            json,
        } => {
            let cfg = load_config(config.as_deref())?;
            let batch = load_records(&input, &cfg)?;
            tracing::info!(records = batch.len(), input = %input.display(), "Analyzing batch");

            let max = max_insights.unwrap_or(cfg.insights.max_insights);
            let bundle = InsightEngine::new(cfg).generate(&batch, max);

            if json {
                println!("{}", serde_json::to_string_pretty(&bundle)?);
            } else {
                print_insights(&batch, &bundle);
            }
        }
        Commands::Kpi {
            input,
            config,
            json,
        } => {
            let cfg = load_config(config.as_deref())?;
            let batch = load_records(&input, &cfg)?;
            tracing::info!(records = batch.len(), input = %input.display(), "Computing KPIs");

            let report = kpi::compute(&batch, &cfg.compliance);

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_kpis(&report);
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(p) => EngineConfig::load(p).context("Failed to load config"),
        None => Ok(EngineConfig::default()),
    }
}

fn load_records(path: &Path, cfg: &EngineConfig) -> Result<Vec<DispatchRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read records from {}", path.display()))?;
    let raw: Vec<RawRecord> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse records from {}", path.display()))?;
    Ok(records::process(raw, &cfg.compliance))
}

fn print_insights(batch: &[DispatchRecord], bundle: &fristwatch::InsightBundle) {
    println!("\n=== Fristwatch Insight Report ===");
    println!("Records:  {}", batch.len());
    println!(
        "Insights: {} ({} critical, {} warning, {} info)",
        bundle.len(),
        bundle.critical.len(),
        bundle.warnings.len(),
        bundle.info.len()
    );

    if bundle.is_empty() {
        println!("\nNo anomalies detected.");
    }

    for insight in &bundle.all {
        let severity = format!("{:?}", insight.severity).to_uppercase();
        println!("\n[{:<8}] {}", severity, insight.title);
        println!("           {}", insight.message);
    }
    println!("=================================\n");
}

fn print_kpis(report: &kpi::KpiReport) {
    let fmt_opt = |v: Option<f64>| match v {
        Some(v) => format!("{v:.1}"),
        None => "n/a".to_string(),
    };

    println!("\n=== Fristwatch KPI Report ===");
    println!("{:<28} | {}", "Dispatches", report.total);
    println!("{:<28} | {}", "  compliance-relevant", report.relevant);
    println!("{:<28} | {}", "  exempt (-NF)", report.non_relevant);
    println!(
        "{:<28} | {}% ({}/{})",
        "Response quota",
        fmt_opt(report.response.quota),
        report.response.achieved,
        report.response.valid
    );
    println!(
        "{:<28} | {}s mean, {}s p90",
        "Response time",
        fmt_opt(report.response.mean_secs),
        fmt_opt(report.response.p90_secs)
    );
    println!(
        "{:<28} | {}% ({}/{})",
        "Travel quota",
        fmt_opt(report.travel.quota),
        report.travel.achieved,
        report.travel.valid
    );
    println!(
        "{:<28} | {}s mean, {}s p90",
        "Travel time",
        fmt_opt(report.travel.mean_secs),
        fmt_opt(report.travel.p90_secs)
    );
    println!(
        "{:<28} | {}% ({}/{})",
        "Compliance quota",
        fmt_opt(report.compliance_quota),
        report.compliance_met,
        report.compliance_known
    );
    println!("=============================\n");
}
