use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use cohort_exam_insights::pipeline::{analyze_grids, AnalysisResult};
use cohort_exam_insights::{export, report, sheet, ScoringConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "exam-insights")]
#[command(about = "Reconcile two exam sittings and flag students who need support", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Inputs {
    /// CSV export of the first sitting
    #[arg(long)]
    exam1: PathBuf,
    /// CSV export of the second sitting
    #[arg(long)]
    exam2: PathBuf,
    /// TOML file overriding scoring constants
    #[arg(long)]
    config: Option<PathBuf>,
    /// Seed for prediction jitter and quote selection
    #[arg(long, env = "EXAM_INSIGHTS_SEED", default_value_t = 42)]
    seed: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the students most at risk
    Analyze {
        #[command(flatten)]
        inputs: Inputs,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Also write the full result as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        inputs: Inputs,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Export per-student results as CSV
    Export {
        #[command(flatten)]
        inputs: Inputs,
        #[arg(long, default_value = "results.csv")]
        out: PathBuf,
        /// Class statistics sheet written next to the student rows
        #[arg(long, default_value = "statistics.csv")]
        stats_out: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ScoringConfig> {
    match path {
        Some(path) => Ok(ScoringConfig::from_path(path)?),
        None => Ok(ScoringConfig::default()),
    }
}

fn run(inputs: &Inputs) -> anyhow::Result<AnalysisResult> {
    let config = load_config(inputs.config.as_deref())?;
    let exam1 = sheet::read_grid(&inputs.exam1).context("failed to load exam 1")?;
    let exam2 = sheet::read_grid(&inputs.exam2).context("failed to load exam 2")?;
    let mut rng = StdRng::seed_from_u64(inputs.seed);
    Ok(analyze_grids(&exam1, &exam2, &config, &mut rng))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            inputs,
            limit,
            json,
        } => {
            let result = run(&inputs)?;

            if result.is_empty() {
                println!("No usable records in either sitting.");
                return Ok(());
            }

            let stats = &result.statistics;
            println!(
                "{} students, mean {:.2}, pass rate {:.1}%",
                stats.total_students, stats.mean, stats.pass_rate
            );

            let at_risk: Vec<_> = result
                .analytics
                .high_risk
                .iter()
                .chain(result.analytics.medium_risk.iter())
                .take(limit)
                .collect();
            if at_risk.is_empty() {
                println!("No students flagged at medium or high risk.");
            } else {
                println!("Students most at risk:");
                for summary in at_risk {
                    println!(
                        "- #{} {} ({}) risk {}, average {:.2}, change {:+.2}, success {:.0}%",
                        summary.rank,
                        summary.name,
                        summary.id,
                        summary.risk_tier.label_ar(),
                        summary.overall_average,
                        summary.improvement,
                        summary.success_probability
                    );
                }
            }

            if let Some(path) = json {
                let body = serde_json::to_string_pretty(&result)
                    .context("failed to serialize analysis result")?;
                std::fs::write(&path, body)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("Full result written to {}.", path.display());
            }
        }
        Commands::Report { inputs, limit, out } => {
            let result = run(&inputs)?;
            let report = report::build_report(&result, limit);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export {
            inputs,
            out,
            stats_out,
        } => {
            let result = run(&inputs)?;
            let written = export::write_csv_file(&result, &out)?;
            export::write_statistics_file(&result, &stats_out)?;
            println!(
                "Exported {written} students to {} and class statistics to {}.",
                out.display(),
                stats_out.display()
            );
        }
    }

    Ok(())
}
