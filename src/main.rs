mod ai;
mod config;
mod contact;
mod digest;
mod errors;
mod extract;
mod models;
mod report;
mod rules;
mod salary;
mod text;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use digest::RunStats;
use extract::JobRecordBuilder;
use report::{ReportEmitter, ReportFormat};
use rules::ParseRules;
use salary::SalaryParser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "jobwatch")]
#[command(about = "Turn job posting articles into structured reports")]
struct Cli {
    /// TOML file overriding the default parse rules
    #[arg(long, global = true)]
    rules: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build job records from analyzed articles and write reports
    Report {
        /// JSON array of articles with extraction results
        input: PathBuf,

        /// Directory for report files (defaults to JOBWATCH_OUTPUT_DIR)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Report formats to write (repeatable, defaults to all)
        #[arg(short, long, value_enum)]
        format: Vec<ReportFormat>,
    },

    /// Summarize articles, run AI extraction and save the enriched articles
    Extract {
        /// JSON array of articles
        input: PathBuf,

        /// Where to write the analyzed articles
        #[arg(short, long, default_value = "analyzed_articles.json")]
        output: PathBuf,

        /// Model to use (defaults to JOBWATCH_MODEL)
        #[arg(short, long)]
        model: Option<String>,

        /// Seconds to wait between API calls (defaults to JOBWATCH_REQUEST_DELAY_SECS)
        #[arg(long)]
        delay: Option<u64>,
    },

    /// Parse a free-form salary string
    Salary {
        /// Salary text, e.g. "8000-12000元/月"
        text: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("jobwatch={}", config.rust_log).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let rules = load_rules(cli.rules.as_deref())?;

    match cli.command {
        Commands::Report {
            input,
            output_dir,
            format,
        } => {
            let articles = extract::load_articles(&input)?;
            let builder = JobRecordBuilder::new(&rules)?;
            let formats = if format.is_empty() {
                ReportFormat::ALL.to_vec()
            } else {
                format
            };
            let output_dir = output_dir.unwrap_or_else(|| config.output_dir.clone());
            let emitter = ReportEmitter::new(output_dir, formats);

            let (jobs, outcome) = report::process_articles(&builder, &emitter, &articles);

            if jobs.is_empty() {
                println!("No job postings found in {} articles.", articles.len());
            } else {
                println!(
                    "{:<4} {:<25} {:<20} {:<12} {:>20}",
                    "#", "TITLE", "COMPANY", "LOCATION", "SALARY"
                );
                println!("{}", "-".repeat(85));
                for (i, job) in jobs.iter().enumerate() {
                    let salary = match (job.salary_min, job.salary_max) {
                        (Some(min), Some(max)) => format!("{}-{} {}", min, max, job.salary_currency),
                        (Some(min), None) => format!("{}+ {}", min, job.salary_currency),
                        (None, Some(max)) => format!("<={} {}", max, job.salary_currency),
                        (None, None) => "-".to_string(),
                    };
                    println!(
                        "{:<4} {:<25} {:<20} {:<12} {:>20}",
                        i + 1,
                        truncate(&job.job_title, 25),
                        truncate(&job.company_name, 20),
                        truncate(&job.location, 12),
                        salary
                    );
                }
            }

            println!();
            println!("{}", outcome.message);
            for (format, path) in &outcome.files {
                println!("  {:<5} {}", format.as_str(), path.display());
            }

            let stats = RunStats::from_articles(&articles);
            println!();
            print!(
                "{}",
                digest::render_digest(&stats, &articles, &jobs, config.digest_max_jobs)
            );

            let summary = digest::write_run_summary(emitter.output_dir(), &stats, &outcome)?;
            println!();
            println!("Run summary: {}", summary.display());
        }

        Commands::Extract {
            input,
            output,
            model,
            delay,
        } => {
            let articles = extract::load_articles(&input)?;
            let spec = ai::resolve_model(model.as_deref().unwrap_or(&config.model))?;
            let provider = ai::create_provider(&spec)?;
            let delay = Duration::from_secs(delay.unwrap_or(config.request_delay_secs));

            println!("Analyzing {} articles with {}...", articles.len(), spec.short_name);
            let analyzed =
                ai::analyze_articles(provider.as_ref(), articles, &rules.job_title_markers, delay);

            let postings = analyzed
                .iter()
                .filter(|a| a.extraction_result.as_ref().is_some_and(|r| r.is_job_posting()))
                .count();

            let content = serde_json::to_string_pretty(&analyzed)?;
            std::fs::write(&output, content)
                .with_context(|| format!("Failed to write analyzed articles: {}", output.display()))?;

            println!("✓ {} job postings found in {} articles", postings, analyzed.len());
            println!("  Saved to: {}", output.display());
        }

        Commands::Salary { text } => {
            let parser = SalaryParser::new(&rules)?;
            let info = parser.parse_salary(text.as_str());
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
    }

    Ok(())
}

fn load_rules(path: Option<&Path>) -> Result<ParseRules> {
    match path {
        Some(path) => ParseRules::from_toml_file(path),
        None => Ok(ParseRules::default()),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("副导演", 10), "副导演");
        assert_eq!(truncate("北京光影传媒有限公司招聘", 8), "北京光影传...");
        assert_eq!(truncate("editor", 6), "editor");
    }

    #[test]
    fn test_cli_parses_report_formats() {
        let cli = Cli::try_parse_from([
            "jobwatch", "--rules", "rules.toml", "report", "articles.json", "-f", "csv", "-f", "json",
        ])
        .unwrap();
        assert_eq!(cli.rules, Some(PathBuf::from("rules.toml")));
        match cli.command {
            Commands::Report { input, format, output_dir } => {
                assert_eq!(input, PathBuf::from("articles.json"));
                assert_eq!(format, vec![ReportFormat::Csv, ReportFormat::Json]);
                assert!(output_dir.is_none());
            }
            _ => panic!("expected report command"),
        }
    }
}
