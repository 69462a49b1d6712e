use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::models::{Article, JobRecord};
use crate::report::{unique_path, ReportFormat, ReportOutcome};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub total_articles: usize,
    pub job_related_articles: usize,
    pub confirmed_job_postings: usize,
    pub articles_with_job_images: usize,
    pub total_positions: usize,
}

impl RunStats {
    pub fn from_articles(articles: &[Article]) -> Self {
        Self {
            total_articles: articles.len(),
            job_related_articles: articles.iter().filter(|a| a.is_job_related).count(),
            confirmed_job_postings: articles
                .iter()
                .filter(|a| a.extraction_result.as_ref().is_some_and(|r| r.is_job_posting()))
                .count(),
            articles_with_job_images: articles.iter().filter(|a| a.has_job_images).count(),
            total_positions: articles.iter().map(extracted_positions).sum(),
        }
    }
}

// Positions the model reported, before any placeholder is added.
fn extracted_positions(article: &Article) -> usize {
    article
        .extraction_result
        .as_ref()
        .filter(|r| r.success)
        .and_then(|r| r.job_info.get("positions"))
        .and_then(|p| p.as_array())
        .map_or(0, |p| p.len())
}

const HEADLINE_CHARS: usize = 80;

fn headline_for<'a>(job: &JobRecord, articles: &'a [Article]) -> Option<&'a str> {
    articles
        .iter()
        .find(|a| a.title == job.article_title && a.link == job.article_url)
        .and_then(|a| a.ai_summary.as_ref())
        .and_then(|s| s.headline())
}

fn salary_text(job: &JobRecord) -> String {
    match (job.salary_min, job.salary_max) {
        (Some(min), Some(max)) => format!("{}-{} {}/{}", min, max, job.salary_currency, job.salary_period),
        _ if !job.salary_original.is_empty() => job.salary_original.clone(),
        _ => String::new(),
    }
}

fn or_unknown<'a>(text: &'a str, fallback: &'a str) -> &'a str {
    if text.is_empty() { fallback } else { text }
}

/// Plain-text run summary for chat or push notifications. Each listed job
/// carries its article's summary headline when one exists.
pub fn render_digest(
    stats: &RunStats,
    articles: &[Article],
    jobs: &[JobRecord],
    max_jobs: usize,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Job posting monitor report");
    let _ = writeln!(out, "Time: {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out);
    let _ = writeln!(out, "Articles checked:    {}", stats.total_articles);
    let _ = writeln!(out, "Job related:         {}", stats.job_related_articles);
    let _ = writeln!(out, "Confirmed postings:  {}", stats.confirmed_job_postings);
    let _ = writeln!(out, "Positions extracted: {}", jobs.len());
    let _ = writeln!(out);

    if jobs.is_empty() {
        let _ = writeln!(out, "No new job postings found in this run.");
        return out;
    }

    let _ = writeln!(out, "Postings:");
    for (i, job) in jobs.iter().take(max_jobs).enumerate() {
        let _ = write!(
            out,
            "{}. {} @ {}",
            i + 1,
            or_unknown(&job.job_title, "unknown position"),
            or_unknown(&job.company_name, "unknown company")
        );
        let salary = salary_text(job);
        if !salary.is_empty() {
            let _ = write!(out, " | {}", salary);
        }
        let _ = writeln!(out);
        if let Some(headline) = headline_for(job, articles) {
            let short: String = headline.chars().take(HEADLINE_CHARS).collect();
            let _ = writeln!(out, "   {}", short);
        }
    }
    if jobs.len() > max_jobs {
        let _ = writeln!(out, "... and {} more, see the attached reports", jobs.len() - max_jobs);
    }
    out
}

#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    timestamp: String,
    success: bool,
    message: &'a str,
    statistics: &'a RunStats,
    report_files: &'a BTreeMap<ReportFormat, PathBuf>,
}

/// Writes `run_result_<timestamp>.json` next to the reports.
pub fn write_run_summary(dir: &Path, stats: &RunStats, outcome: &ReportOutcome) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let now = Local::now();
    let path = unique_path(dir, "run_result", &now.format("%Y%m%d_%H%M%S").to_string(), "json");
    let summary = RunSummary {
        timestamp: now.format("%Y-%m-%dT%H:%M:%S").to_string(),
        success: outcome.success,
        message: &outcome.message,
        statistics: stats,
        report_files: &outcome.files,
    };

    let content = serde_json::to_string_pretty(&summary)?;
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write run summary: {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Currency, ExtractionResult, Period, SummaryResult};
    use serde_json::json;

    fn job(title: &str, company: &str, min: Option<f64>, max: Option<f64>, original: &str) -> JobRecord {
        JobRecord {
            extraction_time: String::new(),
            published_date: String::new(),
            source: String::new(),
            article_title: String::new(),
            company_name: company.to_string(),
            job_title: title.to_string(),
            department: String::new(),
            location: String::new(),
            employment_type: String::new(),
            salary_min: min,
            salary_max: max,
            salary_currency: Currency::Cny,
            salary_period: Period::Monthly,
            salary_original: original.to_string(),
            requirements: String::new(),
            responsibilities: String::new(),
            benefits: String::new(),
            contact_person: String::new(),
            contact_phone: String::new(),
            contact_email: String::new(),
            contact_handle: String::new(),
            application_method: String::new(),
            deadline: String::new(),
            additional_info: String::new(),
            company_address: String::new(),
            article_url: String::new(),
            has_image_text: false,
            ai_confidence: false,
            is_confirmed: true,
        }
    }

    #[test]
    fn test_run_stats_from_articles() {
        let confirmed = Article {
            is_job_related: true,
            has_job_images: true,
            extraction_result: Some(ExtractionResult {
                success: true,
                job_info: json!({ "is_job_posting": true, "positions": [{}, {}, {}] }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let rejected = Article {
            is_job_related: true,
            extraction_result: Some(ExtractionResult {
                success: true,
                job_info: json!({ "is_job_posting": false, "positions": [{}] }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let failed = Article {
            extraction_result: Some(ExtractionResult {
                job_info: json!({ "positions": [{}, {}] }),
                ..ExtractionResult::failed("timeout")
            }),
            ..Default::default()
        };
        let stats = RunStats::from_articles(&[confirmed, rejected, failed, Article::default()]);
        assert_eq!(
            stats,
            RunStats {
                total_articles: 4,
                job_related_articles: 2,
                confirmed_job_postings: 1,
                articles_with_job_images: 1,
                total_positions: 4,
            }
        );
    }

    #[test]
    fn test_total_positions_skip_placeholders() {
        // A posting without positions yields a placeholder record but no
        // extracted position.
        let empty_posting = Article {
            extraction_result: Some(ExtractionResult {
                success: true,
                job_info: json!({ "is_job_posting": true, "positions": [] }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let malformed = Article {
            extraction_result: Some(ExtractionResult {
                success: true,
                job_info: json!({ "is_job_posting": true, "positions": "副导演" }),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(RunStats::from_articles(&[empty_posting, malformed]).total_positions, 0);
    }

    #[test]
    fn test_digest_shows_summary_headline() {
        let mut listed = job("副导演", "测试影视公司", None, None, "");
        listed.article_title = "急招副导演".to_string();
        listed.article_url = "https://example.com/a/1".to_string();
        let article = Article {
            title: "急招副导演".to_string(),
            link: "https://example.com/a/1".to_string(),
            ai_summary: Some(SummaryResult {
                success: true,
                summary: "北京剧组招聘副导演，月薪面议。\n包含招聘信息：是".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let other = job("剪辑师", "光影传媒", None, None, "");

        let digest = render_digest(&RunStats::default(), &[article], &[listed, other], 5);
        assert!(digest.contains("1. 副导演 @ 测试影视公司\n   北京剧组招聘副导演，月薪面议。\n"));
        assert!(digest.contains("2. 剪辑师 @ 光影传媒\n"));
        assert!(!digest.contains("包含招聘信息"));
    }

    #[test]
    fn test_digest_lists_first_jobs() {
        let jobs = vec![
            job("副导演", "测试影视公司", Some(8000.0), Some(12000.0), "8000-12000元/月"),
            job("剪辑师", "", None, None, "面议"),
            job("", "光影传媒", None, None, ""),
        ];
        let digest = render_digest(&RunStats::default(), &[], &jobs, 2);
        assert!(digest.contains("1. 副导演 @ 测试影视公司 | 8000-12000 CNY/monthly"));
        assert!(digest.contains("2. 剪辑师 @ unknown company | 面议"));
        assert!(!digest.contains("光影传媒"));
        assert!(digest.contains("... and 1 more"));
    }

    #[test]
    fn test_digest_without_jobs() {
        let digest = render_digest(&RunStats::default(), &[], &[], 5);
        assert!(digest.contains("No new job postings found"));
        assert!(!digest.contains("Postings:"));
    }

    #[test]
    fn test_write_run_summary() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = BTreeMap::new();
        files.insert(ReportFormat::Json, dir.path().join("jobs_x.json"));
        let outcome = ReportOutcome {
            success: true,
            message: "generated reports for 1 job postings".to_string(),
            job_count: 1,
            files,
        };
        let stats = RunStats { total_articles: 2, total_positions: 1, ..Default::default() };

        let path = write_run_summary(dir.path(), &stats, &outcome).unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("run_result_"));

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["statistics"]["total_articles"], 2);
        assert!(value["report_files"]["json"].is_string());
    }
}
