use chrono::Local;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::errors::ReportError;
use crate::extract::JobRecordBuilder;
use crate::models::{Article, JobRecord};

pub const COLUMNS: [&str; 28] = [
    "extraction_time",
    "published_date",
    "source",
    "article_title",
    "company_name",
    "job_title",
    "department",
    "location",
    "employment_type",
    "salary_min",
    "salary_max",
    "salary_currency",
    "salary_period",
    "salary_original",
    "requirements",
    "responsibilities",
    "benefits",
    "contact_person",
    "contact_phone",
    "contact_email",
    "contact_handle",
    "application_method",
    "deadline",
    "additional_info",
    "company_address",
    "article_url",
    "has_image_text",
    "ai_confidence",
];

const SALARY_MIN_COL: usize = 9;
const SALARY_MAX_COL: usize = 10;
const HAS_IMAGE_TEXT_COL: usize = 26;
const AI_CONFIDENCE_COL: usize = 27;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Xlsx,
    Csv,
    Json,
}

impl ReportFormat {
    pub const ALL: [ReportFormat; 3] = [ReportFormat::Xlsx, ReportFormat::Csv, ReportFormat::Json];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Xlsx => "xlsx",
            ReportFormat::Csv => "csv",
            ReportFormat::Json => "json",
        }
    }

    fn file_stem(&self) -> &'static str {
        match self {
            ReportFormat::Xlsx => "jobs_report",
            ReportFormat::Csv | ReportFormat::Json => "jobs",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportOutcome {
    pub success: bool,
    pub message: String,
    pub job_count: usize,
    pub files: BTreeMap<ReportFormat, PathBuf>,
}

impl ReportOutcome {
    fn no_jobs() -> Self {
        Self {
            success: false,
            message: "no job postings found".to_string(),
            job_count: 0,
            files: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub total_jobs: usize,
    pub distinct_companies: usize,
    pub jobs_with_salary: usize,
    pub jobs_with_contact: usize,
}

impl SummaryStats {
    pub fn from_jobs(jobs: &[JobRecord]) -> Self {
        let companies: HashSet<&str> = jobs.iter().map(|j| j.company_name.as_str()).collect();
        Self {
            total_jobs: jobs.len(),
            distinct_companies: companies.len(),
            jobs_with_salary: jobs.iter().filter(|j| j.has_salary()).count(),
            jobs_with_contact: jobs.iter().filter(|j| j.has_contact()).count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupRollup {
    pub key: String,
    pub count: usize,
    pub locations: String,
    pub mean_min_salary: Option<f64>,
    pub mean_max_salary: Option<f64>,
}

pub fn rollup_by<F>(jobs: &[JobRecord], key: F) -> Vec<GroupRollup>
where
    F: Fn(&JobRecord) -> &str,
{
    let mut groups: BTreeMap<&str, Vec<&JobRecord>> = BTreeMap::new();
    for job in jobs {
        groups.entry(key(job)).or_default().push(job);
    }

    groups
        .into_iter()
        .map(|(key, members)| {
            let mut locations: Vec<&str> = Vec::new();
            for job in &members {
                if !job.location.is_empty() && !locations.contains(&job.location.as_str()) {
                    locations.push(&job.location);
                }
            }
            GroupRollup {
                key: key.to_string(),
                count: members.len(),
                locations: locations.join(", "),
                mean_min_salary: mean(members.iter().filter_map(|j| j.salary_min)),
                mean_max_salary: mean(members.iter().filter_map(|j| j.salary_max)),
            }
        })
        .collect()
}

// Two decimals, ties to even.
fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(((sum / count as f64) * 100.0).round_ties_even() / 100.0)
    }
}

fn format_number(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => v.to_string(),
        _ => String::new(),
    }
}

pub fn record_row(job: &JobRecord) -> Vec<String> {
    vec![
        job.extraction_time.clone(),
        job.published_date.clone(),
        job.source.clone(),
        job.article_title.clone(),
        job.company_name.clone(),
        job.job_title.clone(),
        job.department.clone(),
        job.location.clone(),
        job.employment_type.clone(),
        format_number(job.salary_min),
        format_number(job.salary_max),
        job.salary_currency.to_string(),
        job.salary_period.to_string(),
        job.salary_original.clone(),
        job.requirements.clone(),
        job.responsibilities.clone(),
        job.benefits.clone(),
        job.contact_person.clone(),
        job.contact_phone.clone(),
        job.contact_email.clone(),
        job.contact_handle.clone(),
        job.application_method.clone(),
        job.deadline.clone(),
        job.additional_info.clone(),
        job.company_address.clone(),
        job.article_url.clone(),
        job.has_image_text.to_string(),
        job.ai_confidence.to_string(),
    ]
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    generated_at: String,
    total_jobs: usize,
    jobs: &'a [JobRecord],
}

#[derive(Debug, Clone)]
pub struct ReportEmitter {
    output_dir: PathBuf,
    formats: Vec<ReportFormat>,
}

impl ReportEmitter {
    pub fn new(output_dir: impl Into<PathBuf>, formats: Vec<ReportFormat>) -> Self {
        Self {
            output_dir: output_dir.into(),
            formats,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Writes every enabled format. A failing format is logged and left out
    /// of `files`; the others are still attempted.
    pub fn emit(&self, jobs: &[JobRecord]) -> ReportOutcome {
        if jobs.is_empty() {
            warn!("No job postings to report");
            return ReportOutcome::no_jobs();
        }

        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let mut files = BTreeMap::new();

        match std::fs::create_dir_all(&self.output_dir) {
            Ok(()) => {
                for format in &self.formats {
                    match self.write_format(*format, jobs, &stamp) {
                        Ok(path) => {
                            info!("{} report written: {}", format.as_str(), path.display());
                            files.insert(*format, path);
                        }
                        Err(e) => error!("Failed to write {} report: {}", format.as_str(), e),
                    }
                }
            }
            Err(e) => error!(
                "Failed to create output directory {}: {}",
                self.output_dir.display(),
                e
            ),
        }

        let success = !files.is_empty();
        let message = if success {
            format!("generated reports for {} job postings", jobs.len())
        } else {
            "failed to write any report".to_string()
        };

        ReportOutcome {
            success,
            message,
            job_count: jobs.len(),
            files,
        }
    }

    fn write_format(
        &self,
        format: ReportFormat,
        jobs: &[JobRecord],
        stamp: &str,
    ) -> Result<PathBuf, ReportError> {
        let path = unique_path(&self.output_dir, format.file_stem(), stamp, format.as_str());
        match format {
            ReportFormat::Xlsx => write_xlsx(&path, jobs)?,
            ReportFormat::Csv => write_csv(&path, jobs)?,
            ReportFormat::Json => write_json(&path, jobs)?,
        }
        Ok(path)
    }
}

/// `<dir>/<stem>_<stamp>.<ext>`, with `_1`, `_2`, ... appended while taken.
pub fn unique_path(dir: &Path, stem: &str, stamp: &str, ext: &str) -> PathBuf {
    let mut candidate = dir.join(format!("{}_{}.{}", stem, stamp, ext));
    let mut n = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{}_{}_{}.{}", stem, stamp, n, ext));
        n += 1;
    }
    candidate
}

fn create_new(path: &Path) -> Result<File, ReportError> {
    Ok(OpenOptions::new().write(true).create_new(true).open(path)?)
}

// --- CSV ---

fn write_csv(path: &Path, jobs: &[JobRecord]) -> Result<(), ReportError> {
    let mut file = create_new(path)?;
    // Byte-order mark so spreadsheet apps detect UTF-8.
    file.write_all(b"\xEF\xBB\xBF")?;

    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(COLUMNS)?;
    for job in jobs {
        writer.write_record(record_row(job))?;
    }
    writer.flush()?;
    Ok(())
}

// --- JSON ---

fn write_json(path: &Path, jobs: &[JobRecord]) -> Result<(), ReportError> {
    let report = JsonReport {
        generated_at: Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
        total_jobs: jobs.len(),
        jobs,
    };
    let mut writer = BufWriter::new(create_new(path)?);
    serde_json::to_writer_pretty(&mut writer, &report)?;
    writer.flush()?;
    Ok(())
}

// --- Spreadsheet ---

fn write_xlsx(path: &Path, jobs: &[JobRecord]) -> Result<(), ReportError> {
    let header = Format::new().set_bold();
    let mut workbook = Workbook::new();

    let sheet = workbook.add_worksheet();
    sheet.set_name("Jobs")?;
    write_jobs_sheet(sheet, &header, jobs)?;

    let sheet = workbook.add_worksheet();
    sheet.set_name("Summary")?;
    write_summary_sheet(sheet, &header, &SummaryStats::from_jobs(jobs))?;

    let sheet = workbook.add_worksheet();
    sheet.set_name("By Company")?;
    let by_company = rollup_by(jobs, |j| j.company_name.as_str());
    write_rollup_sheet(sheet, &header, "company_name", &by_company, true)?;

    let sheet = workbook.add_worksheet();
    sheet.set_name("By Job Title")?;
    let by_title = rollup_by(jobs, |j| j.job_title.as_str());
    write_rollup_sheet(sheet, &header, "job_title", &by_title, false)?;

    workbook.save(path)?;
    Ok(())
}

fn write_jobs_sheet(
    sheet: &mut Worksheet,
    header: &Format,
    jobs: &[JobRecord],
) -> Result<(), ReportError> {
    for (col, name) in COLUMNS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *name, header)?;
    }

    for (i, job) in jobs.iter().enumerate() {
        let row = i as u32 + 1;
        for (col, value) in record_row(job).into_iter().enumerate() {
            let col_num = col as u16;
            match col {
                SALARY_MIN_COL | SALARY_MAX_COL => {
                    let number = if col == SALARY_MIN_COL { job.salary_min } else { job.salary_max };
                    // Missing stays a blank cell so spreadsheet averages skip it.
                    if let Some(n) = number.filter(|n| n.is_finite()) {
                        sheet.write_number(row, col_num, n)?;
                    }
                }
                HAS_IMAGE_TEXT_COL => {
                    sheet.write_boolean(row, col_num, job.has_image_text)?;
                }
                AI_CONFIDENCE_COL => {
                    sheet.write_boolean(row, col_num, job.ai_confidence)?;
                }
                _ => {
                    sheet.write_string(row, col_num, value)?;
                }
            }
        }
    }
    Ok(())
}

fn write_summary_sheet(
    sheet: &mut Worksheet,
    header: &Format,
    stats: &SummaryStats,
) -> Result<(), ReportError> {
    sheet.write_string_with_format(0, 0, "metric", header)?;
    sheet.write_string_with_format(0, 1, "count", header)?;

    let rows = [
        ("total jobs", stats.total_jobs),
        ("distinct companies", stats.distinct_companies),
        ("jobs with salary info", stats.jobs_with_salary),
        ("jobs with contact info", stats.jobs_with_contact),
    ];
    for (i, (label, count)) in rows.iter().enumerate() {
        let row = i as u32 + 1;
        sheet.write_string(row, 0, *label)?;
        sheet.write_number(row, 1, *count as f64)?;
    }
    Ok(())
}

fn write_rollup_sheet(
    sheet: &mut Worksheet,
    header: &Format,
    key_name: &str,
    rollups: &[GroupRollup],
    with_locations: bool,
) -> Result<(), ReportError> {
    let mut headers = vec![key_name, "jobs"];
    if with_locations {
        headers.push("locations");
    }
    headers.extend(["mean_salary_min", "mean_salary_max"]);
    for (col, name) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *name, header)?;
    }

    for (i, rollup) in rollups.iter().enumerate() {
        let row = i as u32 + 1;
        let mut col: u16 = 0;
        sheet.write_string(row, col, rollup.key.as_str())?;
        col += 1;
        sheet.write_number(row, col, rollup.count as f64)?;
        col += 1;
        if with_locations {
            sheet.write_string(row, col, rollup.locations.as_str())?;
            col += 1;
        }
        for value in [rollup.mean_min_salary, rollup.mean_max_salary] {
            if let Some(v) = value {
                sheet.write_number(row, col, v)?;
            }
            col += 1;
        }
    }
    Ok(())
}

// --- Batch entry point ---

/// Builds records for every article and writes the reports. Never fails:
/// bad articles are skipped and write failures land in the outcome.
pub fn process_articles(
    builder: &JobRecordBuilder,
    emitter: &ReportEmitter,
    articles: &[Article],
) -> (Vec<JobRecord>, ReportOutcome) {
    let jobs = builder.build_all(articles);
    let outcome = emitter.emit(&jobs);
    (jobs, outcome)
}
