use anyhow::{Context, Result};
use chrono::Local;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::contact::ContactExtractor;
use crate::errors::ExtractError;
use crate::models::{Article, JobInfoPayload, JobRecord, OneOrMany, PositionPayload};
use crate::rules::ParseRules;
use crate::salary::SalaryParser;
use crate::text::TextNormalizer;

#[derive(Debug, Clone)]
pub struct JobRecordBuilder {
    normalizer: TextNormalizer,
    salary: SalaryParser,
    contact: ContactExtractor,
    placeholder_title: String,
}

impl JobRecordBuilder {
    pub fn new(rules: &ParseRules) -> Result<Self> {
        Ok(Self {
            normalizer: TextNormalizer::new(rules)?,
            salary: SalaryParser::new(rules)?,
            contact: ContactExtractor::new(rules)?,
            placeholder_title: rules.placeholder_title.clone(),
        })
    }

    /// Only a payload whose structure cannot be read (e.g. `positions` that
    /// is not a list) is an error; missing fields never are.
    pub fn build_records(&self, article: &Article) -> Result<Vec<JobRecord>, ExtractError> {
        let Some(extraction) = &article.extraction_result else {
            return Ok(Vec::new());
        };
        if !extraction.is_job_posting() {
            return Ok(Vec::new());
        }

        let payload: JobInfoPayload = serde_json::from_value(extraction.job_info.clone())
            .map_err(|source| ExtractError::MalformedPayload {
                article: article.title.clone(),
                source,
            })?;

        let mut positions = payload.positions;
        if positions.is_empty() {
            positions.push(PositionPayload::placeholder(&self.placeholder_title));
        }

        let extraction_time = Local::now().format("%Y-%m-%dT%H:%M:%S").to_string();
        let company_name = self.normalizer.clean(payload.company_name.as_deref());
        let contact = self.contact.extract_contact(payload.contact_info.as_ref());
        let deadline = self.normalizer.clean(payload.deadline.as_deref());
        let additional_info = self.normalizer.clean(payload.additional_info.as_deref());
        let has_image_text = article.has_image_text();
        let ai_confidence = extraction.usage.total_tokens > 0;

        let records = positions
            .into_iter()
            .map(|position| {
                let salary = self.salary.parse_salary(position.salary.as_deref());
                JobRecord {
                    extraction_time: extraction_time.clone(),
                    published_date: article.published.clone(),
                    source: article.source.clone(),
                    article_title: article.title.clone(),
                    company_name: company_name.clone(),
                    job_title: self.normalizer.clean(position.job_title.as_deref()),
                    department: self.normalizer.clean(position.department.as_deref()),
                    location: self.normalizer.clean(position.location.as_deref()),
                    employment_type: self.normalizer.clean(position.employment_type.as_deref()),
                    salary_min: salary.min_salary,
                    salary_max: salary.max_salary,
                    salary_currency: salary.currency,
                    salary_period: salary.period,
                    salary_original: salary.original_text,
                    requirements: self.join_list(position.requirements),
                    responsibilities: self.join_list(position.responsibilities),
                    benefits: self.join_list(position.benefits),
                    contact_person: contact.contact_person.clone(),
                    contact_phone: contact.phone.clone(),
                    contact_email: contact.email.clone(),
                    contact_handle: contact.handle.clone(),
                    application_method: contact.application_method.clone(),
                    deadline: deadline.clone(),
                    additional_info: additional_info.clone(),
                    company_address: contact.address.clone(),
                    article_url: article.link.clone(),
                    has_image_text,
                    ai_confidence,
                    is_confirmed: true,
                }
            })
            .collect::<Vec<_>>();

        debug!(article = %article.title, count = records.len(), "built job records");
        Ok(records)
    }

    /// Records for every article. Articles with a malformed payload are
    /// logged and skipped.
    pub fn build_all(&self, articles: &[Article]) -> Vec<JobRecord> {
        let mut all_jobs = Vec::new();
        for article in articles {
            match self.build_records(article) {
                Ok(jobs) => all_jobs.extend(jobs),
                Err(e) => warn!("Skipping article: {}", e),
            }
        }
        info!("Extracted {} job records from {} articles", all_jobs.len(), articles.len());
        all_jobs
    }

    fn join_list(&self, items: Option<OneOrMany>) -> String {
        self.normalizer
            .join_items(items.map(|list| list.into_vec()).unwrap_or_default())
    }
}

/// Reads a JSON array of articles. Elements that are not articles are
/// logged and skipped.
pub fn load_articles(path: &Path) -> Result<Vec<Article>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read articles file: {}", path.display()))?;
    let values: Vec<Value> = serde_json::from_str(&content)
        .with_context(|| format!("Articles file is not a JSON array: {}", path.display()))?;

    let mut articles = Vec::with_capacity(values.len());
    for (i, value) in values.into_iter().enumerate() {
        match serde_json::from_value::<Article>(value) {
            Ok(article) => articles.push(article),
            Err(e) => warn!("Skipping article #{}: {}", i + 1, e),
        }
    }
    Ok(articles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Currency, ExtractionResult, Period, Usage};
    use serde_json::json;

    fn builder() -> JobRecordBuilder {
        JobRecordBuilder::new(&ParseRules::default()).unwrap()
    }

    fn article_with(job_info: Value, success: bool, tokens: u64) -> Article {
        Article {
            title: "急招副导演".to_string(),
            source: "测试公众号".to_string(),
            published: "2024-01-01T00:00:00".to_string(),
            link: "https://test.com/1".to_string(),
            extraction_result: Some(ExtractionResult {
                success,
                job_info,
                usage: Usage { total_tokens: tokens },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_end_to_end_single_position() {
        let article = article_with(
            json!({
                "is_job_posting": true,
                "company_name": "测试影视公司",
                "positions": [{
                    "job_title": "副导演",
                    "salary": "8000-12000元/月",
                    "location": "北京",
                    "requirements": ["有相关经验", "熟悉影视制作流程"],
                    "responsibilities": "协助导演工作"
                }],
                "contact_info": { "phone": "13800138000" }
            }),
            true,
            321,
        );

        let jobs = builder().build_records(&article).unwrap();
        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert_eq!(job.salary_min, Some(8000.0));
        assert_eq!(job.salary_max, Some(12000.0));
        assert_eq!(job.salary_currency, Currency::Cny);
        assert_eq!(job.salary_currency.as_str(), "CNY");
        assert_eq!(job.salary_period, Period::Monthly);
        assert_eq!(job.salary_period.as_str(), "monthly");
        assert_eq!(job.location, "北京");
        assert_eq!(job.contact_phone, "13800138000");
        assert_eq!(job.company_name, "测试影视公司");
        assert_eq!(job.job_title, "副导演");
        assert_eq!(job.requirements, "有相关经验; 熟悉影视制作流程");
        assert_eq!(job.responsibilities, "协助导演工作");
        assert_eq!(job.benefits, "");
        assert_eq!(job.article_title, "急招副导演");
        assert_eq!(job.article_url, "https://test.com/1");
        assert!(job.is_confirmed);
        assert!(job.ai_confidence);
        assert!(!job.has_image_text);
        assert!(!job.extraction_time.is_empty());
    }

    #[test]
    fn test_failed_extraction_yields_nothing() {
        let article = article_with(json!({ "is_job_posting": true }), false, 100);
        assert!(builder().build_records(&article).unwrap().is_empty());
    }

    #[test]
    fn test_missing_extraction_yields_nothing() {
        let article = Article { title: "周末观影".to_string(), ..Default::default() };
        assert!(builder().build_records(&article).unwrap().is_empty());
    }

    #[test]
    fn test_not_a_posting_yields_nothing() {
        let b = builder();
        let negative = article_with(json!({ "is_job_posting": false, "positions": [{}] }), true, 5);
        assert!(b.build_records(&negative).unwrap().is_empty());

        let absent = article_with(json!({ "positions": [{}] }), true, 5);
        assert!(b.build_records(&absent).unwrap().is_empty());

        let null_info = article_with(Value::Null, true, 5);
        assert!(b.build_records(&null_info).unwrap().is_empty());
    }

    #[test]
    fn test_empty_positions_yield_placeholder() {
        let article = article_with(json!({ "is_job_posting": true, "positions": [] }), true, 0);
        let jobs = builder().build_records(&article).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_title, "unspecified position");
        assert_eq!(jobs[0].salary_min, None);
        assert!(!jobs[0].ai_confidence);
    }

    #[test]
    fn test_contact_shared_across_positions() {
        let article = article_with(
            json!({
                "is_job_posting": true,
                "company_name": "unspecified",
                "positions": [{ "job_title": "摄影师" }, { "job_title": "剪辑师", "salary": "面议" }],
                "contact_info": { "email": "请发送至 hr@film.cn", "address": "上海市徐汇区" },
                "deadline": "未提及"
            }),
            true,
            10,
        );
        let jobs = builder().build_records(&article).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].job_title, "摄影师");
        assert_eq!(jobs[1].job_title, "剪辑师");
        assert_eq!(jobs[1].salary_original, "面议");
        for job in &jobs {
            assert_eq!(job.contact_email, "hr@film.cn");
            assert_eq!(job.company_address, "上海市徐汇区");
            assert_eq!(job.company_name, "");
            assert_eq!(job.deadline, "");
        }
    }

    #[test]
    fn test_malformed_positions_is_an_error() {
        let article = article_with(json!({ "is_job_posting": true, "positions": "副导演" }), true, 1);
        let err = builder().build_records(&article).unwrap_err();
        assert!(matches!(err, ExtractError::MalformedPayload { .. }));
        assert!(err.to_string().contains("急招副导演"));
    }

    #[test]
    fn test_build_all_skips_malformed_articles() {
        let bad = article_with(json!({ "is_job_posting": true, "positions": 42 }), true, 1);
        let good = article_with(
            json!({ "is_job_posting": true, "positions": [{ "job_title": "灯光师" }] }),
            true,
            1,
        );
        let jobs = builder().build_all(&[bad, good]);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_title, "灯光师");
    }

    #[test]
    fn test_image_text_flag() {
        let mut article = article_with(json!({ "is_job_posting": true }), true, 1);
        article.image_text = Some("招聘 化妆师".to_string());
        let jobs = builder().build_records(&article).unwrap();
        assert!(jobs[0].has_image_text);
    }

    #[test]
    fn test_records_round_trip_through_json() {
        let article = article_with(
            json!({
                "is_job_posting": true,
                "company_name": "光影传媒",
                "positions": [
                    { "job_title": "编剧", "salary": "年薪20-30万", "benefits": ["五险一金"] },
                    { "job_title": "场记", "salary": "300/天" }
                ],
                "contact_info": { "wechat": "gy_media" }
            }),
            true,
            77,
        );
        let jobs = builder().build_records(&article).unwrap();
        let encoded = serde_json::to_string(&jobs).unwrap();
        let decoded: Vec<JobRecord> = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.len(), jobs.len());
        assert_eq!(decoded, jobs);
        assert_eq!(decoded[0].contact_handle, "gy_media");
    }

    #[test]
    fn test_load_articles_skips_bad_elements() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("articles.json");
        std::fs::write(
            &path,
            r#"[{"title": "招聘剪辑师", "link": "https://a"}, {"title": 5}, {}]"#,
        )
        .unwrap();
        let articles = load_articles(&path).unwrap();
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].title, "招聘剪辑师");
    }

    #[test]
    fn test_redundant_handle_keys_keep_the_posting() {
        let article = article_with(
            json!({
                "is_job_posting": true,
                "positions": [{ "job_title": "剪辑师" }],
                "contact_info": { "handle": "film_hr", "wechat": "film_hr" }
            }),
            true,
            10,
        );
        let jobs = builder().build_records(&article).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].contact_handle, "film_hr");
    }

    #[test]
    fn test_load_articles_with_current_and_legacy_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("articles.json");
        std::fs::write(
            &path,
            r#"[{
                "title": "招聘剪辑师",
                "link": "https://a",
                "url": "https://a",
                "body": "<p>招聘</p>",
                "full_content": "<p>招聘</p>",
                "extraction_result": {"success": true, "job_info": {"is_job_posting": true}},
                "job_extraction": {"success": true, "job_info": {"is_job_posting": true}}
            }]"#,
        )
        .unwrap();
        let articles = load_articles(&path).unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].link, "https://a");

        let jobs = builder().build_all(&articles);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_title, "unspecified position");
    }

    #[test]
    fn test_load_articles_rejects_non_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("articles.json");
        std::fs::write(&path, r#"{"title": "x"}"#).unwrap();
        assert!(load_articles(&path).is_err());
    }
}
