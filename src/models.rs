use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// --- Upstream article and extraction result ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "ArticleWire")]
pub struct Article {
    pub title: String,
    pub source: String,
    pub published: String,
    pub link: String,
    // May be HTML.
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_text: Option<String>,
    pub has_job_images: bool,
    pub is_job_related: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<SummaryResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_result: Option<ExtractionResult>,
}

// Feeds may carry both the current key and its legacy name; the current
// key wins when both are present.
#[derive(Deserialize)]
struct ArticleWire {
    #[serde(default)]
    title: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    published: String,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    full_content: Option<String>,
    #[serde(default)]
    image_text: Option<String>,
    #[serde(default)]
    has_job_images: bool,
    #[serde(default)]
    is_job_related: bool,
    #[serde(default)]
    ai_summary: Option<SummaryResult>,
    #[serde(default)]
    extraction_result: Option<ExtractionResult>,
    #[serde(default)]
    job_extraction: Option<ExtractionResult>,
}

impl From<ArticleWire> for Article {
    fn from(wire: ArticleWire) -> Self {
        Self {
            title: wire.title,
            source: wire.source,
            published: wire.published,
            link: wire.link.or(wire.url).unwrap_or_default(),
            body: wire.body.or(wire.full_content).unwrap_or_default(),
            image_text: wire.image_text,
            has_job_images: wire.has_job_images,
            is_job_related: wire.is_job_related,
            ai_summary: wire.ai_summary,
            extraction_result: wire.extraction_result.or(wire.job_extraction),
        }
    }
}

impl Article {
    pub fn has_image_text(&self) -> bool {
        self.has_job_images
            || self
                .image_text
                .as_deref()
                .is_some_and(|text| !text.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    #[serde(default)]
    pub success: bool,
    // Untyped until the record builder reads it, so a malformed payload
    // fails one article rather than the whole file.
    #[serde(default)]
    pub job_info: Value,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl ExtractionResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn is_job_posting(&self) -> bool {
        self.success
            && self
                .job_info
                .get("is_job_posting")
                .and_then(Value::as_bool)
                .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SummaryResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// First non-blank line of a successful summary.
    pub fn headline(&self) -> Option<&str> {
        if !self.success {
            return None;
        }
        self.summary.lines().map(str::trim).find(|line| !line.is_empty())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub total_tokens: u64,
}

// --- LLM payload (lenient) ---

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobInfoPayload {
    #[serde(default, deserialize_with = "lenient_text")]
    pub company_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_positions")]
    pub positions: Vec<PositionPayload>,
    #[serde(default)]
    pub contact_info: Option<ContactPayload>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub deadline: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub additional_info: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PositionPayload {
    #[serde(default, deserialize_with = "lenient_text")]
    pub job_title: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub department: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub salary: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub employment_type: Option<String>,
    #[serde(default)]
    pub requirements: Option<OneOrMany>,
    #[serde(default)]
    pub responsibilities: Option<OneOrMany>,
    #[serde(default)]
    pub benefits: Option<OneOrMany>,
}

impl PositionPayload {
    pub fn placeholder(title: &str) -> Self {
        Self {
            job_title: Some(title.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactPayload {
    #[serde(default, deserialize_with = "lenient_text")]
    pub contact_person: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub handle: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub wechat: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub application_method: Option<String>,
}

impl ContactPayload {
    /// `handle`, falling back to the legacy `wechat` key.
    pub fn handle(&self) -> Option<&str> {
        self.handle.as_deref().or(self.wechat.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<Option<String>>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items.into_iter().flatten().collect(),
        }
    }
}

/// Accepts strings, numbers and booleans as text; null as absent.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(de::Error::custom(format!("expected text, found {}", other))),
    }
}

/// Null reads as no positions; anything that is not a list is an error.
fn lenient_positions<'de, D>(deserializer: D) -> Result<Vec<PositionPayload>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<PositionPayload>>::deserialize(deserializer)?.unwrap_or_default())
}

// --- Derived values ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[default]
    #[serde(rename = "CNY")]
    Cny,
    #[serde(rename = "USD")]
    Usd,
    #[serde(rename = "EUR")]
    Eur,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Cny => "CNY",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Hourly,
    Daily,
    #[default]
    Monthly,
    Yearly,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Hourly => "hourly",
            Period::Daily => "daily",
            Period::Monthly => "monthly",
            Period::Yearly => "yearly",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalaryInfo {
    pub min_salary: Option<f64>,
    pub max_salary: Option<f64>,
    pub currency: Currency,
    pub period: Period,
    pub original_text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub contact_person: String,
    pub phone: String,
    pub email: String,
    pub handle: String,
    pub address: String,
    pub application_method: String,
}

// --- Output record ---

// Field order is the report column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub extraction_time: String,
    pub published_date: String,
    pub source: String,
    pub article_title: String,
    pub company_name: String,
    pub job_title: String,
    pub department: String,
    pub location: String,
    pub employment_type: String,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub salary_currency: Currency,
    pub salary_period: Period,
    pub salary_original: String,
    pub requirements: String,
    pub responsibilities: String,
    pub benefits: String,
    pub contact_person: String,
    pub contact_phone: String,
    pub contact_email: String,
    pub contact_handle: String,
    pub application_method: String,
    pub deadline: String,
    pub additional_info: String,
    pub company_address: String,
    pub article_url: String,
    pub has_image_text: bool,
    /// True when the extraction call reported token usage.
    pub ai_confidence: bool,
    pub is_confirmed: bool,
}

impl JobRecord {
    pub fn has_salary(&self) -> bool {
        self.salary_min.is_some_and(f64::is_finite)
    }

    pub fn has_contact(&self) -> bool {
        !self.contact_phone.is_empty()
            || !self.contact_email.is_empty()
            || !self.contact_handle.is_empty()
    }
}
