use anyhow::{anyhow, Context, Result};
use scraper::Html;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use crate::models::{Article, ExtractionResult, SummaryResult, Usage};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const EXTRACTION_MAX_TOKENS: u32 = 2000;
const EXTRACTION_TEMPERATURE: f32 = 0.1;
const SUMMARY_MAX_TOKENS: u32 = 1500;
const SUMMARY_TEMPERATURE: f32 = 0.3;
// In characters.
const MAX_ARTICLE_CHARS: usize = 8000;

// --- Provider trait ---

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub total_tokens: u64,
}

pub trait AIProvider {
    fn complete(
        &self,
        system: &str,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<Completion>;
    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderKind {
    DeepSeek,
    OpenAI,
    Anthropic,
}

#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub provider: ProviderKind,
    pub model_id: String,
    pub short_name: String,
}

pub fn resolve_model(name: &str) -> Result<ModelSpec> {
    let (provider, model_id, short_name) = match name {
        "deepseek-chat" | "deepseek" => (ProviderKind::DeepSeek, "deepseek-chat", "deepseek-chat"),
        "deepseek-reasoner" => (ProviderKind::DeepSeek, "deepseek-reasoner", "deepseek-reasoner"),
        "gpt-4o" => (ProviderKind::OpenAI, "gpt-4o", "gpt-4o"),
        "gpt-4o-mini" => (ProviderKind::OpenAI, "gpt-4o-mini", "gpt-4o-mini"),
        "api-sonnet" | "sonnet" => (
            ProviderKind::Anthropic,
            "claude-sonnet-4-5-20250929",
            "api-sonnet",
        ),
        "api-haiku" | "haiku" => (
            ProviderKind::Anthropic,
            "claude-haiku-4-5-20251001",
            "api-haiku",
        ),
        _ => {
            return Err(anyhow!(
                "Unknown model '{}'. Available: deepseek-chat (default), deepseek-reasoner, \
                 gpt-4o, gpt-4o-mini, api-sonnet, api-haiku",
                name
            ));
        }
    };
    Ok(ModelSpec {
        provider,
        model_id: model_id.to_string(),
        short_name: short_name.to_string(),
    })
}

pub fn create_provider(spec: &ModelSpec) -> Result<Box<dyn AIProvider>> {
    match spec.provider {
        ProviderKind::DeepSeek => Ok(Box::new(ChatCompletionsProvider::new(
            spec.model_id.clone(),
            DEEPSEEK_API_URL,
            "DEEPSEEK_API_KEY",
        )?)),
        ProviderKind::OpenAI => Ok(Box::new(ChatCompletionsProvider::new(
            spec.model_id.clone(),
            OPENAI_API_URL,
            "OPENAI_API_KEY",
        )?)),
        ProviderKind::Anthropic => Ok(Box::new(AnthropicProvider::new(spec.model_id.clone())?)),
    }
}

fn http_client() -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")
}

// --- OpenAI-compatible chat completions (DeepSeek, OpenAI) ---

const DEEPSEEK_API_URL: &str = "https://api.deepseek.com/chat/completions";
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug)]
pub struct ChatCompletionsProvider {
    api_key: String,
    api_url: &'static str,
    model_id: String,
    client: reqwest::blocking::Client,
}

impl ChatCompletionsProvider {
    pub fn new(model_id: String, api_url: &'static str, key_var: &str) -> Result<Self> {
        let api_key = env::var(key_var).with_context(|| {
            format!(
                "{} environment variable not set. Set it with: export {}=your-key-here",
                key_var, key_var
            )
        })?;
        Ok(Self {
            api_key,
            api_url,
            model_id,
            client: http_client()?,
        })
    }
}

impl AIProvider for ChatCompletionsProvider {
    fn complete(
        &self,
        system: &str,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<Completion> {
        let request = ChatRequest {
            model: self.model_id.clone(),
            max_tokens,
            temperature,
            stream: false,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
        };

        let response = self
            .client
            .post(self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .with_context(|| format!("Failed to send request to {}", self.api_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(anyhow!(
                "Chat completions request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let api_response: ChatResponse = response
            .json()
            .context("Failed to parse chat completions response")?;

        let text = api_response
            .choices
            .first()
            .map(|choice| choice.message.content.clone())
            .ok_or_else(|| anyhow!("No choices in chat completions response"))?;

        Ok(Completion {
            text,
            total_tokens: api_response.usage.map(|u| u.total_tokens).unwrap_or(0),
        })
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- Anthropic provider ---

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    system: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Debug)]
pub struct AnthropicProvider {
    api_key: String,
    model_id: String,
    client: reqwest::blocking::Client,
}

impl AnthropicProvider {
    pub fn new(model_id: String) -> Result<Self> {
        let api_key = env::var("ANTHROPIC_API_KEY")
            .context("ANTHROPIC_API_KEY environment variable not set. Set it with: export ANTHROPIC_API_KEY=your-key-here")?;
        Ok(Self {
            api_key,
            model_id,
            client: http_client()?,
        })
    }
}

impl AIProvider for AnthropicProvider {
    fn complete(
        &self,
        system: &str,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<Completion> {
        let request = AnthropicRequest {
            model: self.model_id.clone(),
            max_tokens,
            temperature,
            system: system.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .context("Failed to send request to Anthropic API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(anyhow!(
                "Anthropic API request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let api_response: AnthropicResponse = response
            .json()
            .context("Failed to parse Anthropic API response")?;

        let text = api_response
            .content
            .first()
            .map(|block| block.text.clone())
            .ok_or_else(|| anyhow!("No content in Anthropic API response"))?;

        Ok(Completion {
            text,
            total_tokens: api_response.usage.input_tokens + api_response.usage.output_tokens,
        })
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- Job extraction ---

pub const EXTRACTION_SYSTEM: &str = "You extract structured job postings from Chinese \
public-account articles. Reply with a single JSON object and nothing else, using exactly \
this shape. Use the string \"unspecified\" for any field the text does not mention.\n\
{\n\
  \"is_job_posting\": true,\n\
  \"company_name\": \"company name\",\n\
  \"positions\": [\n\
    {\n\
      \"job_title\": \"title\",\n\
      \"department\": \"department\",\n\
      \"location\": \"work location\",\n\
      \"salary\": \"salary as written\",\n\
      \"employment_type\": \"full-time/part-time/internship\",\n\
      \"requirements\": [\"requirement\"],\n\
      \"responsibilities\": [\"responsibility\"],\n\
      \"benefits\": [\"benefit\"]\n\
    }\n\
  ],\n\
  \"contact_info\": {\n\
    \"contact_person\": \"name\",\n\
    \"phone\": \"phone\",\n\
    \"email\": \"email\",\n\
    \"handle\": \"messaging ID\",\n\
    \"address\": \"company address\",\n\
    \"application_method\": \"how to apply\"\n\
  },\n\
  \"deadline\": \"deadline\",\n\
  \"additional_info\": \"anything else important\"\n\
}\n\
Keep field values in the language of the article.";

pub fn article_text(article: &Article) -> String {
    let fragment = Html::parse_fragment(&article.body);
    let text = fragment.root_element().text().collect::<Vec<_>>().join(" ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn build_article_prompt(article: &Article) -> String {
    let body: String = article_text(article).chars().take(MAX_ARTICLE_CHARS).collect();
    format!(
        "Article title: {}\n\nArticle text:\n{}\n\nText found in images:\n{}",
        article.title,
        body,
        article.image_text.as_deref().unwrap_or("")
    )
}

/// Pulls the JSON object out of a model reply (between the first `{` and
/// the last `}`), tolerating prose or code fences around it.
pub fn parse_extraction_response(response: &str, total_tokens: u64) -> ExtractionResult {
    let usage = Usage { total_tokens };
    let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) else {
        return ExtractionResult {
            usage,
            raw_response: Some(response.to_string()),
            ..ExtractionResult::failed("no JSON object in model response")
        };
    };
    if end < start {
        return ExtractionResult {
            usage,
            raw_response: Some(response.to_string()),
            ..ExtractionResult::failed("no JSON object in model response")
        };
    }

    match serde_json::from_str::<Value>(&response[start..=end]) {
        Ok(job_info) if job_info.is_object() => ExtractionResult {
            success: true,
            job_info,
            usage,
            error: None,
            raw_response: Some(response.to_string()),
        },
        Ok(_) => ExtractionResult {
            usage,
            raw_response: Some(response.to_string()),
            ..ExtractionResult::failed("model response is not a JSON object")
        },
        Err(e) => ExtractionResult {
            usage,
            raw_response: Some(response.to_string()),
            ..ExtractionResult::failed(format!("invalid JSON in model response: {}", e))
        },
    }
}

/// Asks the model for the job payload of one article. Failures come back as
/// an unsuccessful result rather than an error.
pub fn extract_job_info(provider: &dyn AIProvider, article: &Article) -> ExtractionResult {
    let prompt = build_article_prompt(article);
    match provider.complete(
        EXTRACTION_SYSTEM,
        &prompt,
        EXTRACTION_MAX_TOKENS,
        EXTRACTION_TEMPERATURE,
    ) {
        Ok(completion) => parse_extraction_response(&completion.text, completion.total_tokens),
        Err(e) => {
            warn!("Job extraction failed for '{}': {:#}", article.title, e);
            ExtractionResult::failed(format!("{:#}", e))
        }
    }
}

// --- Article summary ---

pub const SUMMARY_SYSTEM: &str = "You summarize Chinese public-account articles for a job \
posting monitor. Reply in the language of the article, in plain text:\n\
First line: a one or two sentence summary of the article.\n\
Then: whether it contains a job posting (yes/no).\n\
If it does: positions, company or organization, work location, pay, requirements and \
contact details.\n\
Finally: three to five key points.";

pub fn summarize_article(provider: &dyn AIProvider, article: &Article) -> SummaryResult {
    let prompt = build_article_prompt(article);
    match provider.complete(SUMMARY_SYSTEM, &prompt, SUMMARY_MAX_TOKENS, SUMMARY_TEMPERATURE) {
        Ok(completion) if !completion.text.trim().is_empty() => SummaryResult {
            success: true,
            summary: completion.text.trim().to_string(),
            usage: Usage { total_tokens: completion.total_tokens },
            error: None,
        },
        Ok(completion) => SummaryResult {
            usage: Usage { total_tokens: completion.total_tokens },
            ..SummaryResult::failed("empty summary in model response")
        },
        Err(e) => {
            warn!("Summary failed for '{}': {:#}", article.title, e);
            SummaryResult::failed(format!("{:#}", e))
        }
    }
}

pub fn should_extract(article: &Article, title_markers: &[String]) -> bool {
    article.is_job_related
        || article.has_job_images
        || title_markers
            .iter()
            .any(|m| article.title.contains(m.as_str()))
}

/// Summarizes every article and runs extraction on the likely postings, one
/// API call at a time with `delay` between calls. Articles not worth an
/// extraction keep no extraction result.
pub fn analyze_articles(
    provider: &dyn AIProvider,
    mut articles: Vec<Article>,
    title_markers: &[String],
    delay: Duration,
) -> Vec<Article> {
    let total = articles.len();
    let mut calls = 0usize;
    let mut pace = || {
        if calls > 0 && !delay.is_zero() {
            thread::sleep(delay);
        }
        calls += 1;
    };

    for (i, article) in articles.iter_mut().enumerate() {
        info!("Analyzing article {}/{}: {}", i + 1, total, article.title);

        pace();
        let summary = summarize_article(provider, article);
        if let Some(error) = &summary.error {
            warn!("No summary for '{}': {}", article.title, error);
        }
        article.ai_summary = Some(summary);

        if !should_extract(article, title_markers) {
            continue;
        }
        pace();
        let result = extract_job_info(provider, article);
        if let Some(error) = &result.error {
            warn!("No job payload for '{}': {}", article.title, error);
        }
        article.extraction_result = Some(result);
    }

    info!(
        "Analysis finished: {} articles, {} API calls via {}",
        total,
        calls,
        provider.model_name()
    );
    articles
}
