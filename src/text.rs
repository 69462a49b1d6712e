use anyhow::Result;
use regex::Regex;

use crate::rules::ParseRules;

// Everything except word characters, whitespace and some punctuation.
const DISALLOWED_CHARS: &str = r"[^\w\s\-\.@\(\)（），。、：；！？/]";

#[derive(Debug, Clone)]
pub struct TextNormalizer {
    whitespace: Regex,
    disallowed: Regex,
    sentinels: Vec<String>,
}

impl TextNormalizer {
    pub fn new(rules: &ParseRules) -> Result<Self> {
        Ok(Self {
            whitespace: Regex::new(r"\s+")?,
            disallowed: Regex::new(DISALLOWED_CHARS)?,
            sentinels: rules.sentinels.clone(),
        })
    }

    pub fn is_sentinel(&self, text: &str) -> bool {
        let trimmed = text.trim();
        self.sentinels.iter().any(|s| s == trimmed)
    }

    /// Absent, empty and sentinel input all come back as `""`.
    pub fn clean<'a>(&self, text: impl Into<Option<&'a str>>) -> String {
        let text = match text.into() {
            Some(t) if !t.is_empty() && !self.is_sentinel(t) => t,
            _ => return String::new(),
        };
        let collapsed = self.collapse_whitespace(text);
        self.disallowed.replace_all(&collapsed, "").into_owned()
    }

    pub fn collapse_whitespace(&self, text: &str) -> String {
        self.whitespace.replace_all(text.trim(), " ").into_owned()
    }

    pub fn join_items(&self, items: Vec<String>) -> String {
        items
            .iter()
            .map(|item| self.clean(item.as_str()))
            .filter(|item| !item.is_empty())
            .collect::<Vec<_>>()
            .join("; ")
    }
}
