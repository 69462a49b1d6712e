use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::models::{Currency, Period};

/// Keyword lists and defaults shared by the parsers. Every list is ordered:
/// earlier entries win.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseRules {
    pub sentinels: Vec<String>,
    pub placeholder_title: String,
    pub default_currency: Currency,
    pub default_period: Period,
    // Currency markers match case-insensitively, period markers do not.
    pub currency_markers: Vec<MarkerRule<Currency>>,
    pub period_markers: Vec<MarkerRule<Period>>,
    /// A lone number next to one of these is a lower bound ("5000以上").
    pub upper_open_markers: Vec<String>,
    pub upper_bound_markers: Vec<String>,
    pub job_title_markers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerRule<T> {
    pub outcome: T,
    pub markers: Vec<String>,
}

impl<T: Copy> MarkerRule<T> {
    pub fn new(outcome: T, markers: &[&str]) -> Self {
        Self {
            outcome,
            markers: markers.iter().map(|m| m.to_string()).collect(),
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        self.markers.iter().any(|m| text.contains(m.as_str()))
    }
}

pub fn first_match<T: Copy>(rules: &[MarkerRule<T>], text: &str) -> Option<T> {
    rules.iter().find(|rule| rule.matches(text)).map(|rule| rule.outcome)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for ParseRules {
    fn default() -> Self {
        Self {
            sentinels: strings(&["unspecified", "未提及"]),
            placeholder_title: "unspecified position".to_string(),
            default_currency: Currency::Cny,
            default_period: Period::Monthly,
            currency_markers: vec![
                MarkerRule::new(Currency::Usd, &["$", "usd", "dollar"]),
                MarkerRule::new(Currency::Eur, &["€", "eur", "euro"]),
            ],
            period_markers: vec![
                MarkerRule::new(Period::Yearly, &["年", "年薪", "year", "annual"]),
                MarkerRule::new(Period::Daily, &["日", "天", "day", "daily"]),
                MarkerRule::new(Period::Hourly, &["时", "小时", "hour", "hourly"]),
            ],
            upper_open_markers: strings(&["以上", "起", "+"]),
            upper_bound_markers: strings(&["以下", "内", "-"]),
            job_title_markers: strings(&["招聘", "hiring"]),
        }
    }
}

impl ParseRules {
    /// Keys left out of the file keep their defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rules file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid rules file: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_list_both_sentinels() {
        let rules = ParseRules::default();
        assert_eq!(rules.sentinels, vec!["unspecified".to_string(), "未提及".to_string()]);
        assert_ne!(rules.placeholder_title, "unspecified");
    }

    #[test]
    fn test_first_match_respects_rule_order() {
        let rules = ParseRules::default();
        // "年" (yearly) and "天" (daily) both present: yearly is listed first.
        assert_eq!(first_match(&rules.period_markers, "每年365天"), Some(Period::Yearly));
        assert_eq!(first_match(&rules.period_markers, "300/天"), Some(Period::Daily));
        assert_eq!(first_match(&rules.period_markers, "8000/月"), None);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let rules = ParseRules::from_toml_str(
            r#"
            sentinels = ["n/a"]
            placeholder_title = "TBD"
            "#,
        )
        .unwrap();
        assert_eq!(rules.sentinels, vec!["n/a".to_string()]);
        assert_eq!(rules.placeholder_title, "TBD");
        assert_eq!(rules.period_markers, ParseRules::default().period_markers);
        assert_eq!(rules.default_currency, Currency::Cny);
    }

    #[test]
    fn test_toml_marker_rules() {
        let rules = ParseRules::from_toml_str(
            r#"
            default_period = "hourly"

            [[currency_markers]]
            outcome = "EUR"
            markers = ["€"]
            "#,
        )
        .unwrap();
        assert_eq!(rules.default_period, Period::Hourly);
        assert_eq!(rules.currency_markers.len(), 1);
        assert_eq!(first_match(&rules.currency_markers, "€3000"), Some(Currency::Eur));
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(ParseRules::from_toml_str("sentinels = 3").is_err());
    }
}
