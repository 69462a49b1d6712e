use anyhow::Result;
use regex::Regex;

use crate::models::{Currency, Period, SalaryInfo};
use crate::rules::{first_match, MarkerRule, ParseRules};
use crate::text::TextNormalizer;

#[derive(Debug, Clone)]
pub struct SalaryParser {
    normalizer: TextNormalizer,
    number: Regex,
    currency_markers: Vec<MarkerRule<Currency>>,
    period_markers: Vec<MarkerRule<Period>>,
    upper_open_markers: Vec<String>,
    upper_bound_markers: Vec<String>,
    default_currency: Currency,
    default_period: Period,
}

impl SalaryParser {
    pub fn new(rules: &ParseRules) -> Result<Self> {
        Ok(Self {
            normalizer: TextNormalizer::new(rules)?,
            number: Regex::new(r"[0-9]+(?:\.[0-9]+)?")?,
            currency_markers: lowercase_markers(&rules.currency_markers),
            period_markers: rules.period_markers.clone(),
            upper_open_markers: rules.upper_open_markers.clone(),
            upper_bound_markers: rules.upper_bound_markers.clone(),
            default_currency: rules.default_currency,
            default_period: rules.default_period,
        })
    }

    /// Never fails: unreadable text comes back with both bounds absent.
    pub fn parse_salary<'a>(&self, text: impl Into<Option<&'a str>>) -> SalaryInfo {
        let original = text.into().unwrap_or_default();
        let mut info = SalaryInfo {
            min_salary: None,
            max_salary: None,
            currency: self.default_currency,
            period: self.default_period,
            original_text: original.to_string(),
        };

        let cleaned = self.normalizer.clean(original);
        if cleaned.is_empty() {
            return info;
        }

        // Markers are looked up before punctuation stripping; "$", "€" and
        // "+" would not survive it.
        let marked = self.normalizer.collapse_whitespace(original);

        info.currency = first_match(&self.currency_markers, &marked.to_lowercase())
            .unwrap_or(self.default_currency);
        info.period = first_match(&self.period_markers, &marked).unwrap_or(self.default_period);

        let numbers: Vec<f64> = self
            .number
            .find_iter(&cleaned)
            .filter_map(|m| m.as_str().parse::<f64>().ok())
            .collect();

        match numbers.as_slice() {
            // Anything past the second number is ignored.
            [min, max, ..] => {
                info.min_salary = Some(*min);
                info.max_salary = Some(*max);
            }
            [only] => {
                if contains_any(&marked, &self.upper_open_markers) {
                    info.min_salary = Some(*only);
                } else if contains_any(&marked, &self.upper_bound_markers) {
                    info.max_salary = Some(*only);
                } else {
                    info.min_salary = Some(*only);
                }
            }
            [] => {}
        }

        info
    }
}

fn contains_any(text: &str, markers: &[String]) -> bool {
    markers.iter().any(|m| text.contains(m.as_str()))
}

fn lowercase_markers<T: Copy>(rules: &[MarkerRule<T>]) -> Vec<MarkerRule<T>> {
    rules
        .iter()
        .map(|rule| MarkerRule {
            outcome: rule.outcome,
            markers: rule.markers.iter().map(|m| m.to_lowercase()).collect(),
        })
        .collect()
}
