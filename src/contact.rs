use anyhow::Result;
use regex::Regex;

use crate::models::{ContactInfo, ContactPayload};
use crate::rules::ParseRules;
use crate::text::TextNormalizer;

#[derive(Debug, Clone)]
pub struct ContactExtractor {
    normalizer: TextNormalizer,
    /// Tried in order: mainland mobile, landline, +86 mobile.
    phone_patterns: Vec<Regex>,
    email: Regex,
}

impl ContactExtractor {
    pub fn new(rules: &ParseRules) -> Result<Self> {
        let phone_patterns = [r"1[3-9]\d{9}", r"0\d{2,3}-?\d{7,8}", r"\+86\s?1[3-9]\d{9}"]
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            normalizer: TextNormalizer::new(rules)?,
            phone_patterns,
            email: Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")?,
        })
    }

    pub fn extract_contact(&self, raw: Option<&ContactPayload>) -> ContactInfo {
        let Some(raw) = raw else {
            return ContactInfo::default();
        };

        ContactInfo {
            contact_person: self.normalizer.clean(raw.contact_person.as_deref()),
            phone: self.extract_phone(raw.phone.as_deref()),
            email: self.extract_email(raw.email.as_deref()),
            handle: self.normalizer.clean(raw.handle()),
            address: self.normalizer.clean(raw.address.as_deref()),
            application_method: self.normalizer.clean(raw.application_method.as_deref()),
        }
    }

    /// First phone pattern found in the text, else the cleaned text.
    pub fn extract_phone(&self, phone: Option<&str>) -> String {
        let Some(phone) = self.usable(phone) else {
            return String::new();
        };
        self.phone_patterns
            .iter()
            .find_map(|re| re.find(phone))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| self.normalizer.clean(phone))
    }

    /// First email address found in the text, else the cleaned text.
    pub fn extract_email(&self, email: Option<&str>) -> String {
        let Some(email) = self.usable(email) else {
            return String::new();
        };
        self.email
            .find(email)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| self.normalizer.clean(email))
    }

    fn usable<'a>(&self, value: Option<&'a str>) -> Option<&'a str> {
        value.filter(|v| !v.trim().is_empty() && !self.normalizer.is_sentinel(v))
    }
}
