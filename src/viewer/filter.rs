use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::FilterError;
use crate::log::{LogRecord, Metadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterMode {
    /// Case-insensitive substring
    #[default]
    Loose,
    /// Case-sensitive whole term
    Strict,
}

/// Filter on the record message
#[derive(Debug, Clone)]
pub struct MessageFilter {
    pub value: String,
    pub mode: FilterMode,
    /// Pre-computed lowercase value for loose matching
    value_lowercase: String,
    term: Option<Regex>,
}

impl MessageFilter {
    pub fn new(value: impl Into<String>, mode: FilterMode) -> Result<Self, FilterError> {
        let value = value.into();
        let term = match mode {
            FilterMode::Strict if !value.is_empty() => {
                let pattern = strict_pattern(&value);
                Some(Regex::new(&pattern).map_err(|source| FilterError {
                    value: value.clone(),
                    source,
                })?)
            }
            _ => None,
        };
        Ok(Self {
            value_lowercase: value.to_lowercase(),
            value,
            mode,
            term,
        })
    }

    pub fn loose(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            value_lowercase: value.to_lowercase(),
            value,
            mode: FilterMode::Loose,
            term: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn matches(&self, record: &LogRecord) -> bool {
        if self.value.is_empty() {
            return true;
        }
        match &self.term {
            Some(term) => term.is_match(&record.message),
            None => record.message_lowercase().contains(&self.value_lowercase),
        }
    }
}

/// Word boundaries only make sense next to word characters: `\b` before
/// `-v` would never match at the start of a term.
fn strict_pattern(value: &str) -> String {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let mut pattern = String::new();
    if value.starts_with(is_word) {
        pattern.push_str(r"\b");
    }
    pattern.push_str(&regex::escape(value));
    if value.ends_with(is_word) {
        pattern.push_str(r"\b");
    }
    pattern
}

/// All pairs must match
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    pub pairs: Vec<Metadata>,
}

impl MetadataFilter {
    pub fn new(pairs: Vec<Metadata>) -> Self {
        Self { pairs }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn matches(&self, record: &LogRecord) -> bool {
        self.pairs
            .iter()
            .all(|pair| record.metadata_value(&pair.name) == Some(pair.value.as_str()))
    }
}
