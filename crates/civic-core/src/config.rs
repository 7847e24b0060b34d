//! Shared configuration: API credentials, analysis parameters, ingestion
//! limits and the demographic taxonomy.
//!
//! Loaded from a JSON file; every field has a default so a partial file (or
//! no file at all) is valid. The CLI layers flag/env overrides on top.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::feedback::{Demographics, UnknownVariant};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(String),
}

/// Hosted API credential. Never serialised and redacted in `Debug`.
#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key, for building the Authorization header only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("ApiKey(<unset>)")
        } else {
            f.write_str("ApiKey(<redacted>)")
        }
    }
}

/// Target complexity for simplified text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingLevel {
    MiddleSchool,
    #[default]
    HighSchool,
    College,
    Professional,
}

impl ReadingLevel {
    pub const ALL: [ReadingLevel; 4] = [
        Self::MiddleSchool,
        Self::HighSchool,
        Self::College,
        Self::Professional,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MiddleSchool => "middle_school",
            Self::HighSchool => "high_school",
            Self::College => "college",
            Self::Professional => "professional",
        }
    }

    /// Human label used in prompts and output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::MiddleSchool => "Middle School",
            Self::HighSchool => "High School",
            Self::College => "College",
            Self::Professional => "Professional",
        }
    }

    /// Approximate US grade the simplified text should read at.
    pub fn target_grade(&self) -> u8 {
        match self {
            Self::MiddleSchool => 7,
            Self::HighSchool => 10,
            Self::College => 13,
            Self::Professional => 16,
        }
    }
}

impl fmt::Display for ReadingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadingLevel {
    type Err = UnknownVariant;

    /// Accepts `high_school`, `high-school` and `High School`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == key)
            .ok_or_else(|| UnknownVariant {
                kind: "reading level",
                value: s.to_string(),
            })
    }
}

/// Demographic attributes and the languages the tool offers.
///
/// An attribute with an empty value list is open-ended; one with values
/// restricts submissions to that list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Taxonomy {
    pub demographic_attributes: BTreeMap<String, Vec<String>>,
    pub languages: Vec<String>,
}

impl Default for Taxonomy {
    fn default() -> Self {
        let roles = [
            "General Citizen",
            "Student",
            "Farmer",
            "Business Owner",
            "Senior Citizen",
            "Parent",
            "Teacher",
            "Healthcare Worker",
        ];
        let mut demographic_attributes = BTreeMap::new();
        demographic_attributes.insert(
            "role".to_string(),
            roles.iter().map(|s| s.to_string()).collect(),
        );
        Self {
            demographic_attributes,
            languages: ["English", "Hindi", "Spanish", "French", "German"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Taxonomy {
    /// A taxonomy that accepts any attribute and value.
    pub fn open() -> Self {
        Self {
            demographic_attributes: BTreeMap::new(),
            languages: Vec::new(),
        }
    }

    /// Check demographic values against restricted attributes.
    ///
    /// Attributes the taxonomy does not mention are accepted as-is.
    pub fn check_demographics(&self, demographics: &Demographics) -> Result<(), String> {
        for (key, value) in demographics {
            if let Some(allowed) = self.demographic_attributes.get(key)
                && !allowed.is_empty()
                && !allowed.iter().any(|a| a == value)
            {
                return Err(format!(
                    "{value:?} is not an allowed value for demographic {key:?} (allowed: {})",
                    allowed.join(", ")
                ));
            }
        }
        Ok(())
    }

    /// Whether `language` is offered. An empty list accepts anything.
    pub fn supports_language(&self, language: &str) -> bool {
        self.languages.is_empty()
            || self
                .languages
                .iter()
                .any(|l| l.eq_ignore_ascii_case(language))
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub api_key: ApiKey,
    pub model: String,
    pub base_url: String,
    pub reading_level: ReadingLevel,
    pub language: String,
    pub max_file_mb: u64,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub top_tags: usize,
    pub taxonomy: Taxonomy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            api_key: ApiKey::default(),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com".to_string(),
            reading_level: ReadingLevel::default(),
            language: "English".to_string(),
            max_file_mb: 10,
            request_timeout_secs: 60,
            max_retries: 2,
            top_tags: 10,
            taxonomy: Taxonomy::default(),
        }
    }
}

impl BridgeConfig {
    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&raw)?;
        tracing::info!(path = %path.display(), model = %config.model, "loaded config");
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_file_mb == 0 {
            return Err(ConfigError::Invalid("max_file_mb must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        if !self.taxonomy.supports_language(&self.language) {
            return Err(ConfigError::Invalid(format!(
                "language {:?} is not one of: {}",
                self.language,
                self.taxonomy.languages.join(", ")
            )));
        }
        Ok(())
    }

    /// Ingestion size ceiling in bytes.
    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_mb.saturating_mul(1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.max_file_bytes(), 10 * 1024 * 1024);
        assert_eq!(config.taxonomy.demographic_attributes["role"].len(), 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            BridgeConfig::from_json(r#"{"model": "gpt-4o", "reading_level": "college"}"#).unwrap();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.reading_level, ReadingLevel::College);
        assert_eq!(config.language, "English");
        assert_eq!(config.top_tags, 10);
    }

    #[test]
    fn rejects_unsupported_language() {
        let err = BridgeConfig::from_json(r#"{"language": "Klingon"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_file_limit() {
        assert!(BridgeConfig::from_json(r#"{"max_file_mb": 0}"#).is_err());
    }

    #[test]
    fn api_key_is_redacted() {
        let config = BridgeConfig::from_json(r#"{"api_key": "sk-secret-123"}"#).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret-123"));
        assert!(debug.contains("<redacted>"));
        assert_eq!(config.api_key.expose(), "sk-secret-123");
    }

    #[test]
    fn reading_level_accepts_labels() {
        assert_eq!(
            "High School".parse::<ReadingLevel>().unwrap(),
            ReadingLevel::HighSchool
        );
        assert_eq!(
            "middle-school".parse::<ReadingLevel>().unwrap(),
            ReadingLevel::MiddleSchool
        );
        assert!("kindergarten".parse::<ReadingLevel>().is_err());
    }

    #[test]
    fn taxonomy_restricts_listed_attributes_only() {
        let taxonomy = Taxonomy::default();
        let mut demo = Demographics::new();
        demo.insert("role".into(), "Farmer".into());
        demo.insert("age".into(), "25-34".into());
        assert!(taxonomy.check_demographics(&demo).is_ok());

        demo.insert("role".into(), "Astronaut".into());
        let err = taxonomy.check_demographics(&demo).unwrap_err();
        assert!(err.contains("Astronaut"));

        assert!(Taxonomy::open().check_demographics(&demo).is_ok());
    }
}
