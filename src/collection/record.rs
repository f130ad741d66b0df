//! Typed document records and the labeled inputs of the three knowledge bases.
//!
//! Every record is validated where it is built. The index stores metadata
//! verbatim and never interprets it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::collection::CollectionError;
use crate::vector::Distance;

/// Scalar metadata value attached to a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    /// Returns the string content for text values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Int(i) => write!(f, "{i}"),
            MetadataValue::Float(x) => write!(f, "{x}"),
            MetadataValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

/// Free-form key/value tags, ordered by key for stable snapshots.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Rejects values the JSON snapshot cannot round-trip.
///
/// `NaN` and infinities serialize as `null`, which would make the whole
/// snapshot unreadable on the next load.
pub fn validate_metadata(metadata: &Metadata) -> Result<(), CollectionError> {
    for (key, value) in metadata {
        if matches!(value, MetadataValue::Float(x) if !x.is_finite()) {
            return Err(CollectionError::InvalidMetadata {
                key: key.clone(),
                reason: "number is not finite",
            });
        }
    }
    Ok(())
}

/// The unit stored in a collection: text plus its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub text: String,
    pub metadata: Metadata,
}

impl DocumentRecord {
    /// Builds a record, rejecting blank text.
    pub fn new(text: impl Into<String>, metadata: Metadata) -> Result<Self, CollectionError> {
        let text = text.into();
        require("text", &text)?;
        validate_metadata(&metadata)?;
        Ok(Self { text, metadata })
    }

    /// Looks up a text metadata field.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(MetadataValue::as_str)
    }
}

/// One search result: the stored record and its squared L2 distance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    #[serde(rename = "text")]
    pub document: String,
    pub metadata: Metadata,
    pub distance: Distance,
}

fn require(field: &'static str, value: &str) -> Result<(), CollectionError> {
    if value.trim().is_empty() {
        return Err(CollectionError::MissingField { field });
    }
    Ok(())
}

fn or_default(value: Option<String>, default: &str) -> MetadataValue {
    MetadataValue::Text(value.unwrap_or_else(|| default.to_string()))
}

/// A past question/answer pair used to imitate tone and style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleExample {
    query: String,
    response: String,
    language: Option<String>,
    country: Option<String>,
    program: Option<String>,
    tags: Option<String>,
}

impl StyleExample {
    pub fn new(query: impl Into<String>, response: impl Into<String>) -> Result<Self, CollectionError> {
        let query = query.into();
        let response = response.into();
        require("query", &query)?;
        require("response", &response)?;
        Ok(Self {
            query,
            response,
            language: None,
            country: None,
            program: None,
            tags: None,
        })
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = Some(tags.into());
        self
    }

    /// Renders the pair as one record labeled `historical_email`.
    pub fn into_record(self) -> DocumentRecord {
        let text = format!(
            "DOMANDA STUDENTE: {}\n\nRISPOSTA: {}",
            self.query, self.response
        );
        let mut metadata = Metadata::new();
        metadata.insert("type".into(), "historical_email".into());
        metadata.insert("language".into(), or_default(self.language, "unknown"));
        metadata.insert("country".into(), or_default(self.country, "unknown"));
        metadata.insert("program".into(), or_default(self.program, "unknown"));
        metadata.insert("tags".into(), or_default(self.tags, ""));
        DocumentRecord { text, metadata }
    }
}

/// An enrollment document; long content is chunked before indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactDocument {
    content: String,
    title: Option<String>,
    document_type: Option<String>,
    country: Option<String>,
    program: Option<String>,
    language: Option<String>,
    priority: Option<String>,
}

impl FactDocument {
    pub fn new(content: impl Into<String>) -> Result<Self, CollectionError> {
        let content = content.into();
        require("content", &content)?;
        Ok(Self {
            content,
            title: None,
            document_type: None,
            country: None,
            program: None,
            language: None,
            priority: None,
        })
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_document_type(mut self, document_type: impl Into<String>) -> Self {
        self.document_type = Some(document_type.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Metadata shared by every chunk of this document.
    pub fn metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("type".into(), "enrollment_doc".into());
        metadata.insert("title".into(), or_default(self.title.clone(), "Untitled"));
        metadata.insert(
            "document_type".into(),
            or_default(self.document_type.clone(), "general"),
        );
        metadata.insert("country".into(), or_default(self.country.clone(), "ALL"));
        metadata.insert("program".into(), or_default(self.program.clone(), "ALL"));
        metadata.insert("language".into(), or_default(self.language.clone(), "it"));
        metadata.insert(
            "priority".into(),
            or_default(self.priority.clone(), "medium"),
        );
        metadata
    }
}

/// A known mistake and its fix, retrieved to keep drafts from repeating it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correction {
    wrong_info: String,
    correct_info: String,
    context: Option<String>,
    title: Option<String>,
    category: Option<String>,
    priority: Option<String>,
}

impl Correction {
    pub fn new(
        wrong_info: impl Into<String>,
        correct_info: impl Into<String>,
    ) -> Result<Self, CollectionError> {
        let wrong_info = wrong_info.into();
        let correct_info = correct_info.into();
        require("wrong_info", &wrong_info)?;
        require("correct_info", &correct_info)?;
        Ok(Self {
            wrong_info,
            correct_info,
            context: None,
            title: None,
            category: None,
            priority: None,
        })
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    /// Renders the correction as one record labeled `correction`.
    pub fn into_record(self) -> DocumentRecord {
        let mut text = format!(
            "WRONG: {}\n\nCORRECT: {}",
            self.wrong_info, self.correct_info
        );
        if let Some(context) = self.context.as_deref().filter(|c| !c.trim().is_empty()) {
            text.push_str("\n\nCONTEXT: ");
            text.push_str(context);
        }

        let mut metadata = Metadata::new();
        metadata.insert("type".into(), "correction".into());
        metadata.insert("title".into(), or_default(self.title, "Correction"));
        metadata.insert("category".into(), or_default(self.category, "general"));
        metadata.insert("priority".into(), or_default(self.priority, "medium"));
        DocumentRecord { text, metadata }
    }
}
