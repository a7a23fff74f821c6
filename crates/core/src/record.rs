//! Retrieved records: community reports and text chunks.
//!
//! Both are read from the graph store per query. Scores (`weight`,
//! `relevance`, `relevance_score`) are assigned during context assembly and
//! are never written back.

use serde::{Deserialize, Deserializer, Serialize};

/// A summary of a detected community of related entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunityReport {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub summary: String,
    #[serde(deserialize_with = "null_as_default")]
    pub full_content: String,
    #[serde(deserialize_with = "null_as_default")]
    pub entity_names: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub entity_descriptions: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub chunk_texts: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub entity_titles: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub finding_id: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub level: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub rank: f64,
    /// Assigned by the weight normalizer.
    #[serde(skip_deserializing)]
    pub weight: f64,
    /// Fraction of query terms matched; assigned by the lexical scorer.
    #[serde(skip_deserializing)]
    pub relevance: f64,
}

impl CommunityReport {
    /// A report is packable only when it carries text to show.
    pub fn is_included(&self) -> bool {
        !self.summary.trim().is_empty() || !self.full_content.trim().is_empty()
    }
}

/// A contiguous slice of a source document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Chunk {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(deserialize_with = "null_as_default")]
    pub n_tokens: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub entity_names: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub entity_descriptions: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub entity_types: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub document_titles: Vec<String>,
    #[serde(deserialize_with = "null_as_default", skip_serializing)]
    pub embedding: Vec<f32>,
    #[serde(deserialize_with = "null_as_default")]
    pub relevance_score: f64,
}

impl Chunk {
    pub fn is_included(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Either kind of retrieved record.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    CommunityReport(CommunityReport),
    Chunk(Chunk),
}

impl Record {
    pub fn id(&self) -> &str {
        match self {
            Record::CommunityReport(r) => &r.id,
            Record::Chunk(c) => &c.id,
        }
    }

    pub fn is_included(&self) -> bool {
        match self {
            Record::CommunityReport(r) => r.is_included(),
            Record::Chunk(c) => c.is_included(),
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// Community ids come back from the graph as integers or strings.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}
