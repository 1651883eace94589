use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Subject name used when the model could not infer one
pub const UNKNOWN_SUBJECT: &str = "未知";

/// Provenance marker for records captured through auto-ingest
pub const DEFAULT_ORIGIN: &str = "user_capture";

/// Game category - restricted set so the storage path stays predictable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "SLG")]
    Slg,
    #[serde(rename = "MMO")]
    Mmo,
    #[serde(rename = "卡牌")]
    Card,
    #[serde(rename = "休闲")]
    Casual,
    #[serde(rename = "二次元")]
    Anime,
    #[serde(rename = "模拟经营")]
    Simulation,
    #[serde(rename = "射击")]
    Shooter,
    #[serde(rename = "传奇")]
    Legend,
    /// Catch-all for anything outside the known set
    #[default]
    #[serde(rename = "其他", other)]
    Other,
}

impl Category {
    /// Every known category, catch-all last
    pub const ALL: [Category; 9] = [
        Category::Slg,
        Category::Mmo,
        Category::Card,
        Category::Casual,
        Category::Anime,
        Category::Simulation,
        Category::Shooter,
        Category::Legend,
        Category::Other,
    ];

    /// The label used in prompts, storage paths and serialized records
    pub fn label(&self) -> &'static str {
        match self {
            Category::Slg => "SLG",
            Category::Mmo => "MMO",
            Category::Card => "卡牌",
            Category::Casual => "休闲",
            Category::Anime => "二次元",
            Category::Simulation => "模拟经营",
            Category::Shooter => "射击",
            Category::Legend => "传奇",
            Category::Other => "其他",
        }
    }

    /// Match a label, ignoring surrounding whitespace and ASCII case.
    /// Returns `None` for labels outside the known set.
    pub fn from_label(label: &str) -> Option<Category> {
        let label = label.trim();
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.label().eq_ignore_ascii_case(label))
    }

    /// Comma-separated label list for prompt text
    pub fn prompt_list() -> String {
        Category::ALL
            .iter()
            .map(|c| c.label())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Tagged metadata for one piece of ad copy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredRecord {
    /// Inferred game name
    pub subject_name: String,
    /// Core game category
    pub category: Category,
    /// Gameplay tags (the prompt asks for at most 3, the parser keeps all)
    pub tags: Vec<String>,
    /// Attention hook used in the first seconds
    pub hook: String,
    /// Implied visual style
    pub style: String,
    /// One-line plot summary
    pub summary: String,
    /// Provenance marker
    pub origin: String,
    /// When the record was captured
    pub recorded_at: DateTime<Utc>,
}

impl Default for StructuredRecord {
    fn default() -> Self {
        Self {
            subject_name: UNKNOWN_SUBJECT.to_string(),
            category: Category::Other,
            tags: Vec::new(),
            hook: String::new(),
            style: String::new(),
            summary: String::new(),
            origin: DEFAULT_ORIGIN.to_string(),
            recorded_at: Utc::now(),
        }
    }
}

/// Metadata written by the older storage layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyRecord {
    #[serde(rename = "game_name")]
    pub subject_name: String,
    #[serde(rename = "source")]
    pub origin: String,
    #[serde(rename = "archived_at", deserialize_with = "deserialize_timestamp")]
    pub recorded_at: DateTime<Utc>,
}

impl From<LegacyRecord> for StructuredRecord {
    fn from(legacy: LegacyRecord) -> Self {
        Self {
            subject_name: legacy.subject_name,
            origin: legacy.origin,
            recorded_at: legacy.recorded_at,
            ..Default::default()
        }
    }
}

/// Parse an ISO-8601 timestamp. Accepts RFC 3339 and offset-less
/// timestamps, which are read as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
}
