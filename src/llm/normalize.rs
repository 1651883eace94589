use serde_json::{Map, Value};
use tracing::debug;

use crate::models::{parse_timestamp, Category, StructuredRecord};

/// A field the normalizer had to fill from the schema default.
/// Informational only; never blocks ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultApplied {
    pub field: &'static str,
    pub reason: DefaultReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultReason {
    /// Key absent (under both the current and the older name)
    Missing,
    /// Key present with the wrong JSON type
    WrongShape,
    /// Category label outside the known set
    UnknownCategory,
    /// Timestamp string that does not parse as ISO-8601
    InvalidTimestamp,
}

/// Result of normalizing an extracted mapping
#[derive(Debug, Clone)]
pub struct Normalized {
    pub record: StructuredRecord,
    pub defaults: Vec<DefaultApplied>,
}

/// Build a complete record from a partially-correct mapping.
///
/// Never fails: each recognized field is read if present and well-shaped,
/// otherwise its default is used. Unrecognized keys are ignored.
pub fn normalize(parsed: &Map<String, Value>) -> StructuredRecord {
    let normalized = normalize_with_report(parsed);
    for applied in &normalized.defaults {
        debug!("Default applied for '{}': {:?}", applied.field, applied.reason);
    }
    normalized.record
}

/// [`normalize`], also listing every default that was substituted
pub fn normalize_with_report(parsed: &Map<String, Value>) -> Normalized {
    let mut fields = FieldReader {
        parsed,
        defaults: Vec::new(),
    };
    let mut record = StructuredRecord::default();

    if let Some(name) = fields.string("subject_name", "game_name") {
        if name.trim().is_empty() {
            fields.note("subject_name", DefaultReason::Missing);
        } else {
            record.subject_name = name;
        }
    }

    if let Some(label) = fields.string("category", "category") {
        match Category::from_label(&label) {
            Some(category) => record.category = category,
            None => fields.note("category", DefaultReason::UnknownCategory),
        }
    }

    if let Some(tags) = fields.string_list("tags", "gameplay_tags") {
        record.tags = tags;
    }
    if let Some(hook) = fields.string("hook", "hook_type") {
        record.hook = hook;
    }
    if let Some(style) = fields.string("style", "visual_style") {
        record.style = style;
    }
    if let Some(summary) = fields.string("summary", "summary") {
        record.summary = summary;
    }
    if let Some(origin) = fields.string("origin", "source") {
        record.origin = origin;
    }

    if let Some(raw) = fields.string("recorded_at", "archived_at") {
        match parse_timestamp(&raw) {
            Some(at) => record.recorded_at = at,
            None => fields.note("recorded_at", DefaultReason::InvalidTimestamp),
        }
    }

    Normalized {
        record,
        defaults: fields.defaults,
    }
}

struct FieldReader<'a> {
    parsed: &'a Map<String, Value>,
    defaults: Vec<DefaultApplied>,
}

impl<'a> FieldReader<'a> {
    fn note(&mut self, field: &'static str, reason: DefaultReason) {
        self.defaults.push(DefaultApplied { field, reason });
    }

    /// Value under the current key, else under the older key
    fn lookup(&mut self, field: &'static str, alias: &str) -> Option<&'a Value> {
        let value = self.parsed.get(field).or_else(|| self.parsed.get(alias));
        if value.is_none() {
            self.note(field, DefaultReason::Missing);
        }
        value
    }

    fn string(&mut self, field: &'static str, alias: &str) -> Option<String> {
        match self.lookup(field, alias)? {
            Value::String(s) => Some(s.clone()),
            _ => {
                self.note(field, DefaultReason::WrongShape);
                None
            }
        }
    }

    /// Array of strings; non-string items are dropped and noted
    fn string_list(&mut self, field: &'static str, alias: &str) -> Option<Vec<String>> {
        match self.lookup(field, alias)? {
            Value::Array(items) => {
                let strings: Vec<String> = items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect();
                if strings.len() < items.len() {
                    self.note(field, DefaultReason::WrongShape);
                }
                Some(strings)
            }
            _ => {
                self.note(field, DefaultReason::WrongShape);
                None
            }
        }
    }
}
