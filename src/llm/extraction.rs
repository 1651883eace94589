use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ExtractionError;

lazy_static! {
    // Fenced block explicitly labeled as JSON (not jsonc, json5)
    static ref JSON_FENCE: Regex = Regex::new(r"(?i)```json\b\s*([\s\S]*?)\s*```").expect("valid regex");

    // Any fenced block
    static ref ANY_FENCE: Regex = Regex::new(r"```\s*([\s\S]*?)\s*```").expect("valid regex");
}

/// Which parse tier recovered the mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionTier {
    /// The whole response parsed as JSON
    Direct,
    /// Interior of the first ```json fence
    LabeledFence,
    /// Interior of the first fence of any kind
    BareFence,
}

/// Recover a JSON object from a model response.
///
/// Tiers run in strict order, each only if the previous one failed:
/// direct parse, first ```json fence, first fence of any kind. Only the
/// first match of each tier is tried.
pub fn extract_structured(raw: &str) -> Result<Map<String, Value>, ExtractionError> {
    extract_with_tier(raw).map(|(map, _)| map)
}

/// Like [`extract_structured`], also reporting the tier that succeeded
pub fn extract_with_tier(raw: &str) -> Result<(Map<String, Value>, ExtractionTier), ExtractionError> {
    if raw.trim().is_empty() {
        return Err(ExtractionError::EmptyResponse);
    }

    if let Some(map) = parse_object(raw) {
        return Ok((map, ExtractionTier::Direct));
    }

    if let Some(map) = first_fence_interior(&JSON_FENCE, raw).and_then(parse_object) {
        debug!("Recovered JSON from labeled fence");
        return Ok((map, ExtractionTier::LabeledFence));
    }

    if let Some(map) = first_fence_interior(&ANY_FENCE, raw).and_then(parse_object) {
        debug!("Recovered JSON from bare fence");
        return Ok((map, ExtractionTier::BareFence));
    }

    Err(ExtractionError::Unparseable {
        raw: raw.to_string(),
    })
}

fn first_fence_interior<'a>(pattern: &Regex, raw: &'a str) -> Option<&'a str> {
    pattern
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Strict parse; anything other than a JSON object is a miss
fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}
