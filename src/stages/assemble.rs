use lazy_static::lazy_static;
use regex::Regex;

use crate::models::ScriptOutput;

lazy_static! {
    static ref BR_TAG: Regex = Regex::new(r"(?i)<br\s*/?>").expect("valid regex");
    static ref ANY_TAG: Regex = Regex::new(r"<[^>]+>").expect("valid regex");
    static ref REPEATED_SEMICOLON: Regex = Regex::new(r"；+").expect("valid regex");
    static ref SEPARATOR_ROW: Regex = Regex::new(r"^[|\-:\s]+$").expect("valid regex");
    static ref BRACKET_TAG: Regex =
        Regex::new(r"\[(分镜|口播|设计意图)\][:：]?\s*([^\[]*)").expect("valid regex");
    // Start of a numbered item: `1.` or `1、` at a line start or after whitespace
    static ref NUMBERED_ITEM: Regex = Regex::new(r"(?m)(?:^|\s)\d{1,2}[.、]\s*").expect("valid regex");
    static ref NUMBERED_FIELDS: Regex =
        Regex::new(r"(?s)^(?:分镜[:：]?\s*)?(.+?)口播[:：]?\s*(.+?)设计意图[:：]?\s*(.+)$").expect("valid regex");
}

const HEADER_KEYWORDS: [&str; 9] = [
    "分镜", "口播", "设计", "画面", "文案", "意图", "storyboard", "voiceover", "design",
];

/// Parse model output into the three-column script layout.
///
/// Tries a Markdown table, then one-row-per-line delimiter layout (`|` or
/// `/`), then bracket tags (`[分镜]…[口播]…[设计意图]…`), then numbered items
/// (`1. 分镜：… 口播：… 设计意图：…`). Output matching none of them keeps only
/// `raw_content`.
pub fn parse_script_output(raw: &str) -> ScriptOutput {
    if raw.trim().is_empty() {
        return ScriptOutput::raw(raw);
    }

    let parsers: [fn(&str) -> Option<ScriptOutput>; 4] =
        [parse_markdown_table, parse_delimited_rows, parse_bracket_tags, parse_numbered];
    parsers
        .iter()
        .filter_map(|parse| parse(raw))
        .find(ScriptOutput::is_valid)
        .unwrap_or_else(|| ScriptOutput::raw(raw))
}

/// Strip HTML from a cell; line breaks become `；`
pub fn clean_html(text: &str) -> String {
    let cleaned = BR_TAG.replace_all(text, "；");
    let cleaned = ANY_TAG.replace_all(&cleaned, "");
    let cleaned = REPEATED_SEMICOLON.replace_all(&cleaned, "；");
    cleaned.trim().trim_matches('；').trim().to_string()
}

fn is_header(line: &str) -> bool {
    let lower = line.to_lowercase();
    HEADER_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

fn cells(line: &str, delimiter: char) -> Vec<&str> {
    line.split(delimiter)
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
        .collect()
}

#[derive(Default)]
struct Columns {
    storyboard: Vec<String>,
    voiceover: Vec<String>,
    design_intent: Vec<String>,
}

impl Columns {
    fn push(&mut self, shot: &str, voice: &str, intent: &str) {
        self.storyboard.push(clean_html(shot));
        self.voiceover.push(clean_html(voice));
        self.design_intent.push(clean_html(intent));
    }

    fn into_output(self, raw: &str) -> Option<ScriptOutput> {
        if self.storyboard.is_empty() {
            return None;
        }
        Some(ScriptOutput {
            storyboard: self.storyboard,
            voiceover: self.voiceover,
            design_intent: self.design_intent,
            raw_content: raw.to_string(),
        })
    }
}

fn parse_markdown_table(raw: &str) -> Option<ScriptOutput> {
    let mut rows = Vec::new();
    let mut in_table = false;

    for line in raw.lines().map(str::trim) {
        if !line.contains('|') {
            continue;
        }
        if SEPARATOR_ROW.is_match(line) {
            in_table = true;
            continue;
        }
        if in_table || is_header(line) {
            in_table = true;
            rows.push(line);
        }
    }

    let (header, body) = rows.split_first()?;
    if body.is_empty() {
        return None;
    }

    let header = cells(header, '|');
    let find = |keys: &[&str]| {
        header.iter().position(|cell| {
            let lower = cell.to_lowercase();
            keys.iter().any(|k| lower.contains(k))
        })
    };
    let order = match (
        find(&["分镜", "画面", "storyboard"]),
        find(&["口播", "文案", "旁白", "voiceover"]),
        find(&["设计", "意图", "design", "intent"]),
    ) {
        (Some(s), Some(v), Some(d)) => [s, v, d],
        _ if header.len() >= 3 => [0, 1, 2],
        _ => return None,
    };

    let mut columns = Columns::default();
    for row in body {
        let row = cells(row, '|');
        if row.len() < 3 {
            continue;
        }
        let cell = |i: usize| row.get(i).copied().unwrap_or("");
        columns.push(cell(order[0]), cell(order[1]), cell(order[2]));
    }
    columns.into_output(raw)
}

fn parse_delimited_rows(raw: &str) -> Option<ScriptOutput> {
    let mut columns = Columns::default();

    for line in raw.lines().map(str::trim) {
        if line.is_empty() || is_header(line) {
            continue;
        }
        for delimiter in ['|', '/'] {
            let parts = cells(line, delimiter);
            if parts.len() >= 3 {
                columns.push(parts[0], parts[1], parts[2]);
                break;
            }
        }
    }
    columns.into_output(raw)
}

fn parse_bracket_tags(raw: &str) -> Option<ScriptOutput> {
    let mut columns = Columns::default();

    for caps in BRACKET_TAG.captures_iter(raw) {
        let text = caps[2].trim();
        if text.is_empty() {
            continue;
        }
        let cleaned = clean_html(text);
        match &caps[1] {
            "分镜" => columns.storyboard.push(cleaned),
            "口播" => columns.voiceover.push(cleaned),
            _ => columns.design_intent.push(cleaned),
        }
    }

    let shots = columns
        .storyboard
        .len()
        .min(columns.voiceover.len())
        .min(columns.design_intent.len());
    if shots == 0 {
        return None;
    }
    columns.storyboard.truncate(shots);
    columns.voiceover.truncate(shots);
    columns.design_intent.truncate(shots);
    Some(ScriptOutput {
        storyboard: columns.storyboard,
        voiceover: columns.voiceover,
        design_intent: columns.design_intent,
        raw_content: raw.to_string(),
    })
}

fn parse_numbered(raw: &str) -> Option<ScriptOutput> {
    // `2.5倍` is a number, not an item
    let items: Vec<(usize, usize)> = NUMBERED_ITEM
        .find_iter(raw)
        .filter(|m| !raw[m.end()..].starts_with(|c: char| c.is_ascii_digit()))
        .map(|m| (m.start(), m.end()))
        .collect();

    let mut columns = Columns::default();
    for (i, &(_, body_start)) in items.iter().enumerate() {
        let body_end = items.get(i + 1).map_or(raw.len(), |&(next, _)| next);
        if let Some(caps) = NUMBERED_FIELDS.captures(&raw[body_start..body_end]) {
            columns.push(caps[1].trim(), caps[2].trim(), caps[3].trim());
        }
    }
    columns.into_output(raw)
}
