use serde::{Deserialize, Serialize};

/// Three-column ad script: storyboard, voiceover, design intent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptOutput {
    /// Shot descriptions
    pub storyboard: Vec<String>,
    /// Voiceover lines
    pub voiceover: Vec<String>,
    /// Creative purpose of each shot
    pub design_intent: Vec<String>,
    /// The model text the columns were parsed from
    pub raw_content: String,
}

impl ScriptOutput {
    /// Unparsed output that only keeps the raw text
    pub fn raw(raw_content: impl Into<String>) -> Self {
        Self {
            raw_content: raw_content.into(),
            ..Default::default()
        }
    }

    /// All three columns non-empty and of equal length
    pub fn is_valid(&self) -> bool {
        !self.storyboard.is_empty()
            && self.storyboard.len() == self.voiceover.len()
            && self.voiceover.len() == self.design_intent.len()
    }

    pub fn shot_count(&self) -> usize {
        if self.is_valid() { self.storyboard.len() } else { 0 }
    }

    /// Markdown table, or the raw text when the columns are unusable
    pub fn to_markdown_table(&self) -> String {
        if !self.is_valid() {
            return self.raw_content.clone();
        }

        let mut lines = vec![
            "| 分镜 | 口播 | 设计意图 |".to_string(),
            "|------|------|----------|".to_string(),
        ];
        for ((shot, voice), intent) in self
            .storyboard
            .iter()
            .zip(&self.voiceover)
            .zip(&self.design_intent)
        {
            lines.push(format!("| {} | {} | {} |", shot, voice, intent));
        }
        lines.join("\n")
    }
}
