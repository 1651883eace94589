use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GenerationError, InputError};

use super::{Category, ScriptOutput};

/// Phases of a generation run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    /// Look up reference scripts of the same category
    Retrieval,
    /// First draft from the generation model
    Draft,
    /// Committee review, streamed fragment by fragment
    Review,
    /// Rewrite of the draft using the complete review
    Refine,
}

impl PipelinePhase {
    pub const ALL: [PipelinePhase; 4] = [
        PipelinePhase::Retrieval,
        PipelinePhase::Draft,
        PipelinePhase::Review,
        PipelinePhase::Refine,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelinePhase::Retrieval => "retrieval",
            PipelinePhase::Draft => "draft",
            PipelinePhase::Review => "review",
            PipelinePhase::Refine => "refine",
        }
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// Status notification delivered to step observers
#[derive(Debug, Clone, Serialize)]
pub struct GenerationStep {
    pub phase: PipelinePhase,
    pub status: PhaseStatus,
    /// Human-readable detail; the full phase text once completed
    pub detail: String,
    pub at: DateTime<Utc>,
}

impl GenerationStep {
    pub fn new(phase: PipelinePhase, status: PhaseStatus, detail: impl Into<String>) -> Self {
        Self {
            phase,
            status,
            detail: detail.into(),
            at: Utc::now(),
        }
    }
}

/// Per-invocation phase status table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseBoard {
    statuses: [PhaseStatus; 4],
}

impl PhaseBoard {
    pub fn get(&self, phase: PipelinePhase) -> PhaseStatus {
        self.statuses[Self::index(phase)]
    }

    pub fn set(&mut self, phase: PipelinePhase, status: PhaseStatus) {
        self.statuses[Self::index(phase)] = status;
    }

    /// (phase, status) pairs in execution order
    pub fn entries(&self) -> Vec<(PipelinePhase, PhaseStatus)> {
        PipelinePhase::ALL
            .iter()
            .map(|&phase| (phase, self.get(phase)))
            .collect()
    }

    fn index(phase: PipelinePhase) -> usize {
        match phase {
            PipelinePhase::Retrieval => 0,
            PipelinePhase::Draft => 1,
            PipelinePhase::Review => 2,
            PipelinePhase::Refine => 3,
        }
    }
}

/// Caller-supplied brief for a generation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationInput {
    /// Game introduction
    pub game_intro: String,
    /// Unique selling point
    pub usp: String,
    /// Target audience
    pub target_audience: String,
    /// Declared category label
    pub category: String,
    /// Game theme (三国, 仙侠, ...), adds theme traits to the review
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    /// Core gameplay (卡牌, 放置挂机, ...), adds gameplay traits to the review
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gameplay: Option<String>,
}

impl GenerationInput {
    /// Reject blank fields before any collaborator is called
    pub fn validate(&self) -> Result<(), InputError> {
        if self.game_intro.trim().is_empty() {
            return Err(InputError::Blank("game_intro"));
        }
        if self.usp.trim().is_empty() {
            return Err(InputError::Blank("usp"));
        }
        if self.target_audience.trim().is_empty() {
            return Err(InputError::Blank("target_audience"));
        }
        if self.category.trim().is_empty() {
            return Err(InputError::Blank("category"));
        }
        Ok(())
    }

    /// Category used for storage lookups
    pub fn category(&self) -> Category {
        Category::from_label(&self.category).unwrap_or_default()
    }

    /// Theme, if given and non-blank
    pub fn theme(&self) -> Option<&str> {
        self.theme.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    /// Core gameplay, if given and non-blank
    pub fn gameplay(&self) -> Option<&str> {
        self.gameplay.as_deref().map(str::trim).filter(|g| !g.is_empty())
    }

    /// Free-text query for reference retrieval
    pub fn search_query(&self) -> String {
        format!("{} {} {}", self.game_intro, self.usp, self.target_audience)
    }
}

/// A text fragment paired with the phase that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedChunk {
    pub phase: PipelinePhase,
    pub text: String,
}

impl TaggedChunk {
    pub fn new(phase: PipelinePhase, text: impl Into<String>) -> Self {
        Self {
            phase,
            text: text.into(),
        }
    }
}

/// Final value of a completed generation run
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    /// Reference texts used for the draft
    pub references: Vec<String>,
    /// Complete draft text
    pub draft: String,
    /// Complete review text, exactly as handed to refine
    pub review_feedback: String,
    /// Complete refine text
    pub final_text: String,
    /// Final text assembled into the three-column layout
    pub script: ScriptOutput,
    /// Status of every phase at completion
    pub phases: Vec<(PipelinePhase, PhaseStatus)>,
}

/// Item of the generation output sequence
#[derive(Debug, Clone)]
pub enum GenerationEvent {
    /// One fragment of phase output, in collaborator order
    Chunk(TaggedChunk),
    /// Terminal failure; nothing follows it
    Failed(GenerationError),
    /// Terminal success; nothing follows it
    Completed(Box<GenerationOutput>),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> GenerationInput {
        GenerationInput {
            game_intro: "三国题材策略手游".to_string(),
            usp: "开局送十连抽".to_string(),
            target_audience: "30岁男性".to_string(),
            category: "SLG".to_string(),
            theme: None,
            gameplay: None,
        }
    }

    #[test]
    fn test_validate_accepts_complete_input() {
        assert!(input().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_fields() {
        let mut blank_usp = input();
        blank_usp.usp = "   ".to_string();
        assert_eq!(blank_usp.validate(), Err(InputError::Blank("usp")));

        let mut blank_category = input();
        blank_category.category = String::new();
        assert_eq!(blank_category.validate(), Err(InputError::Blank("category")));
    }

    #[test]
    fn test_unknown_category_maps_to_other() {
        let mut racing = input();
        racing.category = "赛车".to_string();
        assert_eq!(racing.category(), Category::Other);
        assert_eq!(input().category(), Category::Slg);
    }

    #[test]
    fn test_phase_board_tracks_each_phase() {
        let mut board = PhaseBoard::default();
        board.set(PipelinePhase::Review, PhaseStatus::Running);

        assert_eq!(board.get(PipelinePhase::Review), PhaseStatus::Running);
        assert_eq!(board.get(PipelinePhase::Refine), PhaseStatus::Pending);
        assert_eq!(board.entries().len(), 4);
        assert_eq!(board.entries()[2], (PipelinePhase::Review, PhaseStatus::Running));
    }
}
