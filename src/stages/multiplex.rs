//! Text-channel encoding of generation output.
//!
//! Consumers that can only read one stream of text lines (a terminal, a
//! pipe into a UI) get review fragments prefixed with [`REVIEW_MARKER`] and
//! the terminal failure prefixed with [`ERROR_MARKER`]. Everything else
//! passes through unmarked. Ordinary content that happens to begin with a
//! marker is misclassified on the way back; the typed
//! [`GenerationEvent`] channel has no such ambiguity.
//!
//! Fragments may contain newlines, so a line-oriented sink writes each
//! encoded fragment as a JSON string literal ([`frame_event`]), one per line.

use serde_json::Value;

use crate::models::{GenerationEvent, PipelinePhase, TaggedChunk};

/// Prefix for review-phase fragments
pub const REVIEW_MARKER: &str = "[REVIEW]";

/// Prefix for the final failure line
pub const ERROR_MARKER: &str = "[错误] ";

/// Encode a fragment for the text channel
pub fn tag(phase: PipelinePhase, fragment: &str) -> String {
    match phase {
        PipelinePhase::Review => format!("{}{}", REVIEW_MARKER, fragment),
        _ => fragment.to_string(),
    }
}

pub fn tag_chunk(chunk: &TaggedChunk) -> String {
    tag(chunk.phase, &chunk.text)
}

/// Inverse of [`tag`]: the review phase if the line carries the review
/// marker, and the text with the marker removed
pub fn strip(line: &str) -> (Option<PipelinePhase>, &str) {
    match line.strip_prefix(REVIEW_MARKER) {
        Some(text) => (Some(PipelinePhase::Review), text),
        None => (None, line),
    }
}

/// Error message carried by a failure line, if this is one
pub fn strip_error(line: &str) -> Option<&str> {
    line.strip_prefix(ERROR_MARKER)
}

/// Text-channel line for an event. Completion carries no text.
pub fn encode_event(event: &GenerationEvent) -> Option<String> {
    match event {
        GenerationEvent::Chunk(chunk) => Some(tag_chunk(chunk)),
        GenerationEvent::Failed(error) => Some(format!("{}{}", ERROR_MARKER, error)),
        GenerationEvent::Completed(_) => None,
    }
}

/// One line of the framed text channel: the encoded event as a JSON string
/// literal, so embedded newlines stay inside the line
pub fn frame_event(event: &GenerationEvent) -> Option<String> {
    encode_event(event).map(|encoded| Value::String(encoded).to_string())
}

/// Consumer side of the text channel: rebuilds the unmarked text, the
/// review text and any error messages from encoded lines
#[derive(Debug, Clone, Default)]
pub struct Demultiplexer {
    main: String,
    review: String,
    errors: Vec<String>,
}

impl Demultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one encoded line
    pub fn push(&mut self, line: &str) {
        if let Some(message) = strip_error(line) {
            self.errors.push(message.to_string());
            return;
        }

        match strip(line) {
            (Some(_), text) => self.review.push_str(text),
            (None, text) => self.main.push_str(text),
        }
    }

    /// Route one line written by [`frame_event`]
    pub fn push_framed(&mut self, line: &str) -> Result<(), serde_json::Error> {
        let encoded: String = serde_json::from_str(line)?;
        self.push(&encoded);
        Ok(())
    }

    /// Concatenated draft and refine output
    pub fn main_text(&self) -> &str {
        &self.main
    }

    pub fn review_text(&self) -> &str {
        &self.review
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::error::{GenerationError, TransportError};

    #[test]
    fn test_only_review_is_marked() {
        for phase in PipelinePhase::ALL {
            let encoded = tag(phase, "镜头一");
            if phase == PipelinePhase::Review {
                assert_eq!(encoded, "[REVIEW]镜头一");
            } else {
                assert_eq!(encoded, "镜头一");
                assert!(!encoded.contains(REVIEW_MARKER));
            }
        }
    }

    #[test]
    fn test_strip_inverts_tag() {
        for phase in PipelinePhase::ALL {
            let fragment = "\n### 角色B\n";
            let encoded = tag(phase, fragment);
            let (recovered, text) = strip(&encoded);

            assert_eq!(text, fragment);
            assert_eq!(recovered == Some(PipelinePhase::Review), phase == PipelinePhase::Review);
        }
    }

    #[test]
    fn test_empty_review_fragment_stays_marked() {
        assert_eq!(strip(&tag(PipelinePhase::Review, "")), (Some(PipelinePhase::Review), ""));
    }

    #[test]
    fn test_marker_in_ordinary_content_is_misread() {
        let (phase, text) = strip("[REVIEW] appears in a draft");
        assert_eq!(phase, Some(PipelinePhase::Review));
        assert_eq!(text, " appears in a draft");
    }

    #[test]
    fn test_framed_lines_keep_multiline_fragments() {
        let fragments = ["### 角色A\n", "判词...", "\n### 角色B\n", "判词..."];
        let mut events: Vec<GenerationEvent> = fragments
            .iter()
            .map(|f| GenerationEvent::Chunk(TaggedChunk::new(PipelinePhase::Review, *f)))
            .collect();
        events.insert(0, GenerationEvent::Chunk(TaggedChunk::new(PipelinePhase::Draft, "第一行\n第二行")));

        // Same layout the CLI writes with --encoded
        let channel: String = events
            .iter()
            .filter_map(frame_event)
            .map(|line| format!("{}\n", line))
            .collect();
        assert_eq!(channel.lines().count(), 5);

        let mut demux = Demultiplexer::new();
        for line in channel.lines() {
            demux.push_framed(line).unwrap();
        }

        assert_eq!(demux.review_text(), fragments.concat());
        assert_eq!(demux.main_text(), "第一行\n第二行");
    }

    #[test]
    fn test_unframed_line_is_rejected() {
        let mut demux = Demultiplexer::new();
        assert!(demux.push_framed("[REVIEW]判词").is_err());
        assert!(demux.review_text().is_empty());
    }

    #[test]
    fn test_demultiplexer_rebuilds_channels() {
        let events = vec![
            GenerationEvent::Chunk(TaggedChunk::new(PipelinePhase::Draft, "初稿")),
            GenerationEvent::Chunk(TaggedChunk::new(PipelinePhase::Review, "### 角色A\n")),
            GenerationEvent::Chunk(TaggedChunk::new(PipelinePhase::Review, "判词...")),
            GenerationEvent::Chunk(TaggedChunk::new(PipelinePhase::Refine, "终稿")),
            GenerationEvent::Failed(GenerationError::Transport {
                phase: PipelinePhase::Refine,
                source: TransportError::Network("reset".to_string()),
            }),
        ];

        let mut demux = Demultiplexer::new();
        for line in events.iter().filter_map(encode_event) {
            demux.push(&line);
        }

        assert_eq!(demux.main_text(), "初稿终稿");
        assert_eq!(demux.review_text(), "### 角色A\n判词...");
        assert_eq!(demux.errors().len(), 1);
        assert!(demux.errors()[0].contains("reset"));
    }

    fn any_chunk() -> impl Strategy<Value = TaggedChunk> {
        // Ordinary content never starts with the marker
        let text = "([^\\[].{0,12})?(\n.{0,12})?";
        (prop::sample::select(PipelinePhase::ALL.to_vec()), text)
            .prop_map(|(phase, text)| TaggedChunk::new(phase, text))
    }

    proptest! {
        #[test]
        fn test_only_review_carries_marker(chunks in prop::collection::vec(any_chunk(), 0..12)) {
            for chunk in &chunks {
                let encoded = tag_chunk(chunk);
                let is_review = chunk.phase == PipelinePhase::Review;
                prop_assert_eq!(encoded.starts_with(REVIEW_MARKER), is_review);

                let (phase, text) = strip(&encoded);
                prop_assert_eq!(phase == Some(PipelinePhase::Review), is_review);
                prop_assert_eq!(text, chunk.text.as_str());
            }
        }

        #[test]
        fn test_framed_channel_round_trips(chunks in prop::collection::vec(any_chunk(), 0..12)) {
            let channel: String = chunks
                .iter()
                .filter_map(|chunk| frame_event(&GenerationEvent::Chunk(chunk.clone())))
                .map(|line| format!("{}\n", line))
                .collect();

            let mut demux = Demultiplexer::new();
            for line in channel.lines() {
                demux.push_framed(line).unwrap();
            }

            let expected = |review: bool| -> String {
                chunks
                    .iter()
                    .filter(|c| (c.phase == PipelinePhase::Review) == review)
                    .map(|c| c.text.as_str())
                    .collect()
            };
            prop_assert_eq!(demux.review_text(), expected(true));
            prop_assert_eq!(demux.main_text(), expected(false));
        }
    }
}
