pub mod error;
pub mod io;
pub mod llm;
pub mod models;
pub mod stages;

#[cfg(test)]
mod testing;

pub use error::{ExtractionError, GenerationError, InputError, PromptError, StoreError, TransportError};
pub use io::{FileKnowledgeBase, KnowledgeBase};
pub use llm::{extract_structured, normalize, ChatClient, LanguageModel, LlmConfig, PromptLibrary};
pub use models::{
    Category, GenerationEvent, GenerationInput, GenerationOutput, IngestResult, PipelinePhase,
    ScriptOutput, StructuredRecord, TaggedChunk,
};
pub use stages::{
    encode_event, frame_event, parse_script_output, Demultiplexer, GenerationPipeline, Ingestor, PipelineConfig,
};
