use std::pin::Pin;
use std::sync::Arc;

use futures::stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::error::GenerationError;
use crate::io::{KnowledgeBase, DEFAULT_TRAITS};
use crate::llm::{deliver, LanguageModel, PromptLibrary, NO_REFERENCES};
use crate::models::{
    GenerationEvent, GenerationInput, GenerationOutput, GenerationStep, PhaseBoard, PhaseStatus,
    PipelinePhase, ScriptOutput, TaggedChunk,
};

use super::assemble::parse_script_output;

/// Lazy generation output. Dropping it abandons the run; no further
/// collaborator calls are made.
pub type GenerationStream<'a> = Pin<Box<dyn Stream<Item = GenerationEvent> + Send + 'a>>;

/// Callback for phase status changes
pub type StepObserver = Arc<dyn Fn(&GenerationStep) + Send + Sync>;

/// Configuration for the generation pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Reference scripts requested during retrieval
    pub top_k: usize,
    /// Stream the draft, or deliver it as one fragment
    pub stream_draft: bool,
    /// Stream the refine output, or deliver it as one fragment
    pub stream_refine: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            stream_draft: true,
            stream_refine: true,
        }
    }
}

/// Which optional phases a run includes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub use_rag: bool,
    pub use_review: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            use_rag: true,
            use_review: true,
        }
    }
}

/// Retrieval → draft → review → refine, over a generation model, an
/// optional separate review model and a knowledge base.
///
/// Each call to [`GenerationPipeline::generate`] owns its own phase board
/// and accumulators, so one pipeline can serve successive runs.
pub struct GenerationPipeline {
    generator: Arc<dyn LanguageModel>,
    reviewer: Option<Arc<dyn LanguageModel>>,
    store: Arc<dyn KnowledgeBase>,
    prompts: PromptLibrary,
    config: PipelineConfig,
    observer: Option<StepObserver>,
}

impl GenerationPipeline {
    pub fn new(generator: Arc<dyn LanguageModel>, store: Arc<dyn KnowledgeBase>) -> Self {
        Self {
            generator,
            reviewer: None,
            store,
            prompts: PromptLibrary::default(),
            config: PipelineConfig::default(),
            observer: None,
        }
    }

    /// Use a different model for the review phase
    pub fn with_reviewer(mut self, reviewer: Arc<dyn LanguageModel>) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    pub fn with_prompts(mut self, prompts: PromptLibrary) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_observer(mut self, observer: impl Fn(&GenerationStep) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    fn reviewer(&self) -> &dyn LanguageModel {
        self.reviewer.as_deref().unwrap_or(self.generator.as_ref())
    }

    /// Run all four phases
    pub fn generate(&self, input: GenerationInput) -> GenerationStream<'_> {
        self.run(input, RunOptions::default())
    }

    /// Run the pipeline, skipping retrieval and/or review+refine as asked.
    ///
    /// Yields every fragment as a [`GenerationEvent::Chunk`] in the order the
    /// model produced it, then exactly one terminal event. Without review the
    /// draft is the final text.
    pub fn run(&self, input: GenerationInput, options: RunOptions) -> GenerationStream<'_> {
        Box::pin(async_stream::stream! {
            if let Err(e) = input.validate() {
                warn!("Rejected generation input: {}", e);
                yield GenerationEvent::Failed(e.into());
                return;
            }

            let mut tracker = PhaseTracker::new(self.observer.clone());

            let references = if options.use_rag {
                tracker.update(PipelinePhase::Retrieval, PhaseStatus::Running, "正在检索同品类参考脚本...");
                let references = self.retrieve(&input).await;
                tracker.update(
                    PipelinePhase::Retrieval,
                    PhaseStatus::Completed,
                    format!("找到 {} 个参考脚本", references.len()),
                );
                references
            } else {
                Vec::new()
            };
            let references_text = format_references(&references);

            let phases: &[PipelinePhase] = if options.use_review {
                &[PipelinePhase::Draft, PipelinePhase::Review, PipelinePhase::Refine]
            } else {
                &[PipelinePhase::Draft]
            };

            let mut draft = String::new();
            let mut review_feedback = String::new();
            let mut refined = String::new();

            for &phase in phases {
                tracker.update(phase, PhaseStatus::Running, running_detail(phase));

                let prompt = match phase {
                    PipelinePhase::Review => {
                        let traits = self.traits(&input).await;
                        self.prompts.review(&input, &draft, &traits)
                    }
                    PipelinePhase::Refine => self.prompts.refine(&input, &draft, &review_feedback),
                    _ => self.prompts.draft(&input, &references_text),
                };
                let prompt = match prompt {
                    Ok(prompt) => prompt,
                    Err(source) => {
                        let error = GenerationError::Prompt { phase, source };
                        tracker.update(phase, PhaseStatus::Failed, error.to_string());
                        yield GenerationEvent::Failed(error);
                        return;
                    }
                };

                let (model, streamed) = match phase {
                    PipelinePhase::Review => (self.reviewer(), true),
                    PipelinePhase::Refine => (self.generator.as_ref(), self.config.stream_refine),
                    _ => (self.generator.as_ref(), self.config.stream_draft),
                };
                info!("{} phase: requesting {} (streamed: {})", phase, model.name(), streamed);

                let mut accumulated = String::new();
                let mut failure = None;
                {
                    let mut fragments = deliver(model, &prompt, streamed);
                    while let Some(fragment) = fragments.next().await {
                        match fragment {
                            Ok(text) => {
                                accumulated.push_str(&text);
                                yield GenerationEvent::Chunk(TaggedChunk::new(phase, text));
                            }
                            Err(e) => {
                                failure = Some(e);
                                break;
                            }
                        }
                    }
                }

                let error = match failure {
                    Some(source) => Some(GenerationError::Transport { phase, source }),
                    None if phase == PipelinePhase::Draft && accumulated.trim().is_empty() => {
                        Some(GenerationError::EmptyDraft)
                    }
                    None => None,
                };
                if let Some(error) = error {
                    warn!("Generation failed: {}", error);
                    tracker.update(phase, PhaseStatus::Failed, error.to_string());
                    yield GenerationEvent::Failed(error);
                    return;
                }

                debug!("{} phase produced {} chars", phase, accumulated.chars().count());
                tracker.update(phase, PhaseStatus::Completed, accumulated.clone());
                match phase {
                    PipelinePhase::Review => review_feedback = accumulated,
                    PipelinePhase::Refine => refined = accumulated,
                    _ => draft = accumulated,
                }
            }

            let final_text = if options.use_review { refined } else { draft.clone() };
            let script = parse_script_output(&final_text);
            info!("Generation complete: {} shots", script.shot_count());

            yield GenerationEvent::Completed(Box::new(GenerationOutput {
                references,
                draft,
                review_feedback,
                final_text,
                script,
                phases: tracker.board.entries(),
            }));
        })
    }

    /// Drain a run without a consumer. When review or refine fails the
    /// draft is used instead.
    pub async fn generate_simple(
        &self,
        input: GenerationInput,
        use_rag: bool,
        use_review: bool,
    ) -> Result<ScriptOutput, GenerationError> {
        let mut events = self.run(input, RunOptions { use_rag, use_review });
        let mut draft = String::new();

        while let Some(event) = events.next().await {
            match event {
                GenerationEvent::Chunk(chunk) => {
                    if chunk.phase == PipelinePhase::Draft {
                        draft.push_str(&chunk.text);
                    }
                }
                GenerationEvent::Completed(output) => return Ok(output.script),
                GenerationEvent::Failed(error) => {
                    return match error.phase() {
                        Some(PipelinePhase::Review | PipelinePhase::Refine) => {
                            warn!("{}; falling back to the draft", error);
                            Ok(parse_script_output(&draft))
                        }
                        _ => Err(error),
                    };
                }
            }
        }

        Ok(parse_script_output(&draft))
    }

    /// One completion with the quick template: no retrieval, no review
    pub async fn generate_quick(&self, input: GenerationInput) -> Result<ScriptOutput, GenerationError> {
        input.validate()?;
        let prompt = self
            .prompts
            .quick(&input)
            .map_err(|source| GenerationError::Prompt {
                phase: PipelinePhase::Draft,
                source,
            })?;

        let text = self
            .generator
            .complete(&prompt)
            .await
            .map_err(|source| GenerationError::Transport {
                phase: PipelinePhase::Draft,
                source,
            })?;

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyDraft);
        }
        Ok(parse_script_output(&text))
    }

    /// Reference lookup; failures degrade to no references
    async fn retrieve(&self, input: &GenerationInput) -> Vec<String> {
        match self
            .store
            .search(&input.search_query(), input.category(), self.config.top_k)
            .await
        {
            Ok(references) => references,
            Err(e) => {
                warn!("Reference retrieval failed, continuing without references: {}", e);
                Vec::new()
            }
        }
    }

    /// Category, theme and gameplay traits; failures degrade to the
    /// generic traits
    async fn traits(&self, input: &GenerationInput) -> String {
        match self
            .store
            .comprehensive_traits(input.category(), input.theme(), input.gameplay())
            .await
        {
            Ok(traits) => {
                debug!(
                    "Review traits for [{}] theme={:?} gameplay={:?}",
                    input.category(),
                    input.theme(),
                    input.gameplay()
                );
                traits
            }
            Err(e) => {
                warn!("Traits lookup failed, using generic traits: {}", e);
                DEFAULT_TRAITS.to_string()
            }
        }
    }
}

/// Render references as numbered sections
pub fn format_references(references: &[String]) -> String {
    if references.is_empty() {
        return NO_REFERENCES.to_string();
    }

    references
        .iter()
        .enumerate()
        .map(|(i, content)| format!("### 参考脚本 {}\n{}\n", i + 1, content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn running_detail(phase: PipelinePhase) -> &'static str {
    match phase {
        PipelinePhase::Retrieval => "正在检索同品类参考脚本...",
        PipelinePhase::Draft => "正在生成脚本初稿...",
        PipelinePhase::Review => "正在评审脚本...",
        PipelinePhase::Refine => "正在根据评审意见修正脚本...",
    }
}

/// Phase board of one run, mirrored to the observer
struct PhaseTracker {
    board: PhaseBoard,
    observer: Option<StepObserver>,
}

impl PhaseTracker {
    fn new(observer: Option<StepObserver>) -> Self {
        Self {
            board: PhaseBoard::default(),
            observer,
        }
    }

    fn update(&mut self, phase: PipelinePhase, status: PhaseStatus, detail: impl Into<String>) {
        self.board.set(phase, status);
        if let Some(observer) = &self.observer {
            observer(&GenerationStep::new(phase, status, detail));
        }
    }
}
