use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{ExtractionError, InputError};
use crate::io::KnowledgeBase;
use crate::llm::{extract_with_tier, normalize, LanguageModel, PromptLibrary};
use crate::models::IngestResult;

/// Turns free-form ad copy into a stored, tagged record
pub struct Ingestor {
    model: Arc<dyn LanguageModel>,
    store: Arc<dyn KnowledgeBase>,
    prompts: PromptLibrary,
}

impl Ingestor {
    pub fn new(model: Arc<dyn LanguageModel>, store: Arc<dyn KnowledgeBase>) -> Self {
        Self {
            model,
            store,
            prompts: PromptLibrary::default(),
        }
    }

    pub fn with_prompts(mut self, prompts: PromptLibrary) -> Self {
        self.prompts = prompts;
        self
    }

    /// Tag `raw_text` with one completion call and archive it under the
    /// extracted category.
    ///
    /// Never returns an error: every failure becomes a non-success result.
    /// Parse failures carry the offending model response.
    pub async fn auto_ingest(&self, raw_text: &str) -> IngestResult {
        if raw_text.trim().is_empty() {
            return IngestResult::failed(InputError::Blank("raw_text").to_string(), None);
        }

        let prompt = match self.prompts.auto_tagging(raw_text) {
            Ok(prompt) => prompt,
            Err(e) => return IngestResult::failed(e.to_string(), None),
        };

        debug!("Requesting tags from {}", self.model.name());
        let response = match self.model.complete(&prompt).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Tagging call failed: {}", e);
                return IngestResult::failed(format!("AI 调用失败: {}", e), None);
            }
        };

        let parsed = match extract_with_tier(&response) {
            Ok((parsed, tier)) => {
                debug!("Tag response parsed ({:?})", tier);
                parsed
            }
            Err(e) => {
                warn!("Tag response unusable: {}", e);
                let message = match &e {
                    ExtractionError::EmptyResponse => "AI 返回了空响应".to_string(),
                    ExtractionError::Unparseable { .. } => format!("无法解析 AI 响应: {}", e),
                };
                return IngestResult::failed(message, Some(response));
            }
        };

        let record = normalize(&parsed);
        let category = record.category;

        match self.store.write(&record, raw_text, category).await {
            Ok(id) => {
                info!("Archived '{}' as {} under [{}]", record.subject_name, id, category);
                IngestResult::archived(id, record)
            }
            Err(e) => {
                warn!("Archiving failed: {}", e);
                IngestResult::failed(format!("保存失败: {}", e), None)
            }
        }
    }
}
