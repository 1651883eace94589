//! Scripted collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;

use crate::error::{StoreError, TransportError};
use crate::io::{KnowledgeBase, DEFAULT_TRAITS};
use crate::llm::{FragmentStream, LanguageModel};
use crate::models::{Category, StructuredRecord};

type Response = Vec<Result<String, TransportError>>;

/// Model double that replays queued responses, one per call, and records
/// every prompt it receives. An exhausted queue answers with an API error.
pub struct ScriptedModel {
    name: String,
    responses: Mutex<VecDeque<Response>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            responses: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue a response delivered as these fragments
    pub fn with_stream(self, fragments: Vec<&str>) -> Self {
        self.push(fragments.into_iter().map(|f| Ok(f.to_string())).collect())
    }

    /// Queue a response delivered as one piece
    pub fn with_completion(self, text: &str) -> Self {
        self.push(vec![Ok(text.to_string())])
    }

    /// Queue a call that fails outright
    pub fn with_failure(self, error: TransportError) -> Self {
        self.push(vec![Err(error)])
    }

    /// Queue a stream that breaks after some fragments
    pub fn with_broken_stream(self, fragments: Vec<&str>, error: TransportError) -> Self {
        let mut response: Response = fragments.into_iter().map(|f| Ok(f.to_string())).collect();
        response.push(Err(error));
        self.push(response)
    }

    fn push(self, response: Response) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    fn next_response(&self, prompt: &str) -> Response {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![Err(TransportError::Api("no scripted response left".to_string()))])
    }

    /// Every prompt received, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, prompt: &str) -> Result<String, TransportError> {
        let mut text = String::new();
        for fragment in self.next_response(prompt) {
            text.push_str(&fragment?);
        }
        Ok(text)
    }

    fn stream<'a>(&'a self, prompt: &'a str) -> FragmentStream<'a> {
        Box::pin(stream::iter(self.next_response(prompt)))
    }
}

/// In-memory knowledge base with switchable failures
#[derive(Default)]
pub struct MemoryKnowledgeBase {
    pub references: Vec<String>,
    pub traits: Option<String>,
    pub fail_search: bool,
    pub fail_traits: bool,
    pub fail_write: bool,
    pub searches: Mutex<Vec<(String, Category, usize)>>,
    pub trait_lookups: Mutex<Vec<Category>>,
    pub written: Mutex<Vec<(StructuredRecord, String, Category)>>,
}

impl MemoryKnowledgeBase {
    pub fn with_references(references: Vec<&str>) -> Self {
        Self {
            references: references.into_iter().map(str::to_string).collect(),
            ..Default::default()
        }
    }

    fn unavailable() -> StoreError {
        StoreError::Io(std::io::Error::other("store unavailable"))
    }
}

#[async_trait]
impl KnowledgeBase for MemoryKnowledgeBase {
    async fn search(&self, query: &str, category: Category, top_k: usize) -> Result<Vec<String>, StoreError> {
        self.searches
            .lock()
            .unwrap()
            .push((query.to_string(), category, top_k));
        if self.fail_search {
            return Err(Self::unavailable());
        }
        Ok(self.references.iter().take(top_k).cloned().collect())
    }

    async fn traits_for(&self, category: Category) -> Result<String, StoreError> {
        self.trait_lookups.lock().unwrap().push(category);
        if self.fail_traits {
            return Err(Self::unavailable());
        }
        Ok(self.traits.clone().unwrap_or_else(|| DEFAULT_TRAITS.to_string()))
    }

    async fn write(&self, record: &StructuredRecord, content: &str, category: Category) -> Result<String, StoreError> {
        if self.fail_write {
            return Err(Self::unavailable());
        }
        let mut written = self.written.lock().unwrap();
        written.push((record.clone(), content.to_string(), category));
        Ok(format!("mem-{}", written.len()))
    }
}
