use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::{self, Stream};

use crate::error::TransportError;

/// Lazy, finite, non-restartable sequence of text fragments
pub type FragmentStream<'a> = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send + 'a>>;

/// A language-model collaborator.
///
/// Implementations own transport concerns (auth, retries, timeouts); the
/// pipeline only asks for a full completion or a fragment stream.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier for logging
    fn name(&self) -> &str;

    /// Single blocking full-text response
    async fn complete(&self, prompt: &str) -> Result<String, TransportError>;

    /// Incremental response; exhausted once no further fragments arrive
    fn stream<'a>(&'a self, prompt: &'a str) -> FragmentStream<'a>;
}

/// Deliver a model response as fragments, either streamed or as one
/// fragment holding the full completion.
pub fn deliver<'a>(model: &'a dyn LanguageModel, prompt: &'a str, streamed: bool) -> FragmentStream<'a> {
    if streamed {
        model.stream(prompt)
    } else {
        Box::pin(stream::once(model.complete(prompt)))
    }
}
