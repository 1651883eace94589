use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::Stream;
use serde::Deserialize;

use crate::error::TransportError;

/// Adapter turning a chat-completions SSE byte stream into text deltas.
///
/// Partial lines are buffered across byte chunks; `event:`/`id:` lines and
/// empty deltas are skipped; `data: [DONE]` ends the stream.
pub struct SseDeltaStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    buffer: String,
    /// Bytes of a UTF-8 sequence split across chunks
    pending: Vec<u8>,
    done: bool,
}

impl SseDeltaStream {
    pub fn new(byte_stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            buffer: String::new(),
            pending: Vec::new(),
            done: false,
        }
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.pending.extend_from_slice(bytes);
        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                self.buffer.push_str(text);
                self.pending.clear();
                Ok(())
            }
            // Incomplete trailing sequence: keep it until the next chunk
            Err(e) if e.error_len().is_none() => {
                let valid = e.valid_up_to();
                let text = std::str::from_utf8(&self.pending[..valid])
                    .map_err(|e| TransportError::Parse(format!("Invalid UTF-8 in stream: {}", e)))?;
                self.buffer.push_str(text);
                self.pending.drain(..valid);
                Ok(())
            }
            Err(e) => Err(TransportError::Parse(format!("Invalid UTF-8 in stream: {}", e))),
        }
    }
}

impl Stream for SseDeltaStream {
    type Item = Result<String, TransportError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if this.done {
                return Poll::Ready(None);
            }

            match next_event(&mut this.buffer) {
                Some(SseEvent::Delta(delta)) => return Poll::Ready(Some(Ok(delta))),
                Some(SseEvent::Done) => {
                    this.done = true;
                    return Poll::Ready(None);
                }
                Some(SseEvent::Invalid(e)) => return Poll::Ready(Some(Err(e))),
                None => {}
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    if let Err(e) = this.push_bytes(&bytes) {
                        this.done = true;
                        return Poll::Ready(Some(Err(e)));
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(TransportError::Network(e.to_string()))));
                }
                Poll::Ready(None) => {
                    this.done = true;
                    // A final data line may arrive without a trailing newline
                    if !this.buffer.trim().is_empty() {
                        this.buffer.push('\n');
                        match next_event(&mut this.buffer) {
                            Some(SseEvent::Delta(delta)) => return Poll::Ready(Some(Ok(delta))),
                            Some(SseEvent::Invalid(e)) => return Poll::Ready(Some(Err(e))),
                            _ => {}
                        }
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

enum SseEvent {
    Delta(String),
    Done,
    Invalid(TransportError),
}

#[derive(Debug, Deserialize)]
struct StreamChunkRaw {
    #[serde(default)]
    choices: Vec<StreamChoiceRaw>,
}

#[derive(Debug, Deserialize)]
struct StreamChoiceRaw {
    delta: DeltaRaw,
}

#[derive(Debug, Deserialize)]
struct DeltaRaw {
    #[serde(default)]
    content: Option<String>,
}

/// Pull the next meaningful event out of complete lines in the buffer
fn next_event(buffer: &mut String) -> Option<SseEvent> {
    loop {
        let newline = buffer.find('\n')?;
        let line = buffer[..newline].trim().to_string();
        buffer.drain(..=newline);

        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();

        if data == "[DONE]" {
            return Some(SseEvent::Done);
        }

        match serde_json::from_str::<StreamChunkRaw>(data) {
            Ok(raw) => {
                let delta = raw
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta.content)
                    .unwrap_or_default();
                if !delta.is_empty() {
                    return Some(SseEvent::Delta(delta));
                }
            }
            Err(e) => {
                let preview: String = data.chars().take(200).collect();
                return Some(SseEvent::Invalid(TransportError::Parse(format!(
                    "Failed to parse stream chunk: {} (data: {})",
                    e, preview
                ))));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    fn sse(chunks: &[&str]) -> SseDeltaStream {
        let items: Vec<Result<Bytes, reqwest::Error>> = chunks
            .iter()
            .map(|c| Ok(Bytes::from(c.to_string())))
            .collect();
        SseDeltaStream::new(futures::stream::iter(items))
    }

    async fn collect_ok(stream: SseDeltaStream) -> Vec<String> {
        stream.map(|item| item.unwrap()).collect().await
    }

    #[tokio::test]
    async fn test_parses_deltas_until_done() {
        let stream = sse(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        ]);

        assert_eq!(collect_ok(stream).await, vec!["Hello", " world"]);
    }

    #[tokio::test]
    async fn test_line_split_across_chunks() {
        let stream = sse(&[
            "data: {\"choices\":[{\"delta\":",
            "{\"content\":\"角色A\"}}]}\n\ndata: [DONE]\n",
        ]);

        assert_eq!(collect_ok(stream).await, vec!["角色A"]);
    }

    #[tokio::test]
    async fn test_multibyte_char_split_across_chunks() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"判词\"}}]}\n";
        let bytes = line.as_bytes();
        let split = line.find('判').unwrap() + 1;
        let items: Vec<Result<Bytes, reqwest::Error>> = vec![
            Ok(Bytes::copy_from_slice(&bytes[..split])),
            Ok(Bytes::copy_from_slice(&bytes[split..])),
        ];

        let stream = SseDeltaStream::new(futures::stream::iter(items));
        assert_eq!(collect_ok(stream).await, vec!["判词"]);
    }

    #[tokio::test]
    async fn test_skips_empty_deltas_and_comment_lines() {
        let stream = sse(&[
            ": keep-alive\n",
            "event: message\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n",
            "data: [DONE]\n",
        ]);

        assert_eq!(collect_ok(stream).await, vec!["x"]);
    }

    #[tokio::test]
    async fn test_final_line_without_newline() {
        let stream = sse(&["data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}"]);
        assert_eq!(collect_ok(stream).await, vec!["tail"]);
    }

    #[tokio::test]
    async fn test_malformed_chunk_is_parse_error() {
        let mut stream = sse(&["data: {not json}\n"]);
        let item = stream.next().await.unwrap();
        assert!(matches!(item, Err(TransportError::Parse(_))));
    }
}
