//! Request plumbing shared by the hosted backends.

use std::collections::VecDeque;
use std::time::Duration;

use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde_json::Value;

use crate::error::{DocQaError, Result};
use crate::ports::GenerationRequest;
use crate::ports::generate::SYSTEM_PROMPT;

pub const TEMPERATURE: f32 = 0.3;
pub const MAX_TOKENS: u32 = 1000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const ERROR_BODY_LIMIT: usize = 500;

/// Wraps an upstream failure into the error kind of the calling port.
pub type ErrorKind = fn(String) -> DocQaError;

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Sends `request` and decodes a JSON body, turning transport failures and
/// non-2xx statuses into `kind` errors.
pub async fn send_json(
    request: reqwest::RequestBuilder,
    provider: &str,
    kind: ErrorKind,
) -> Result<Value> {
    let response = send(request, provider, kind).await?;
    response
        .json()
        .await
        .map_err(|e| kind(format!("{provider} returned an unreadable response: {e}")))
}

pub async fn send(
    request: reqwest::RequestBuilder,
    provider: &str,
    kind: ErrorKind,
) -> Result<reqwest::Response> {
    let response = request
        .send()
        .await
        .map_err(|e| kind(format!("{provider} connection failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let body: String = body.chars().take(ERROR_BODY_LIMIT).collect();
        return Err(kind(format!("{provider} API error {status}: {body}")));
    }
    Ok(response)
}

/// History followed by the context-bearing user turn, in chat-completion shape.
pub fn conversation(request: &GenerationRequest<'_>) -> Vec<Value> {
    request
        .history
        .iter()
        .map(|m| message(m.role.as_str(), &m.content))
        .chain(std::iter::once(message("user", &request.user_message())))
        .collect()
}

pub fn message(role: &str, content: &str) -> Value {
    serde_json::json!({ "role": role, "content": content })
}

pub fn with_system(mut messages: Vec<Value>) -> Vec<Value> {
    messages.insert(0, message("system", SYSTEM_PROMPT));
    messages
}

/// Outcome of parsing one line of a streamed response body.
#[derive(Debug, PartialEq, Eq)]
pub enum LineEvent {
    Fragment(String),
    Skip,
    Done,
    Error(String),
}

/// Turns a chunked response body into answer fragments, one `parse` call per line.
pub fn fragments<S, B>(
    body: S,
    parse: fn(&str) -> LineEvent,
    kind: ErrorKind,
) -> BoxStream<'static, Result<String>>
where
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let reader = LineReader {
        body: body.boxed(),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(reader, move |mut reader| async move {
        loop {
            if let Some(item) = reader.pending.pop_front() {
                return Some((item, reader));
            }
            if reader.finished {
                return None;
            }
            match reader.body.next().await {
                Some(Ok(bytes)) => {
                    reader.buffer.extend_from_slice(bytes.as_ref());
                    reader.drain_lines(parse, kind);
                }
                Some(Err(e)) => {
                    reader.finished = true;
                    reader
                        .pending
                        .push_back(Err(kind(format!("stream interrupted: {e}"))));
                }
                None => {
                    reader.buffer.push(b'\n');
                    reader.drain_lines(parse, kind);
                    reader.finished = true;
                }
            }
        }
    })
    .boxed()
}

struct LineReader<B> {
    body: BoxStream<'static, reqwest::Result<B>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String>>,
    finished: bool,
}

impl<B> LineReader<B> {
    fn drain_lines(&mut self, parse: fn(&str) -> LineEvent, kind: ErrorKind) {
        while !self.finished {
            let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);

            match parse(line.trim_end_matches(['\r', '\n'])) {
                LineEvent::Fragment(text) if !text.is_empty() => self.pending.push_back(Ok(text)),
                LineEvent::Fragment(_) | LineEvent::Skip => {}
                LineEvent::Done => self.finished = true,
                LineEvent::Error(message) => {
                    self.finished = true;
                    self.pending.push_back(Err(kind(message)));
                }
            }
        }
    }
}

/// Sends a streaming chat request and yields its parsed fragments.
pub fn stream_answer(
    request: reqwest::RequestBuilder,
    provider: &'static str,
    parse: fn(&str) -> LineEvent,
) -> BoxStream<'static, Result<String>> {
    stream::once(send(request, provider, DocQaError::Generation))
        .flat_map(move |response| match response {
            Ok(response) => fragments(response.bytes_stream(), parse, DocQaError::Generation),
            Err(e) => stream::once(async move { Err::<String, _>(e) }).boxed(),
        })
        .boxed()
}

/// Payload of an SSE `data:` line, `None` for comments, event names and blanks.
pub fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}
