//! Server-sent-event text streaming
//!
//! Frames look like `data: {"content": "...", "done": false}`. Data lines
//! that are not JSON are treated as plain text content.

use crate::errors::{HubError, HubResult};
use crate::workflow::cancellation::CancellationToken;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// One `data:` frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamFrame {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl StreamFrame {
    pub fn chunk(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn finished(metadata: Option<Value>) -> Self {
        Self {
            done: true,
            metadata,
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            done: true,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Parse one SSE line; `None` for blank lines, comments and non-data fields
pub fn parse_data_line(line: &str) -> Option<StreamFrame> {
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(StreamFrame::finished(None));
    }
    match serde_json::from_str::<StreamFrame>(data) {
        Ok(frame) => Some(frame),
        Err(_) => Some(StreamFrame::chunk(data)),
    }
}

/// Accumulated result of a finished stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamOutcome {
    pub content: String,
    pub metadata: Option<Value>,
}

/// Consumes SSE text streams with a time budget
#[derive(Debug, Clone)]
pub struct TextStreamer {
    client: Client,
    timeout: Duration,
}

impl TextStreamer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// POST `body` to `url` and accumulate the streamed content.
    ///
    /// `on_chunk` sees every non-empty chunk as it arrives. On timeout or
    /// cancellation the partial content is dropped and an error returned.
    pub async fn stream<F>(
        &self,
        url: &str,
        body: &Value,
        token: &CancellationToken,
        mut on_chunk: F,
    ) -> HubResult<StreamOutcome>
    where
        F: FnMut(&str) + Send,
    {
        let work = async {
            let response = self
                .client
                .post(url)
                .header(ACCEPT, "text/event-stream")
                .json(body)
                .send()
                .await
                .map_err(|e| HubError::Upstream(format!("stream request failed: {}", e)))?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(HubError::Upstream(format!(
                    "stream returned HTTP {}: {}",
                    status.as_u16(),
                    text.trim()
                )));
            }

            let mut outcome = StreamOutcome::default();
            let mut pending: Vec<u8> = Vec::new();
            let mut bytes = response.bytes_stream();
            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| HubError::Upstream(format!("stream broken: {}", e)))?;
                pending.extend_from_slice(&chunk);

                while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                    let line_bytes: Vec<u8> = pending.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line_bytes);
                    let Some(frame) = parse_data_line(line.trim_end_matches(['\r', '\n'])) else {
                        continue;
                    };
                    if apply_frame(&mut outcome, frame, &mut on_chunk)? {
                        return Ok(outcome);
                    }
                }
            }

            // stream closed without a done frame; keep a trailing unterminated line
            let tail = String::from_utf8_lossy(&pending).to_string();
            if let Some(frame) = parse_data_line(tail.trim_end()) {
                apply_frame(&mut outcome, frame, &mut on_chunk)?;
            }
            Ok(outcome)
        };

        let budget = self.timeout;
        tokio::select! {
            _ = token.cancelled() => Err(HubError::Cancelled(
                token.reason().unwrap_or_else(|| "stream cancelled".to_string()),
            )),
            result = tokio::time::timeout(budget, work) => match result {
                Ok(outcome) => outcome,
                Err(_) => Err(HubError::Timeout(budget.as_millis() as u64)),
            },
        }
    }
}

/// Fold a frame into the outcome; `true` once the stream is done
fn apply_frame<F>(outcome: &mut StreamOutcome, frame: StreamFrame, on_chunk: &mut F) -> HubResult<bool>
where
    F: FnMut(&str),
{
    if let Some(error) = frame.error {
        return Err(HubError::Upstream(error));
    }
    if !frame.content.is_empty() {
        on_chunk(&frame.content);
        outcome.content.push_str(&frame.content);
    }
    if frame.metadata.is_some() {
        outcome.metadata = frame.metadata;
    }
    Ok(frame.done)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_frame() {
        let frame = parse_data_line(r#"data: {"content":"abc","done":false}"#).unwrap();
        assert_eq!(frame, StreamFrame::chunk("abc"));
    }

    #[test]
    fn test_parse_plain_text_and_ignored_lines() {
        assert_eq!(
            parse_data_line("data: hello world"),
            Some(StreamFrame::chunk("hello world"))
        );
        assert_eq!(parse_data_line(""), None);
        assert_eq!(parse_data_line(": keep-alive"), None);
        assert_eq!(parse_data_line("event: message"), None);
        assert!(parse_data_line("data: [DONE]").unwrap().done);
    }

    #[test]
    fn test_error_frame_fails() {
        let mut outcome = StreamOutcome::default();
        let mut seen = Vec::new();
        let frame = parse_data_line(r#"data: {"error":"Stream error","done":true}"#).unwrap();
        let err = apply_frame(&mut outcome, frame, &mut |c: &str| seen.push(c.to_string()))
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Upstream);
        assert!(seen.is_empty());
    }
}
