//! OpenAI 호환 채팅 완성 클라이언트
//!
//! `POST {base_url}/chat/completions`. 스트리밍은 SSE(`data: ...` 줄)로
//! 받으며, 청크 경계가 줄 중간에 걸려도 버퍼에 모아 완전한 줄만 처리합니다.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, ChatModel, TokenStream};
use crate::config::{get_api_key, Settings};
use crate::embedding::ApiError;

/// 샘플링 온도
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// OpenAI 채팅 모델
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiChat {
    /// # Arguments
    /// * `api_key` - OpenAI API 키
    /// * `model` - 채팅 모델 (예: gpt-3.5-turbo-0125)
    /// * `base_url` - API 주소
    pub fn new(api_key: String, model: &str, base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// 설정과 `OPENAI_API_KEY`로 생성
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(get_api_key()?, &settings.chat_model, &settings.openai_base_url)
    }

    async fn send(&self, messages: &[ChatMessage], stream: bool) -> Result<reqwest::Response> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature: DEFAULT_TEMPERATURE,
            stream,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send chat request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if let Ok(error) = serde_json::from_str::<ApiError>(&body) {
                anyhow::bail!("OpenAI API error ({}): {}", status, error.error.message);
            }
            anyhow::bail!("OpenAI API error ({}): {}", status, body);
        }

        Ok(response)
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

// ============================================================================
// SSE Parsing
// ============================================================================

/// SSE 이벤트
#[derive(Debug, Clone, PartialEq, Eq)]
enum SseEvent {
    Data(String),
    Done,
}

/// 바이트 청크를 줄 단위 SSE 이벤트로 변환
#[derive(Debug, Default)]
struct SseBuffer {
    pending: Vec<u8>,
}

impl SseBuffer {
    /// 청크를 추가하고 완성된 줄의 이벤트를 반환
    fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();

            // 주석(:keep-alive)과 event:/id: 필드는 무시
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim_start();

            if data == "[DONE]" {
                events.push(SseEvent::Done);
            } else if !data.is_empty() {
                events.push(SseEvent::Data(data.to_string()));
            }
        }
        events
    }
}

/// 스트림 청크에서 답변 조각 추출 (내용 없는 델타는 None)
fn delta_content(data: &str) -> Result<Option<String>> {
    let chunk: StreamChunk =
        serde_json::from_str(data).with_context(|| format!("Invalid stream chunk: {}", data))?;

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|c| !c.is_empty()))
}

// ============================================================================
// ChatModel
// ============================================================================

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let response = self.send(messages, false).await?;
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        let completion: CompletionResponse =
            serde_json::from_str(&body).context("Failed to parse chat response")?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("Chat response has no content"))
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<TokenStream> {
        let response = self.send(messages, true).await?;
        let mut bytes = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer = SseBuffer::default();

            'read: while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err::<String, anyhow::Error>(
                            anyhow::anyhow!("Stream interrupted: {}", e),
                        );
                        break 'read;
                    }
                };

                for event in buffer.push(&chunk) {
                    match event {
                        SseEvent::Done => break 'read,
                        SseEvent::Data(data) => match delta_content(&data) {
                            Ok(Some(token)) => {
                                yield Ok(token);
                            }
                            Ok(None) => {}
                            Err(e) => {
                                yield Err(e);
                                break 'read;
                            }
                        },
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_buffer_handles_split_lines() {
        let mut buffer = SseBuffer::default();

        let first = buffer.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel");
        assert!(first.is_empty());

        let second = buffer.push(
            b"lo\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\ndata: [DONE]\n",
        );
        assert_eq!(second.len(), 3);
        assert_eq!(second[2], SseEvent::Done);

        let tokens: Vec<String> = second
            .iter()
            .filter_map(|e| match e {
                SseEvent::Data(d) => delta_content(d).unwrap(),
                SseEvent::Done => None,
            })
            .collect();
        assert_eq!(tokens, vec!["Hello".to_string(), " world".to_string()]);
    }

    #[test]
    fn test_sse_buffer_ignores_comments_and_crlf() {
        let mut buffer = SseBuffer::default();
        let events = buffer.push(b": keep-alive\r\nevent: message\r\ndata: [DONE]\r\n");
        assert_eq!(events, vec![SseEvent::Done]);
    }

    #[test]
    fn test_delta_content_skips_role_only_chunks() {
        let role_only = r#"{"choices":[{"delta":{"role":"assistant"},"index":0}]}"#;
        assert_eq!(delta_content(role_only).unwrap(), None);

        let finish = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(delta_content(finish).unwrap(), None);

        assert!(delta_content("not json").is_err());
    }
}
