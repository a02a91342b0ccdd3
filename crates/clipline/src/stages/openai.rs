//! Highlight selection with the OpenAI API: Whisper transcription followed
//! by a chat completion that returns the segment as JSON.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{Analyzer, Highlight, MediaHandle};
use crate::error::StageFailure;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4";

const SYSTEM_PROMPT: &str = "You are a viral content editor. Find the funniest or most \
interesting 15-30 second segment in this text. Return JSON format: \
{\"start\": seconds, \"end\": seconds, \"summary\": \"reason\"}";

#[derive(Debug, Clone)]
pub struct OpenAiModels {
    pub base_url: String,
    pub transcription_model: String,
    pub chat_model: String,
}

impl Default for OpenAiModels {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
        }
    }
}

pub struct OpenAiAnalyzer {
    client: reqwest::Client,
    api_key: SecretString,
    models: OpenAiModels,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl OpenAiAnalyzer {
    pub fn new(client: reqwest::Client, api_key: SecretString, models: OpenAiModels) -> Self {
        Self {
            client,
            api_key,
            models,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.models.base_url.trim_end_matches('/'), path)
    }

    async fn transcribe(&self, media: &MediaHandle) -> Result<String, StageFailure> {
        let bytes = tokio::fs::read(&media.path)
            .await
            .map_err(|e| StageFailure::Io {
                path: media.path.clone(),
                source: e,
            })?;
        let file_name = media
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.mp3".to_string());
        let part = Part::bytes(bytes).file_name(file_name).mime_str("audio/mpeg")?;
        let form = Form::new()
            .text("model", self.models.transcription_model.clone())
            .part("file", part);

        let response = self
            .client
            .post(self.endpoint("audio/transcriptions"))
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await?;
        let body: TranscriptionResponse = checked_json(response).await?;
        debug!(chars = body.text.len(), "Transcription received");
        Ok(body.text)
    }

    async fn pick_highlight(&self, transcript: &str) -> Result<Highlight, StageFailure> {
        let request = json!({
            "model": self.models.chat_model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": transcript },
            ],
            "response_format": { "type": "json_object" },
        });

        let response = self
            .client
            .post(self.endpoint("chat/completions"))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;
        let body: ChatResponse = checked_json(response).await?;
        parse_highlight(body)
    }
}

async fn checked_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, StageFailure> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(%status, body = %body, "OpenAI request rejected");
        return Err(StageFailure::InvalidResponse(format!(
            "OpenAI returned {}",
            status
        )));
    }
    Ok(response.json::<T>().await?)
}

fn parse_highlight(body: ChatResponse) -> Result<Highlight, StageFailure> {
    let content = body
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| StageFailure::InvalidResponse("completion has no content".to_string()))?;
    serde_json::from_str::<Highlight>(&content).map_err(|e| {
        StageFailure::InvalidResponse(format!("completion is not a segment ({}): {}", e, content))
    })
}

#[async_trait]
impl Analyzer for OpenAiAnalyzer {
    async fn analyze(&self, media: &MediaHandle) -> Result<Highlight, StageFailure> {
        let transcript = self.transcribe(media).await?;
        if transcript.trim().is_empty() {
            return Err(StageFailure::InvalidResponse(
                "transcription is empty".to_string(),
            ));
        }
        let highlight = self.pick_highlight(&transcript).await?;
        info!(
            start = highlight.start,
            end = highlight.end,
            summary = %highlight.summary,
            "Highlight selected"
        );
        Ok(highlight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(content: Option<&str>) -> ChatResponse {
        ChatResponse {
            choices: vec![ChatChoice {
                message: ChatMessage {
                    content: content.map(str::to_string),
                },
            }],
        }
    }

    #[test]
    fn test_parse_highlight() {
        let h = parse_highlight(chat(Some(
            r#"{"start": 12, "end": 34.5, "summary": "the reveal"}"#,
        )))
        .unwrap();
        assert_eq!(h.start, 12.0);
        assert_eq!(h.end, 34.5);
        assert_eq!(h.summary, "the reveal");
    }

    #[test]
    fn test_parse_highlight_rejects_prose() {
        let err = parse_highlight(chat(Some("The best part is at one minute."))).unwrap_err();
        assert!(matches!(err, StageFailure::InvalidResponse(_)));
    }

    #[test]
    fn test_parse_highlight_rejects_empty_choices() {
        assert!(parse_highlight(ChatResponse { choices: vec![] }).is_err());
        assert!(parse_highlight(chat(None)).is_err());
    }

    #[test]
    fn test_chat_response_deserializes_api_shape() {
        let raw = r#"{
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "{\"start\":1,\"end\":20}"}}]
        }"#;
        let body: ChatResponse = serde_json::from_str(raw).unwrap();
        let h = parse_highlight(body).unwrap();
        assert_eq!(h.end, 20.0);
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let analyzer = OpenAiAnalyzer::new(
            reqwest::Client::new(),
            SecretString::from("sk-test"),
            OpenAiModels {
                base_url: "http://localhost:8080/v1/".to_string(),
                ..OpenAiModels::default()
            },
        );
        assert_eq!(
            analyzer.endpoint("chat/completions"),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn test_default_models() {
        let models = OpenAiModels::default();
        assert_eq!(models.chat_model, "gpt-4");
        assert_eq!(models.transcription_model, "whisper-1");
    }
}
