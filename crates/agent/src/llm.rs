use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use concierge_core::config::{LlmConfig, LlmProvider};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Opaque text-completion capability. Prompt in, text out.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint
/// (OpenAI, Ollama, Hugging Face router).
#[derive(Clone)]
pub struct HttpCompletionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    provider: LlmProvider,
}

impl HttpCompletionClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("failed to build completion HTTP client")?;
        let endpoint =
            format!("{}/chat/completions", config.resolved_base_url().trim_end_matches('/'));

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.as_ref().map(|key| key.expose_secret().to_string()),
            model: config.model.clone(),
            provider: config.provider,
        })
    }
}

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl LlmClient for HttpCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let body = ChatCompletionBody {
            model: &self.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let mut builder = self.client.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        debug!(
            event_name = "llm.request.sent",
            provider = ?self.provider,
            model = %self.model,
            messages = request.messages.len(),
            "sending completion request"
        );
        let response = builder.send().await.context("completion request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("completion endpoint returned {status}: {detail}"));
        }

        let parsed: ChatCompletionResponse =
            response.json().await.context("completion response was not valid JSON")?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| anyhow!("completion endpoint returned no content"))
    }
}

#[cfg(test)]
mod tests {
    use super::{ChatCompletionBody, ChatMessage, ChatRole};

    #[test]
    fn request_body_uses_openai_wire_names() {
        let messages = vec![ChatMessage::system("plan"), ChatMessage::user("hi")];
        let body = ChatCompletionBody {
            model: "llama3.1",
            messages: &messages,
            max_tokens: 256,
            temperature: 0.0,
        };

        let json = serde_json::to_value(&body).expect("serialize body");

        assert_eq!(json["model"], "llama3.1");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["max_tokens"], 256);
    }

    #[test]
    fn roles_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&ChatRole::Assistant).expect("serialize role"),
            "\"assistant\""
        );
    }
}
