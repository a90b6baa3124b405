//! HTTP backends that turn a rendered prompt into raw response text.
//!
//! Two wire formats are supported: OpenAI-compatible chat completions and
//! the Anthropic Messages API. They differ only in request shape, auth
//! header, and where the answer text sits in the response; the HTTP round
//! trip is shared. Dispatch is an enum because async methods are not
//! dyn-compatible.

use reqwest::RequestBuilder;
use serde_json::{Value, json};

use crate::config::{BackendType, LlmBackendConfig};
use crate::error::ReasonerError;
use crate::prompt::RenderedPrompt;

/// Sampling temperature for every call.
const TEMPERATURE: f64 = 0.7;

/// Upper bound on generated tokens per call.
const MAX_TOKENS: u32 = 1000;

/// Messages API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A configured LLM endpoint.
pub enum LlmBackend {
    /// OpenAI-compatible chat completions (`OpenAI`, Moonshot, `DeepSeek`, Ollama).
    OpenAi(Endpoint),
    /// Anthropic Messages API.
    Anthropic(Endpoint),
}

/// Where and as whom a backend sends its requests.
pub struct Endpoint {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl Endpoint {
    fn new(config: &LlmBackendConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.api_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(format!("{}/{path}", self.base_url))
    }
}

impl LlmBackend {
    /// Send `prompt` and return the model's answer text.
    ///
    /// # Errors
    ///
    /// Returns [`ReasonerError::LlmBackend`] on transport failure, a
    /// non-success status, or a response without answer text.
    pub async fn complete(&self, prompt: &RenderedPrompt) -> Result<String, ReasonerError> {
        let request = match self {
            Self::OpenAi(endpoint) => endpoint
                .post("chat/completions")
                .bearer_auth(&endpoint.api_key)
                .json(&openai_body(&endpoint.model, prompt)),
            Self::Anthropic(endpoint) => endpoint
                .post("messages")
                .header("x-api-key", &endpoint.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&anthropic_body(&endpoint.model, prompt)),
        };
        let response = send(request, self.name()).await?;
        self.answer_text(&response).ok_or_else(|| {
            ReasonerError::LlmBackend(format!("{} response carried no answer text", self.name()))
        })
    }

    /// Backend family, for logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::OpenAi(_) => "openai-compatible",
            Self::Anthropic(_) => "anthropic",
        }
    }

    fn answer_text(&self, response: &Value) -> Option<String> {
        let text = match self {
            Self::OpenAi(_) => response.pointer("/choices/0/message/content"),
            Self::Anthropic(_) => response.pointer("/content/0/text"),
        };
        text.and_then(Value::as_str).map(ToOwned::to_owned)
    }
}

fn openai_body(model: &str, prompt: &RenderedPrompt) -> Value {
    json!({
        "model": model,
        "messages": [
            { "role": "system", "content": prompt.system },
            { "role": "user", "content": prompt.user },
        ],
        "temperature": TEMPERATURE,
        "max_tokens": MAX_TOKENS,
        "response_format": { "type": "json_object" },
    })
}

fn anthropic_body(model: &str, prompt: &RenderedPrompt) -> Value {
    json!({
        "model": model,
        "system": prompt.system,
        "messages": [{ "role": "user", "content": prompt.user }],
        "temperature": TEMPERATURE,
        "max_tokens": MAX_TOKENS,
    })
}

/// Send the request and decode a successful JSON body.
async fn send(request: RequestBuilder, backend: &str) -> Result<Value, ReasonerError> {
    let response = request
        .send()
        .await
        .map_err(|e| ReasonerError::LlmBackend(format!("{backend} request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(ReasonerError::LlmBackend(format!(
            "{backend} returned {status}: {detail}"
        )));
    }

    response.json().await.map_err(|e| {
        ReasonerError::LlmBackend(format!("{backend} sent an unreadable body: {e}"))
    })
}

/// Build the backend described by `config`.
pub fn create_backend(config: &LlmBackendConfig) -> LlmBackend {
    let endpoint = Endpoint::new(config);
    match config.backend_type {
        BackendType::OpenAi => LlmBackend::OpenAi(endpoint),
        BackendType::Anthropic => LlmBackend::Anthropic(endpoint),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(backend_type: BackendType) -> LlmBackend {
        create_backend(&LlmBackendConfig {
            backend_type,
            api_url: "https://api.moonshot.cn/v1/".to_owned(),
            api_key: "test".to_owned(),
            model: "test-model".to_owned(),
        })
    }

    fn prompt() -> RenderedPrompt {
        RenderedPrompt {
            system: "You are Mira.".to_owned(),
            user: "Do you want to talk to Tomas?".to_owned(),
        }
    }

    #[test]
    fn openai_answer_is_first_choice() {
        let response = json!({
            "choices": [{ "message": { "content": "{\"should_initiate\": true}" } }]
        });
        let text = backend(BackendType::OpenAi).answer_text(&response);
        assert_eq!(text.as_deref(), Some("{\"should_initiate\": true}"));
    }

    #[test]
    fn anthropic_answer_is_first_content_block() {
        let response = json!({
            "content": [{ "type": "text", "text": "{\"memory\": \"Met Bo.\"}" }]
        });
        let text = backend(BackendType::Anthropic).answer_text(&response);
        assert_eq!(text.as_deref(), Some("{\"memory\": \"Met Bo.\"}"));
    }

    #[test]
    fn error_shaped_responses_have_no_answer() {
        let rate_limited = json!({ "error": "rate_limit" });
        assert!(backend(BackendType::OpenAi).answer_text(&rate_limited).is_none());
        let empty = json!({ "content": [] });
        assert!(backend(BackendType::Anthropic).answer_text(&empty).is_none());
    }

    #[test]
    fn request_bodies_match_each_wire_format() {
        let openai = openai_body("m", &prompt());
        assert_eq!(openai.pointer("/messages/0/role"), Some(&json!("system")));
        assert_eq!(openai.pointer("/response_format/type"), Some(&json!("json_object")));

        let anthropic = anthropic_body("m", &prompt());
        assert_eq!(anthropic.get("system"), Some(&json!("You are Mira.")));
        assert_eq!(anthropic.pointer("/messages/0/role"), Some(&json!("user")));
        assert!(anthropic.get("response_format").is_none());
    }

    #[test]
    fn trailing_slash_is_dropped_and_family_reported() {
        let openai = backend(BackendType::OpenAi);
        assert_eq!(openai.name(), "openai-compatible");
        if let LlmBackend::OpenAi(endpoint) = &openai {
            assert_eq!(endpoint.base_url, "https://api.moonshot.cn/v1");
        }
        assert_eq!(backend(BackendType::Anthropic).name(), "anthropic");
    }
}
