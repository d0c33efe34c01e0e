use super::{ChatMessage, LLMConfig, LLMProvider, LLMResponse, LLM};
use crate::error::{ClipError, Result};
use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const OPENAI_CHAT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const OPENAI_MODELS_ENDPOINT: &str = "https://api.openai.com/v1/models";
const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

fn build_client(config: &LLMConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .build()
        .map_err(|e| ClipError::InvalidConfig(format!("failed to build HTTP client: {}", e)))
}

/// Map a transport-level failure onto the oracle error taxonomy
fn transport_error(provider: &str, timeout_seconds: u64, err: reqwest::Error) -> ClipError {
    if err.is_timeout() {
        return ClipError::OracleTimeout { timeout_seconds };
    }
    ClipError::OracleUnavailable {
        status: err.status().map(|s| s.as_u16()),
        message: format!("{} request failed: {}", provider, err),
    }
}

/// Turn a non-success HTTP response into an oracle error
async fn status_error(provider: &str, response: Response) -> ClipError {
    let status = response.status();
    let retry_after_seconds = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let text = response.text().await.unwrap_or_default();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return ClipError::OracleRateLimited {
            retry_after_seconds,
            message: format!("{} API error {}: {}", provider, status, text),
        };
    }

    ClipError::OracleUnavailable {
        status: Some(status.as_u16()),
        message: format!("{} API error {}: {}", provider, status, text),
    }
}

/// OpenAI-style `/v1/chat/completions` provider, used for OpenAI and LMStudio
pub struct ChatCompletionsProvider {
    config: LLMConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    choices: Vec<ChatCompletionsChoice>,
    usage: Option<ChatCompletionsUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsUsage {
    total_tokens: u32,
}

impl ChatCompletionsProvider {
    pub fn new(config: LLMConfig) -> Result<Self> {
        config.validate()?;
        let client = build_client(&config)?;
        Ok(Self { config, client })
    }

    fn name(&self) -> &'static str {
        match self.config.provider {
            LLMProvider::LMStudio => "LMStudio",
            _ => "OpenAI",
        }
    }

    fn endpoint(&self) -> &str {
        self.config.endpoint.as_deref().unwrap_or(OPENAI_CHAT_ENDPOINT)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl LLM for ChatCompletionsProvider {
    async fn chat(&self, messages: Vec<ChatMessage>, temperature: f32) -> Result<LLMResponse> {
        let request = ChatCompletionsRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature,
        };

        debug!("Sending request to {} at {}", self.name(), self.endpoint());

        let response = self
            .authorize(self.client.post(self.endpoint()))
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(self.name(), self.config.timeout_seconds, e))?;

        if !response.status().is_success() {
            return Err(status_error(self.name(), response).await);
        }

        let body: ChatCompletionsResponse = response
            .json()
            .await
            .map_err(|e| transport_error(self.name(), self.config.timeout_seconds, e))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ClipError::OracleUnavailable {
                status: None,
                message: format!("No response from {}", self.name()),
            })?;

        Ok(LLMResponse {
            content,
            tokens_used: body.usage.map(|u| u.total_tokens),
        })
    }

    async fn is_available(&self) -> bool {
        let url = match self.config.provider {
            LLMProvider::LMStudio => self.endpoint().replace("/chat/completions", "/models"),
            _ => OPENAI_MODELS_ENDPOINT.to_string(),
        };

        match self.authorize(self.client.get(&url)).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn provider_type(&self) -> LLMProvider {
        self.config.provider.clone()
    }
}

/// Gemini provider implementation
pub struct GeminiProvider {
    config: LLMConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
struct GeminiUsage {
    #[serde(rename = "totalTokenCount")]
    total_token_count: u32,
}

impl GeminiProvider {
    pub fn new(config: LLMConfig) -> Result<Self> {
        config.validate()?;
        let client = build_client(&config)?;
        Ok(Self { config, client })
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| ClipError::InvalidConfig("Gemini API key not configured".to_string()))
    }

    /// System messages become the system instruction, the rest user turns
    fn build_request(&self, messages: Vec<ChatMessage>, temperature: f32) -> GeminiRequest {
        let (system, turns): (Vec<_>, Vec<_>) =
            messages.into_iter().partition(|m| m.role == "system");

        let system_instruction = if system.is_empty() {
            None
        } else {
            Some(GeminiContent {
                role: None,
                parts: system.into_iter().map(|m| GeminiPart { text: m.content }).collect(),
            })
        };

        let contents = turns
            .into_iter()
            .map(|m| GeminiContent {
                role: Some(if m.role == "assistant" { "model" } else { "user" }.to_string()),
                parts: vec![GeminiPart { text: m.content }],
            })
            .collect();

        GeminiRequest {
            system_instruction,
            contents,
            generation_config: GeminiGenerationConfig {
                max_output_tokens: self.config.max_tokens,
                temperature,
            },
        }
    }
}

#[async_trait]
impl LLM for GeminiProvider {
    async fn chat(&self, messages: Vec<ChatMessage>, temperature: f32) -> Result<LLMResponse> {
        let api_key = self.api_key()?;
        let request = self.build_request(messages, temperature);
        let url = self
            .config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("{}/{}:generateContent", GEMINI_BASE, self.config.model));

        debug!("Sending request to Gemini API");

        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error("Gemini", self.config.timeout_seconds, e))?;

        if !response.status().is_success() {
            return Err(status_error("Gemini", response).await);
        }

        let body: GeminiResponse = response
            .json()
            .await
            .map_err(|e| transport_error("Gemini", self.config.timeout_seconds, e))?;

        let content = body
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .ok_or_else(|| ClipError::OracleUnavailable {
                status: None,
                message: "No response from Gemini".to_string(),
            })?;

        Ok(LLMResponse {
            content,
            tokens_used: body.usage_metadata.map(|u| u.total_token_count),
        })
    }

    async fn is_available(&self) -> bool {
        let Ok(api_key) = self.api_key() else {
            return false;
        };

        match self.client.get(GEMINI_BASE).query(&[("key", api_key)]).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn provider_type(&self) -> LLMProvider {
        LLMProvider::Gemini
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on a local port, after an optional delay
    async fn serve_once(response: &'static str, delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            tokio::time::sleep(delay).await;
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });

        format!("http://{}/v1/chat/completions", addr)
    }

    /// Consume headers and body so closing the socket doesn't reset the connection
    async fn read_request(socket: &mut tokio::net::TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.trim()
                            .eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    return;
                }
            }
        }
    }

    fn local_provider(endpoint: String, timeout_seconds: u64) -> ChatCompletionsProvider {
        let config = LLMConfig {
            provider: LLMProvider::LMStudio,
            endpoint: Some(endpoint),
            timeout_seconds,
            ..LLMConfig::default()
        };
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .unwrap();
        ChatCompletionsProvider { config, client }
    }

    #[tokio::test]
    async fn test_chat_reads_first_choice() {
        let endpoint = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 88\r\nConnection: close\r\n\r\n\
             {\"choices\":[{\"message\":{\"role\":\"assistant\",\"content\":\"[]\"}}],\"usage\":{\"total_tokens\":7}}",
            Duration::ZERO,
        )
        .await;

        let response = local_provider(endpoint, 5)
            .chat(vec![ChatMessage::user("hi")], 0.6)
            .await
            .unwrap();
        assert_eq!(response.content, "[]");
        assert_eq!(response.tokens_used, Some(7));
    }

    #[tokio::test]
    async fn test_429_is_rate_limited_with_retry_after() {
        let endpoint = serve_once(
            "HTTP/1.1 429 Too Many Requests\r\nRetry-After: 3\r\nContent-Length: 9\r\nConnection: close\r\n\r\nslow down",
            Duration::ZERO,
        )
        .await;

        let err = local_provider(endpoint, 5)
            .chat(vec![ChatMessage::user("hi")], 0.6)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "oracle_rate_limited");
        assert_eq!(err.status(), Some(429));
        assert!(err.is_retryable());
        assert!(matches!(
            err,
            ClipError::OracleRateLimited {
                retry_after_seconds: Some(3),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable_with_status() {
        let endpoint = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 10\r\nConnection: close\r\n\r\noverloaded",
            Duration::ZERO,
        )
        .await;

        let err = local_provider(endpoint, 5)
            .chat(vec![ChatMessage::user("hi")], 0.6)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "oracle_unavailable");
        assert_eq!(err.status(), Some(503));
        assert!(err.to_string().contains("overloaded"));
    }

    #[tokio::test]
    async fn test_slow_server_is_a_timeout() {
        let endpoint = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            Duration::from_secs(3),
        )
        .await;

        let err = local_provider(endpoint, 1)
            .chat(vec![ChatMessage::user("hi")], 0.6)
            .await
            .unwrap_err();
        assert!(matches!(err, ClipError::OracleTimeout { timeout_seconds: 1 }));
    }

    #[tokio::test]
    async fn test_refused_connection_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = local_provider(format!("http://{}/v1/chat/completions", addr), 5)
            .chat(vec![ChatMessage::user("hi")], 0.6)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "oracle_unavailable");
        assert_eq!(err.status(), None);
    }

    fn gemini() -> GeminiProvider {
        GeminiProvider::new(LLMConfig {
            provider: LLMProvider::Gemini,
            api_key: Some("test-key".to_string()),
            model: "gemini-1.5-flash".to_string(),
            ..LLMConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_gemini_request_splits_system_instruction() {
        let request = gemini().build_request(
            vec![ChatMessage::system("be terse"), ChatMessage::user("find sleep")],
            0.6,
        );
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "be terse");
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "find sleep");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 1024);
    }

    #[test]
    fn test_chat_completions_request_shape() {
        let request = ChatCompletionsRequest {
            model: "gpt-3.5-turbo",
            messages: vec![ChatMessage::user("hi")],
            max_tokens: 256,
            temperature: 0.5,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-3.5-turbo");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["temperature"], 0.5);
    }

    #[test]
    fn test_openai_provider_defaults_endpoint() {
        let provider = ChatCompletionsProvider::new(LLMConfig {
            api_key: Some("sk-test".to_string()),
            ..LLMConfig::default()
        })
        .unwrap();
        assert_eq!(provider.endpoint(), OPENAI_CHAT_ENDPOINT);
        assert_eq!(provider.name(), "OpenAI");
    }
}
