use crate::circuit_breaker::CircuitBreaker;
use crate::traits::*;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

/// Chat-completions provider for OpenAI and compatible endpoints.
#[derive(Clone)]
pub struct OpenAICompatibleProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_retries: u32,
    base_delay: Duration,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl OpenAICompatibleProvider {
    pub fn new(base_url: String, api_key: Option<String>, model: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url,
            api_key,
            model,
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            circuit_breaker: Arc::new(CircuitBreaker::new(5, Duration::from_secs(30))),
        }
    }

    /// Override retry count and initial backoff.
    pub fn with_retry(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn retry_delay(&self, attempt: u32, err: &ProviderError) -> Duration {
        if let ProviderError::Api(msg) = err {
            if msg.starts_with("429") {
                return (self.base_delay * 4 * 2_u32.saturating_pow(attempt))
                    .min(Duration::from_secs(30));
            }
        }
        (self.base_delay * 2_u32.saturating_pow(attempt)).min(Duration::from_secs(5))
    }

    async fn generate_once(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[serde_json::Value]>,
    ) -> Result<GenerateResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let mut body = json!({
            "model": model,
            "messages": messages,
        });

        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            body["tools"] = json!(tools);
            body["tool_choice"] = json!("auto");
        }

        debug!("llm url={} tools={}", url, tools.map_or(0, |t| t.len()));

        let mut request = self.client.post(&url).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                ProviderError::Http("Network connection failed".to_string())
            } else {
                ProviderError::Http(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            let detail = match status.as_u16() {
                401 => format!("401 Authentication failed. Check your API key. Details: {}", text),
                404 => format!("404 Invalid endpoint. Details: {}", text),
                429 => format!("429 Rate limit exceeded. Details: {}", text),
                _ => format!("{}: {}", status.as_u16(), text),
            };
            return Err(ProviderError::Api(detail));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Parse("No choices in response".to_string()))?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .into_iter()
            .filter(|call| !call.function.name.is_empty())
            .collect();

        let content = choice.message.content.filter(|c| !c.is_empty());
        if content.is_none() && tool_calls.is_empty() {
            return Err(ProviderError::Parse(
                "Response has neither content nor tool calls".to_string(),
            ));
        }

        Ok(GenerateResponse {
            content,
            tool_calls,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
        })
    }
}

fn is_retryable(err: &ProviderError) -> bool {
    match err {
        ProviderError::Http(_) => true,
        ProviderError::Api(msg) => msg.starts_with("429") || msg.starts_with('5'),
        ProviderError::Parse(_) | ProviderError::CircuitOpen => false,
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[serde_json::Value]>,
    ) -> Result<GenerateResponse, ProviderError> {
        self.generate_with_model(&self.model, messages, tools).await
    }

    async fn generate_with_model(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[serde_json::Value]>,
    ) -> Result<GenerateResponse, ProviderError> {
        if !self.circuit_breaker.allows_request() {
            return Err(ProviderError::CircuitOpen);
        }

        let started = Instant::now();
        let mut attempt = 0;
        let result = loop {
            match self.generate_once(model, messages, tools).await {
                Ok(response) => break Ok(response),
                Err(e) if attempt < self.max_retries && is_retryable(&e) => {
                    warn!("LLM call failed (attempt {}): {}", attempt + 1, e);
                    tokio::time::sleep(self.retry_delay(attempt, &e)).await;
                    attempt += 1;
                }
                Err(e) => break Err(e),
            }
        };
        metrics::histogram!(
            "llm_request_latency",
            started.elapsed().as_secs_f64() * 1000.0
        );

        match &result {
            Ok(_) => self.circuit_breaker.record_success(),
            Err(_) => self.circuit_breaker.record_failure(),
        }
        result
    }

    fn name(&self) -> &str {
        "OpenAI Compatible"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable(&ProviderError::Http("reset".into())));
        assert!(is_retryable(&ProviderError::Api("429 Rate limit exceeded".into())));
        assert!(is_retryable(&ProviderError::Api("503: busy".into())));
        assert!(!is_retryable(&ProviderError::Api("401 Authentication failed".into())));
        assert!(!is_retryable(&ProviderError::Parse("bad".into())));
    }

    #[test]
    fn test_rate_limit_backs_off_longer() {
        let provider = OpenAICompatibleProvider::new("http://localhost".into(), None, "m".into())
            .with_retry(3, Duration::from_millis(100));
        let normal = provider.retry_delay(0, &ProviderError::Http("x".into()));
        let limited = provider.retry_delay(0, &ProviderError::Api("429 Rate limit".into()));
        assert_eq!(normal, Duration::from_millis(100));
        assert_eq!(limited, Duration::from_millis(400));
    }
}
