use crate::api::streaming::process_streaming_response;
use crate::api::RequestBody;
use crate::config::{ApiSettings, ApiType, DEFAULT_OPENAI_BASE};
use crate::error::{ChatError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// A hosted chat-completion endpoint.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Non-streaming completion; returns the raw response JSON.
    async fn complete(&self, request: &RequestBody) -> Result<Value>;

    /// Streaming completion; every content delta is forwarded to `on_delta`
    /// and the assembled answer is returned.
    async fn stream(
        &self,
        request: &RequestBody,
        on_delta: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<String>;
}

pub struct ApiClient {
    http: reqwest::Client,
    endpoint: String,
    request_timeout: Duration,
    stream_timeout: u64,
}

impl ApiClient {
    pub fn new(settings: &ApiSettings) -> Result<Self> {
        let api_key = settings.api_key.as_deref().ok_or_else(|| {
            let var = match settings.api_type {
                ApiType::Azure => "AZURE_OPENAI_KEY",
                ApiType::OpenAi => "OPENAI_API_KEY",
            };
            ChatError::Config(format!("API key not set (export {} or set api.api_key)", var))
        })?;

        let endpoint = build_endpoint(settings)?;

        let mut headers = HeaderMap::new();
        let auth = match settings.api_type {
            ApiType::Azure => (
                reqwest::header::HeaderName::from_static("api-key"),
                HeaderValue::from_str(api_key),
            ),
            ApiType::OpenAi => (AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", api_key))),
        };
        let mut value = auth
            .1
            .map_err(|e| ChatError::Config(format!("Invalid API key header: {}", e)))?;
        value.set_sensitive(true);
        headers.insert(auth.0, value);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            endpoint,
            request_timeout: Duration::from_secs(settings.request_timeout),
            stream_timeout: settings.stream_timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, request: &RequestBody, whole_body_timeout: bool) -> Result<reqwest::Response> {
        debug!(
            "POST {} (messages={}, tools={}, stream={})",
            self.endpoint,
            request.messages.len(),
            request.tools.as_ref().map_or(0, |t| t.len()),
            request.stream
        );

        let mut builder = self.http.post(&self.endpoint).json(request);
        if whole_body_timeout {
            builder = builder.timeout(self.request_timeout);
        }
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ChatError::Timeout
            } else {
                ChatError::Network(e)
            }
        })?;

        debug!("response status: {}", response.status());

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ChatError::Api { status, message });
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn complete(&self, request: &RequestBody) -> Result<Value> {
        let mut request = request.clone();
        request.stream = false;

        let response = self.send(&request, true).await?;
        let text = response.text().await?;
        debug!("raw response: {}", text);
        Ok(serde_json::from_str(&text)?)
    }

    async fn stream(
        &self,
        request: &RequestBody,
        on_delta: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<String> {
        let mut request = request.clone();
        request.stream = true;

        // Long answers outlive any whole-request deadline; the per-chunk
        // timeout in the stream reader applies instead.
        let response = self.send(&request, false).await?;
        process_streaming_response(response, self.stream_timeout, on_delta).await
    }
}

/// Resolve the chat-completions URL for the configured API flavour.
pub fn build_endpoint(settings: &ApiSettings) -> Result<String> {
    match settings.api_type {
        ApiType::Azure => {
            let base = settings.api_base.as_deref().ok_or_else(|| {
                ChatError::Config(
                    "Azure api_base not set (export AZURE_OPENAI_ENDPOINT or set api.api_base)"
                        .to_string(),
                )
            })?;
            Ok(format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                base.trim_end_matches('/'),
                settings.model,
                settings.api_version
            ))
        }
        ApiType::OpenAi => {
            let base = settings.api_base.as_deref().unwrap_or(DEFAULT_OPENAI_BASE);
            if base.ends_with("/chat/completions") {
                Ok(base.to_string())
            } else {
                Ok(format!("{}/chat/completions", base.trim_end_matches('/')))
            }
        }
    }
}
