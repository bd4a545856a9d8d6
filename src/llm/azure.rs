//! Azure OpenAI chat-completions client
//!
//! This module implements the ModelClient trait for an Azure OpenAI
//! deployment. Only the parts the classifier needs are supported: one system
//! message, one user message, text reply.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Certificate, Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::LlmConfig;
use crate::error::{ClassifyError, Result};
use crate::llm::client::{InvokeError, ModelClient};

/// Environment variable holding the API key
pub const ENV_API_KEY: &str = "AZURE_OPENAI_KEY";

/// Environment variable holding the resource endpoint
pub const ENV_ENDPOINT: &str = "AZURE_OPENAI_ENDPOINT";

/// Environment variable overriding the deployment name
pub const ENV_DEPLOYMENT: &str = "AZURE_OPENAI_DEPLOYMENT";

/// Environment variable overriding the API version
pub const ENV_API_VERSION: &str = "AZURE_OPENAI_API_VERSION";

/// Environment variable pointing at an extra root certificate (PEM)
pub const ENV_CA_CERT: &str = "SSL_CERT_PATH";

/// Environment variable disabling TLS verification when set to "true"
pub const ENV_SKIP_TLS_VERIFY: &str = "SKIP_SSL_VERIFY";

/// Fully resolved connection settings
#[derive(Debug, Clone)]
pub struct AzureConfig {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl AzureConfig {
    /// Resolve settings from the config file section plus environment.
    /// Environment values win over the file.
    pub fn resolve(llm: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(ENV_API_KEY)
            .map_err(|_| ClassifyError::Config(format!("{} not set", ENV_API_KEY)))?;

        let endpoint = std::env::var(ENV_ENDPOINT)
            .ok()
            .or_else(|| llm.endpoint.clone())
            .ok_or_else(|| ClassifyError::Config(format!("{} not set and no llm.endpoint configured", ENV_ENDPOINT)))?;

        Ok(Self {
            endpoint,
            api_key,
            deployment: std::env::var(ENV_DEPLOYMENT).unwrap_or_else(|_| llm.deployment.clone()),
            api_version: std::env::var(ENV_API_VERSION).unwrap_or_else(|_| llm.api_version.clone()),
            max_tokens: llm.max_tokens,
            temperature: llm.temperature,
            timeout: Duration::from_millis(llm.timeout_ms),
        })
    }

    /// Chat-completions URL for the configured deployment
    pub fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint.trim_end_matches('/'),
            self.deployment,
            self.api_version
        )
    }
}

/// Azure OpenAI API client
pub struct AzureOpenAiClient {
    client: Client,
    config: AzureConfig,
}

impl AzureOpenAiClient {
    /// Build a client, honouring custom CA / skip-verify settings.
    ///
    /// Precedence: explicit CA certificate, then skip-verify, then the system
    /// trust store.
    pub fn new(config: AzureConfig, llm: &LlmConfig) -> Result<Self> {
        let mut builder = Client::builder().timeout(config.timeout);

        let ca_cert = std::env::var(ENV_CA_CERT).ok().map(PathBuf::from).or_else(|| llm.ca_cert_path.clone());
        let skip_verify = std::env::var(ENV_SKIP_TLS_VERIFY)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(llm.skip_tls_verify);

        let mut custom_ca = false;
        if let Some(path) = ca_cert {
            if path.exists() {
                log::info!("Using CA certificate: {}", path.display());
                let pem = fs::read(&path)?;
                let cert = Certificate::from_pem(&pem)
                    .map_err(|e| ClassifyError::Llm(format!("Invalid CA certificate {}: {}", path.display(), e)))?;
                builder = builder.add_root_certificate(cert);
                custom_ca = true;
            } else {
                log::warn!("CA certificate not found: {}", path.display());
            }
        }

        if !custom_ca && skip_verify {
            log::warn!("TLS certificate verification disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| ClassifyError::Llm(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Build the request body for the chat-completions API
    fn build_request(&self, system: &str, user: &str) -> Value {
        json!({
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Extract the reply text from a chat-completions response body
pub fn parse_reply(body: &str) -> std::result::Result<String, InvokeError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| InvokeError::Transport(format!("Failed to parse response: {}", e)))?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| InvokeError::Transport("Response contained no message content".to_string()))
}

fn map_send_error(err: reqwest::Error) -> InvokeError {
    if err.is_timeout() {
        InvokeError::Timeout(err.to_string())
    } else {
        InvokeError::Transport(format!("Request failed: {}", err))
    }
}

#[async_trait]
impl ModelClient for AzureOpenAiClient {
    async fn invoke(&self, system: &str, user: &str) -> std::result::Result<String, InvokeError> {
        let body = self.build_request(system, user);

        let response = self
            .client
            .post(self.config.completions_url())
            .header("api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .map(str::to_string)
                .unwrap_or_else(|| "unspecified".to_string());
            return Err(InvokeError::RateLimited(format!(
                "HTTP 429 from {}, retry after {}",
                self.config.deployment, retry_after
            )));
        }

        let text = response.text().await.map_err(map_send_error)?;

        if !status.is_success() {
            return Err(InvokeError::Transport(format!("API error {}: {}", status, text)));
        }

        parse_reply(&text)
    }

    fn model(&self) -> &str {
        &self.config.deployment
    }
}

impl std::fmt::Debug for AzureOpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureOpenAiClient")
            .field("endpoint", &self.config.endpoint)
            .field("deployment", &self.config.deployment)
            .field("api_version", &self.config.api_version)
            .finish()
    }
}
