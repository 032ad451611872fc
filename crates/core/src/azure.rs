use crate::embeddings::Embedder;
use crate::error::ServiceError;
use crate::models::ChatMessage;
use crate::traits::ChatCompleter;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

const BACKEND: &str = "azure-openai";

#[derive(Debug, Clone)]
pub struct AzureOpenAiConfig {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
    pub chat_deployment: String,
    pub embeddings_deployment: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl AzureOpenAiConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            api_version: "2024-06-01".to_string(),
            chat_deployment: "gpt-4o-mini".to_string(),
            embeddings_deployment: "text-embedding-3-large".to_string(),
            temperature: 0.2,
            max_tokens: 800,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Embedding and chat-completion client for an Azure OpenAI resource.
///
/// Built once at startup and shared; the underlying connection pool is reused
/// across calls.
pub struct AzureOpenAiClient {
    config: AzureOpenAiConfig,
    base: Url,
    client: Client,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl AzureOpenAiClient {
    pub fn new(config: AzureOpenAiConfig) -> Result<Self, ServiceError> {
        let mut endpoint = config.endpoint.trim().to_string();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }
        let base = Url::parse(&endpoint)?;
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            config,
            base,
            client,
        })
    }

    fn deployment_url(&self, deployment: &str, operation: &str) -> Result<Url, ServiceError> {
        let mut url = self
            .base
            .join(&format!("openai/deployments/{deployment}/{operation}"))?;
        url.query_pairs_mut()
            .append_pair("api-version", &self.config.api_version);
        Ok(url)
    }

    async fn post<B, R>(&self, url: Url, body: &B) -> Result<R, ServiceError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(url)
            .header("api-key", &self.config.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(ServiceError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("{status}: {details}"),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl Embedder for AzureOpenAiClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.deployment_url(&self.config.embeddings_deployment, "embeddings")?;
        debug!(
            inputs = texts.len(),
            deployment = %self.config.embeddings_deployment,
            "requesting embeddings"
        );
        let mut response: EmbeddingResponse =
            self.post(url, &EmbeddingRequest { input: texts }).await?;

        if response.data.len() != texts.len() {
            return Err(ServiceError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!(
                    "expected {} embeddings, received {}",
                    texts.len(),
                    response.data.len()
                ),
            });
        }

        response.data.sort_by_key(|item| item.index);
        Ok(response
            .data
            .into_iter()
            .map(|item| item.embedding)
            .collect())
    }
}

#[async_trait]
impl ChatCompleter for AzureOpenAiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError> {
        let url = self.deployment_url(&self.config.chat_deployment, "chat/completions")?;
        let request = ChatRequest {
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        debug!(
            messages = messages.len(),
            deployment = %self.config.chat_deployment,
            "requesting completion"
        );
        let response: ChatResponse = self.post(url, &request).await?;

        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }
}
