use crate::error::ServiceError;
use crate::traits::OcrEngine;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::{header::HeaderMap, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

const BACKEND: &str = "document-intelligence";
const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

#[derive(Debug, Clone)]
pub struct DocumentIntelligenceConfig {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
    pub model_id: String,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl DocumentIntelligenceConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            api_version: "2024-11-30".to_string(),
            model_id: "prebuilt-layout".to_string(),
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
            max_polls: 120,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequest {
    base64_source: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeOperation {
    status: String,
    #[serde(default)]
    analyze_result: Option<AnalyzeResult>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResult {
    #[serde(default)]
    pages: Vec<LayoutPage>,
}

#[derive(Debug, Deserialize)]
struct LayoutPage {
    #[serde(default)]
    lines: Vec<LayoutLine>,
}

#[derive(Debug, Deserialize)]
struct LayoutLine {
    #[serde(default)]
    content: String,
}

/// Azure Document Intelligence layout OCR.
///
/// Submits the document to `{model_id}:analyze`, then polls the returned
/// `Operation-Location` until the analysis succeeds or fails.
pub struct DocumentIntelligenceClient {
    config: DocumentIntelligenceConfig,
    base: Url,
    client: Client,
}

impl DocumentIntelligenceClient {
    pub fn new(config: DocumentIntelligenceConfig) -> Result<Self, ServiceError> {
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

    fn analyze_url(&self) -> Result<Url, ServiceError> {
        let mut url = self.base.join(&format!(
            "documentintelligence/documentModels/{}:analyze",
            self.config.model_id
        ))?;
        url.query_pairs_mut()
            .append_pair("api-version", &self.config.api_version);
        Ok(url)
    }

    async fn submit(&self, document: &[u8]) -> Result<Url, ServiceError> {
        let request = AnalyzeRequest {
            base64_source: STANDARD.encode(document),
        };
        let response = self
            .client
            .post(self.analyze_url()?)
            .header(KEY_HEADER, &self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::ACCEPTED && !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(backend_error(format!("analyze returned {status}: {details}")));
        }
        operation_location(response.headers())
    }

    async fn poll(&self, operation: Url) -> Result<AnalyzeResult, ServiceError> {
        for attempt in 1..=self.config.max_polls {
            let response = self
                .client
                .get(operation.clone())
                .header(KEY_HEADER, &self.config.api_key)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let details = response.text().await.unwrap_or_default();
                return Err(backend_error(format!("poll returned {status}: {details}")));
            }

            let body: AnalyzeOperation = response.json().await?;
            match body.status.as_str() {
                "succeeded" => {
                    return body.analyze_result.ok_or_else(|| {
                        backend_error("succeeded without analyzeResult".to_string())
                    });
                }
                "failed" | "canceled" => {
                    let details = body.error.map(|error| error.to_string()).unwrap_or_default();
                    return Err(backend_error(format!("analysis {}: {details}", body.status)));
                }
                other => {
                    debug!(attempt, status = other, "layout analysis pending");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }

        Err(backend_error(format!(
            "analysis not finished after {} polls",
            self.config.max_polls
        )))
    }
}

#[async_trait]
impl OcrEngine for DocumentIntelligenceClient {
    async fn ocr(&self, document: &[u8], file_name: &str) -> Result<String, ServiceError> {
        let operation = self.submit(document).await?;
        let result = self.poll(operation).await?;
        let text = layout_text(&result);
        debug!(
            file_name,
            pages = result.pages.len(),
            chars = text.chars().count(),
            "ocr completed"
        );
        Ok(text)
    }
}

fn backend_error(details: String) -> ServiceError {
    ServiceError::BackendResponse {
        backend: BACKEND.to_string(),
        details,
    }
}

fn operation_location(headers: &HeaderMap) -> Result<Url, ServiceError> {
    let location = headers
        .get("operation-location")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            backend_error("analyze response has no Operation-Location".to_string())
        })?;
    Ok(Url::parse(location)?)
}

/// Every non-empty line, page after page, joined with newlines.
fn layout_text(result: &AnalyzeResult) -> String {
    result
        .pages
        .iter()
        .flat_map(|page| page.lines.iter())
        .map(|line| line.content.as_str())
        .filter(|content| !content.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::{
        layout_text, AnalyzeOperation, DocumentIntelligenceClient, DocumentIntelligenceConfig,
    };
    use crate::error::ServiceError;
    use crate::traits::OcrEngine;
    use httpmock::{
        Method::{GET, POST},
        MockServer,
    };
    use serde_json::json;
    use std::time::Duration;

    const RESULT_PATH: &str =
        "/documentintelligence/documentModels/prebuilt-layout/analyzeResults/op-1";

    fn client_for(server: &MockServer, max_polls: u32) -> DocumentIntelligenceClient {
        let mut config = DocumentIntelligenceConfig::new(server.base_url(), "di-key");
        config.poll_interval = Duration::from_millis(5);
        config.max_polls = max_polls;
        DocumentIntelligenceClient::new(config).expect("client")
    }

    #[test]
    fn layout_lines_are_read_from_content() {
        let operation: AnalyzeOperation = serde_json::from_value(json!({
            "status": "succeeded",
            "analyzeResult": {
                "pages": [
                    {
                        "pageNumber": 1,
                        "lines": [{"content": "שם משפחה", "polygon": [1, 2]}, {"content": ""}]
                    },
                    {"pageNumber": 2, "lines": [{"content": "Signature"}]}
                ]
            }
        }))
        .expect("layout json");

        let result = operation.analyze_result.expect("result");
        assert_eq!(layout_text(&result), "שם משפחה\nSignature");
    }

    #[tokio::test]
    async fn document_is_submitted_then_polled_until_succeeded() {
        let server = MockServer::start_async().await;
        let submit = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/documentintelligence/documentModels/prebuilt-layout:analyze")
                    .query_param("api-version", "2024-11-30")
                    .header("ocp-apim-subscription-key", "di-key")
                    .json_body(json!({"base64Source": "JVBERg=="}));
                then.status(202)
                    .header("operation-location", server.url(RESULT_PATH));
            })
            .await;
        let poll = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path(RESULT_PATH)
                    .header("ocp-apim-subscription-key", "di-key");
                then.status(200).json_body(json!({
                    "status": "succeeded",
                    "analyzeResult": {"pages": [{"lines": [{"content": "Last name: Cohen"}]}]}
                }));
            })
            .await;

        let client = client_for(&server, 3);
        let text = client.ocr(b"%PDF", "form.pdf").await.expect("ocr");

        submit.assert_async().await;
        poll.assert_async().await;
        assert_eq!(text, "Last name: Cohen");
    }

    #[tokio::test]
    async fn running_analysis_gives_up_after_max_polls() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(202)
                    .header("operation-location", server.url(RESULT_PATH));
            })
            .await;
        let poll = server
            .mock_async(|when, then| {
                when.method(GET).path(RESULT_PATH);
                then.status(200).json_body(json!({"status": "running"}));
            })
            .await;

        let client = client_for(&server, 3);
        let result = client.ocr(b"scan", "scan.jpg").await;

        assert!(matches!(result, Err(ServiceError::BackendResponse { .. })));
        poll.assert_hits_async(3).await;
    }

    #[tokio::test]
    async fn failed_analysis_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(202)
                    .header("operation-location", server.url(RESULT_PATH));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(RESULT_PATH);
                then.status(200).json_body(json!({
                    "status": "failed",
                    "error": {"code": "InvalidContent"}
                }));
            })
            .await;

        let client = client_for(&server, 3);
        let error = client.ocr(b"scan", "scan.jpg").await.expect_err("failed");
        assert!(error.to_string().contains("InvalidContent"));
    }

    #[tokio::test]
    async fn rejected_submit_and_missing_location_are_errors() {
        let server = MockServer::start_async().await;
        let mut rejected = server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(401).body("access denied");
            })
            .await;

        let client = client_for(&server, 1);
        let error = client.ocr(b"scan", "scan.jpg").await.expect_err("unauthorized");
        assert!(error.to_string().contains("access denied"));

        rejected.delete_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(202);
            })
            .await;
        let error = client.ocr(b"scan", "scan.jpg").await.expect_err("no location");
        assert!(error.to_string().contains("Operation-Location"));
    }
}
