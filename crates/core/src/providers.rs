use crate::languages::Runtime;
use async_trait::async_trait;
#[cfg(feature = "provider-piston")]
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
#[cfg(feature = "provider-piston")]
use std::time::Duration;
use thiserror::Error;
#[cfg(feature = "provider-piston")]
use url::Url;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("execution request failed: {0}")]
    Request(String),
    #[error("execution response invalid: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct SourceFile {
    pub content: String,
}

/// Body POSTed to the execution API.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ExecuteRequest {
    pub language: String,
    pub version: String,
    pub files: Vec<SourceFile>,
}

impl ExecuteRequest {
    pub fn new(runtime: &Runtime, code: &str) -> Self {
        Self {
            language: runtime.language.to_string(),
            version: runtime.version.to_string(),
            files: vec![SourceFile {
                content: code.to_string(),
            }],
        }
    }
}

/// Result of one stage (compile or run) as reported by the execution API.
#[derive(Debug, Clone, Serialize, Deserialize, Default, Eq, PartialEq)]
pub struct StageResult {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub signal: Option<String>,
}

impl StageResult {
    /// A missing exit code means the process was killed by a signal.
    pub fn failed(&self) -> bool {
        self.code != Some(0)
    }

    fn error_text(&self) -> String {
        [&self.stderr, &self.stdout, &self.output]
            .into_iter()
            .find(|text| !text.is_empty())
            .cloned()
            .unwrap_or_default()
    }

    fn success_text(&self) -> &str {
        if self.output.is_empty() {
            &self.stdout
        } else {
            &self.output
        }
    }
}

/// Raw response body as returned by the execution API.
#[derive(Debug, Clone, Serialize, Deserialize, Default, Eq, PartialEq)]
pub struct ExecuteResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub compile: Option<StageResult>,
    #[serde(default)]
    pub run: Option<StageResult>,
}

/// Classified result of an execution request.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ExecutionOutcome {
    ApiError(String),
    CompileError(String),
    RuntimeError(String),
    Success(String),
}

impl ExecutionOutcome {
    /// Classifies a response: API message first, then compile failure, then
    /// run failure, then success.
    ///
    /// # Examples
    ///
    /// ```
    /// use snipper_core::providers::{ExecuteResponse, ExecutionOutcome};
    ///
    /// let response: ExecuteResponse =
    ///     serde_json::from_str(r#"{"run": {"code": 0, "output": "  hi \n"}}"#).unwrap();
    /// assert_eq!(
    ///     ExecutionOutcome::classify(response).unwrap(),
    ///     ExecutionOutcome::Success("hi".to_string())
    /// );
    /// ```
    pub fn classify(response: ExecuteResponse) -> Result<Self, ProviderError> {
        if let Some(message) = response.message.filter(|m| !m.is_empty()) {
            return Ok(Self::ApiError(message));
        }
        if let Some(compile) = response.compile.as_ref().filter(|s| s.failed()) {
            return Ok(Self::CompileError(compile.error_text()));
        }
        let run = response.run.ok_or_else(|| {
            ProviderError::InvalidResponse("missing `run` stage in response".to_string())
        })?;
        if run.failed() {
            return Ok(Self::RuntimeError(run.error_text()));
        }
        Ok(Self::Success(run.success_text().trim().to_string()))
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::ApiError(e) | Self::CompileError(e) | Self::RuntimeError(e) => Some(e),
            Self::Success(_) => None,
        }
    }
}

#[async_trait]
pub trait ExecutionProvider: Send + Sync {
    async fn execute(&self, req: ExecuteRequest) -> Result<ExecuteResponse, ProviderError>;
}

#[async_trait]
impl<T> ExecutionProvider for Box<T>
where
    T: ExecutionProvider + ?Sized,
{
    async fn execute(&self, req: ExecuteRequest) -> Result<ExecuteResponse, ProviderError> {
        (**self).execute(req).await
    }
}

/// Client for a Piston-compatible `/execute` endpoint.
#[cfg(feature = "provider-piston")]
#[derive(Debug, Clone)]
pub struct PistonProvider {
    pub endpoint: Url,
    client: Client,
}

#[cfg(feature = "provider-piston")]
impl PistonProvider {
    /// Builds a client; a zero timeout leaves requests unbounded.
    pub fn new(endpoint: &str, timeout_ms: u64) -> Result<Self, ProviderError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ProviderError::Request(format!("invalid endpoint `{endpoint}`: {e}")))?;
        let mut builder = Client::builder();
        if timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        let client = builder
            .build()
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        Ok(Self { endpoint, client })
    }
}

#[cfg(feature = "provider-piston")]
#[async_trait]
impl ExecutionProvider for PistonProvider {
    async fn execute(&self, req: ExecuteRequest) -> Result<ExecuteResponse, ProviderError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&req)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        match serde_json::from_slice::<ExecuteResponse>(&body) {
            Ok(parsed) => {
                tracing::debug!(%status, ?parsed, "execution api response");
                Ok(parsed)
            }
            Err(e) if status.is_success() => Err(ProviderError::InvalidResponse(e.to_string())),
            Err(_) => Err(ProviderError::Request(format!(
                "http status {status} from execution api"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
enum MockReply {
    Fixed(ExecuteResponse),
    Echo,
    Unreachable,
}

/// In-process provider for tests and offline sessions. It records every
/// request it receives.
#[derive(Debug)]
pub struct MockProvider {
    reply: MockReply,
    requests: Mutex<Vec<ExecuteRequest>>,
}

impl MockProvider {
    fn with_reply(reply: MockReply) -> Self {
        Self {
            reply,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers every request with `response`.
    pub fn responding(response: ExecuteResponse) -> Self {
        Self::with_reply(MockReply::Fixed(response))
    }

    /// Fails every request at the transport level.
    pub fn unreachable() -> Self {
        Self::with_reply(MockReply::Unreachable)
    }

    /// Succeeds with the submitted source as program output.
    pub fn echo() -> Self {
        Self::with_reply(MockReply::Echo)
    }

    pub fn requests(&self) -> Vec<ExecuteRequest> {
        self.requests
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::echo()
    }
}

#[async_trait]
impl ExecutionProvider for MockProvider {
    async fn execute(&self, req: ExecuteRequest) -> Result<ExecuteResponse, ProviderError> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(req.clone());
        }
        match &self.reply {
            MockReply::Fixed(response) => Ok(response.clone()),
            MockReply::Echo => {
                let output = req
                    .files
                    .into_iter()
                    .map(|f| f.content)
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(ExecuteResponse {
                    message: None,
                    compile: None,
                    run: Some(StageResult {
                        code: Some(0),
                        stdout: output.clone(),
                        output,
                        ..StageResult::default()
                    }),
                })
            }
            MockReply::Unreachable => {
                Err(ProviderError::Request("connection refused".to_string()))
            }
        }
    }
}
