use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of one `run()`: the submitted code, its output and an optional error.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
pub struct ExecutionResult {
    pub code: String,
    pub output: String,
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn failed(code: String, error: String) -> Self {
        Self {
            code,
            output: String::new(),
            error: Some(error),
        }
    }

    pub fn succeeded(code: String, output: String) -> Self {
        Self {
            code,
            output,
            error: None,
        }
    }
}

/// Serializable view of the editor store at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct EditorSnapshot {
    pub language: String,
    pub theme: String,
    pub font_size: u32,
    pub output: String,
    pub error: Option<String>,
    pub is_running: bool,
    pub execution_result: Option<ExecutionResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonEnvelope {
    pub status: String,
    pub phase: String,
    pub message: String,
    pub details: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// `piston` or `mock`.
    pub provider: String,
    pub endpoint: String,
    pub timeout_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            provider: "piston".to_string(),
            endpoint: "https://emkc.org/api/v2/piston/execute".to_string(),
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: ".snipper/preferences.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub path: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            path: ".snipper/backend.json".to_string(),
        }
    }
}

/// Identity used when saving executions and snippets. An empty id means
/// nobody is signed in.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl UserConfig {
    pub fn is_signed_in(&self) -> bool {
        !self.id.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub execution: ExecutionConfig,
    pub storage: StorageConfig,
    pub backend: BackendConfig,
    pub user: UserConfig,
    pub log: LogConfig,
}
