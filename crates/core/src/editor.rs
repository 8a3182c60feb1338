use crate::languages::{language_config, runtime_for, DEFAULT_LANGUAGE};
use crate::providers::{
    ExecuteRequest, ExecuteResponse, ExecutionOutcome, ExecutionProvider, ProviderError,
};
use crate::storage::{
    draft_key, KeyValueStore, NullStore, StorageError, FONT_SIZE_KEY, LANGUAGE_KEY, THEME_KEY,
};
use crate::types::{EditorSnapshot, ExecutionResult};

pub const DEFAULT_THEME: &str = "vs-dark";
pub const DEFAULT_FONT_SIZE: u32 = 14;
pub const EMPTY_CODE_ERROR: &str = "Enter some code to run";
pub const RUN_FAILED_ERROR: &str = "Error running code";

/// The live editing surface the store reads code from.
pub trait EditorBuffer: Send {
    fn value(&self) -> String;
    fn set_value(&mut self, value: &str);
}

/// Plain string buffer, used by the terminal session and in tests.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct TextBuffer {
    text: String,
}

impl TextBuffer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl EditorBuffer for TextBuffer {
    fn value(&self) -> String {
        self.text.clone()
    }

    fn set_value(&mut self, value: &str) {
        self.text = value.to_string();
    }
}

/// Persisted editor preferences.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Preferences {
    pub language: String,
    pub theme: String,
    pub font_size: u32,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            theme: DEFAULT_THEME.to_string(),
            font_size: DEFAULT_FONT_SIZE,
        }
    }
}

impl Preferences {
    /// Reads saved preferences, falling back to defaults for anything absent,
    /// empty, unreadable, or (for the font size) not an integer.
    pub fn load<S: KeyValueStore + ?Sized>(storage: &S) -> Self {
        let defaults = Self::default();
        let read = |key: &str| match storage.get(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to read preference");
                None
            }
        };

        Self {
            language: read(LANGUAGE_KEY).unwrap_or(defaults.language),
            theme: read(THEME_KEY).unwrap_or(defaults.theme),
            font_size: read(FONT_SIZE_KEY)
                .and_then(|v| v.trim().parse::<u32>().ok())
                .unwrap_or(defaults.font_size),
        }
    }
}

/// Handle for one in-flight execution. Only the ticket from the most recent
/// [`EditorStore::begin_run`] is applied on completion.
#[derive(Debug, Clone)]
pub struct RunTicket {
    generation: u64,
    code: String,
    request: ExecuteRequest,
}

impl RunTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn request(&self) -> &ExecuteRequest {
        &self.request
    }
}

/// Editor preference and execution state for one editing session.
///
/// The store owns its execution provider and preference storage; the UI root
/// creates one and lends it to whatever needs it.
///
/// # Examples
///
/// ```no_run
/// use snipper_core::editor::{EditorStore, TextBuffer};
/// use snipper_core::providers::MockProvider;
/// use snipper_core::storage::MemoryStore;
///
/// # async fn demo() {
/// let mut store = EditorStore::new(MockProvider::echo(), MemoryStore::new());
/// store.attach_editor(TextBuffer::new("console.log('hi')"));
/// store.run().await;
/// assert_eq!(store.output(), "console.log('hi')");
/// assert!(!store.is_running());
/// # }
/// ```
pub struct EditorStore<P, S>
where
    P: ExecutionProvider,
    S: KeyValueStore,
{
    provider: P,
    storage: S,
    prefs: Preferences,
    output: String,
    error: Option<String>,
    is_running: bool,
    editor: Option<Box<dyn EditorBuffer>>,
    execution_result: Option<ExecutionResult>,
    generation: u64,
}

impl<P> EditorStore<P, NullStore>
where
    P: ExecutionProvider,
{
    /// Store for contexts without per-user storage: defaults only, nothing
    /// is persisted.
    pub fn detached(provider: P) -> Self {
        Self::with_preferences(provider, NullStore, Preferences::default())
    }
}

impl<P, S> EditorStore<P, S>
where
    P: ExecutionProvider,
    S: KeyValueStore,
{
    /// Creates a store whose preferences are read from `storage`.
    pub fn new(provider: P, storage: S) -> Self {
        let prefs = Preferences::load(&storage);
        Self::with_preferences(provider, storage, prefs)
    }

    fn with_preferences(provider: P, storage: S, prefs: Preferences) -> Self {
        Self {
            provider,
            storage,
            prefs,
            output: String::new(),
            error: None,
            is_running: false,
            editor: None,
            execution_result: None,
            generation: 0,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn language(&self) -> &str {
        &self.prefs.language
    }

    pub fn theme(&self) -> &str {
        &self.prefs.theme
    }

    pub fn font_size(&self) -> u32 {
        self.prefs.font_size
    }

    pub fn preferences(&self) -> &Preferences {
        &self.prefs
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn execution_result(&self) -> Option<&ExecutionResult> {
        self.execution_result.as_ref()
    }

    /// Number of runs started so far; bumps on every submitted run.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn snapshot(&self) -> EditorSnapshot {
        EditorSnapshot {
            language: self.prefs.language.clone(),
            theme: self.prefs.theme.clone(),
            font_size: self.prefs.font_size,
            output: self.output.clone(),
            error: self.error.clone(),
            is_running: self.is_running,
            execution_result: self.execution_result.clone(),
        }
    }

    /// Current buffer content, or an empty string when no editor is attached.
    pub fn code(&self) -> String {
        self.editor
            .as_ref()
            .map(|editor| editor.value())
            .unwrap_or_default()
    }

    pub fn editor_mut(&mut self) -> Option<&mut (dyn EditorBuffer + 'static)> {
        self.editor.as_deref_mut()
    }

    /// Attaches the editing surface, loading the saved draft for the current
    /// language into it when one exists.
    pub fn attach_editor<E>(&mut self, mut editor: E)
    where
        E: EditorBuffer + 'static,
    {
        match self.storage.get(&draft_key(&self.prefs.language)) {
            Ok(Some(draft)) if !draft.is_empty() => editor.set_value(&draft),
            Ok(_) => {}
            Err(e) => tracing::warn!(
                language = %self.prefs.language,
                error = %e,
                "failed to read saved draft"
            ),
        }
        self.editor = Some(Box::new(editor));
    }

    pub fn set_theme(&mut self, theme: &str) -> Result<(), StorageError> {
        self.storage.set(THEME_KEY, theme)?;
        self.prefs.theme = theme.to_string();
        Ok(())
    }

    pub fn set_font_size(&mut self, font_size: u32) -> Result<(), StorageError> {
        self.storage.set(FONT_SIZE_KEY, &font_size.to_string())?;
        self.prefs.font_size = font_size;
        Ok(())
    }

    /// Switches language. The outgoing buffer is saved as the draft of the
    /// previous language first, then output and error are cleared.
    pub fn set_language(&mut self, language: &str) -> Result<(), StorageError> {
        self.save_draft()?;
        self.storage.set(LANGUAGE_KEY, language)?;

        self.prefs.language = language.to_string();
        self.output.clear();
        self.error = None;
        Ok(())
    }

    /// Saves a non-empty buffer as the draft of the current language.
    pub fn save_draft(&self) -> Result<(), StorageError> {
        let current = self.code();
        if current.is_empty() {
            return Ok(());
        }
        self.storage.set(&draft_key(&self.prefs.language), &current)
    }

    /// Drops the saved draft for the current language and puts the starter
    /// program back into the buffer.
    pub fn reset_to_default(&mut self) -> Result<(), StorageError> {
        self.storage.delete(&draft_key(&self.prefs.language))?;
        let starter = language_config(&self.prefs.language)
            .map(|lang| lang.default_code)
            .unwrap_or_default();
        if let Some(editor) = self.editor.as_deref_mut() {
            editor.set_value(starter);
        }
        Ok(())
    }

    /// Runs the buffer through the execution provider and records the result.
    pub async fn run(&mut self) {
        let Some(ticket) = self.begin_run() else {
            return;
        };
        let response = self.provider.execute(ticket.request.clone()).await;
        self.complete_run(ticket, response);
    }

    /// Starts a run without awaiting it. Returns `None` when there is nothing
    /// to send; the store's error state says why. Any run already pending is
    /// superseded.
    pub fn begin_run(&mut self) -> Option<RunTicket> {
        let code = self.code();
        if code.is_empty() {
            self.error = Some(EMPTY_CODE_ERROR.to_string());
            return None;
        }

        self.generation += 1;
        self.is_running = true;
        self.error = None;
        self.output.clear();

        let Some(runtime) = runtime_for(&self.prefs.language) else {
            tracing::warn!(language = %self.prefs.language, "no runtime configured for language");
            self.record_failure(code, RUN_FAILED_ERROR.to_string());
            self.is_running = false;
            return None;
        };

        Some(RunTicket {
            generation: self.generation,
            request: ExecuteRequest::new(runtime, &code),
            code,
        })
    }

    /// Applies the provider's answer for `ticket`. Returns `false` and leaves
    /// the state untouched when a newer run has started since.
    pub fn complete_run(
        &mut self,
        ticket: RunTicket,
        response: Result<ExecuteResponse, ProviderError>,
    ) -> bool {
        if ticket.generation != self.generation {
            tracing::debug!(
                stale = ticket.generation,
                latest = self.generation,
                "dropping superseded execution result"
            );
            return false;
        }

        match response.and_then(ExecutionOutcome::classify) {
            Ok(ExecutionOutcome::Success(output)) => {
                self.output = output.clone();
                self.error = None;
                self.execution_result = Some(ExecutionResult::succeeded(ticket.code, output));
            }
            Ok(
                ExecutionOutcome::ApiError(error)
                | ExecutionOutcome::CompileError(error)
                | ExecutionOutcome::RuntimeError(error),
            ) => self.record_failure(ticket.code, error),
            Err(e) => {
                tracing::warn!(error = %e, "error running code");
                self.record_failure(ticket.code, RUN_FAILED_ERROR.to_string());
            }
        }

        self.is_running = false;
        true
    }

    fn record_failure(&mut self, code: String, error: String) {
        self.error = Some(error.clone());
        self.execution_result = Some(ExecutionResult::failed(code, error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{MockProvider, StageResult};
    use crate::storage::{FileStore, MemoryStore};
    use serde_json::json;
    use std::sync::Arc;

    fn response(value: serde_json::Value) -> ExecuteResponse {
        serde_json::from_value(value).expect("decode response")
    }

    fn store_with(
        provider: MockProvider,
    ) -> (EditorStore<MockProvider, Arc<MemoryStore>>, Arc<MemoryStore>) {
        let storage = Arc::new(MemoryStore::new());
        (EditorStore::new(provider, Arc::clone(&storage)), storage)
    }

    #[test]
    fn defaults_apply_without_saved_preferences() {
        let (store, _) = store_with(MockProvider::echo());
        assert_eq!(store.language(), "javascript");
        assert_eq!(store.theme(), "vs-dark");
        assert_eq!(store.font_size(), 14);

        let detached = EditorStore::detached(MockProvider::echo());
        assert_eq!(detached.preferences(), &Preferences::default());
    }

    #[test]
    fn saved_preferences_are_loaded() {
        let storage = MemoryStore::with_entries([
            (LANGUAGE_KEY, "python"),
            (THEME_KEY, "vs-light"),
            (FONT_SIZE_KEY, "20"),
        ]);
        let store = EditorStore::new(MockProvider::echo(), storage);
        assert_eq!(store.language(), "python");
        assert_eq!(store.theme(), "vs-light");
        assert_eq!(store.font_size(), 20);
    }

    #[test]
    fn garbage_font_size_falls_back_to_default() {
        let storage = MemoryStore::with_entries([(FONT_SIZE_KEY, "huge")]);
        let store = EditorStore::new(MockProvider::echo(), storage);
        assert_eq!(store.font_size(), DEFAULT_FONT_SIZE);
    }

    #[test]
    fn setters_persist_without_validation() {
        let (mut store, storage) = store_with(MockProvider::echo());
        store.set_theme("no-such-theme").unwrap();
        store.set_font_size(0).unwrap();
        assert_eq!(store.theme(), "no-such-theme");
        assert_eq!(store.font_size(), 0);
        assert_eq!(
            storage.get(THEME_KEY).unwrap().as_deref(),
            Some("no-such-theme")
        );
        assert_eq!(storage.get(FONT_SIZE_KEY).unwrap().as_deref(), Some("0"));
    }

    #[test]
    fn failed_theme_write_keeps_store_and_storage_in_step() {
        let dir = std::env::temp_dir().join(format!(
            "snipper-editor-unwritable-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let blocker = dir.join("blocker");
        std::fs::write(&blocker, "").expect("write blocker file");
        let path = blocker.join("prefs.json");

        let storage = Arc::new(FileStore::open(&path).expect("open store"));
        let mut store = EditorStore::new(MockProvider::echo(), Arc::clone(&storage));
        assert!(store.set_theme("hc-black").is_err());
        assert_eq!(store.theme(), DEFAULT_THEME);
        assert_eq!(storage.get(THEME_KEY).unwrap(), None);

        let fresh = EditorStore::new(MockProvider::echo(), Arc::clone(&storage));
        assert_eq!(fresh.theme(), DEFAULT_THEME);

        std::fs::remove_dir_all(&dir).expect("cleanup temp dir");
    }

    #[test]
    fn code_is_empty_without_editor() {
        let (store, _) = store_with(MockProvider::echo());
        assert_eq!(store.code(), "");
    }

    #[test]
    fn set_language_saves_draft_under_previous_language() {
        let (mut store, storage) = store_with(MockProvider::echo());
        store.attach_editor(TextBuffer::new("let a = 1;"));
        store.set_language("python").unwrap();

        assert_eq!(
            storage.get(&draft_key("javascript")).unwrap().as_deref(),
            Some("let a = 1;")
        );
        assert_eq!(storage.get(&draft_key("python")).unwrap(), None);
        assert_eq!(storage.get(LANGUAGE_KEY).unwrap().as_deref(), Some("python"));
        assert_eq!(store.language(), "python");
    }

    #[test]
    fn set_language_skips_empty_buffer_and_clears_output() {
        let (mut store, storage) = store_with(MockProvider::echo());
        store.attach_editor(TextBuffer::default());
        store.begin_run();
        assert_eq!(store.error(), Some(EMPTY_CODE_ERROR));

        store.set_language("go").unwrap();
        assert_eq!(storage.get(&draft_key("javascript")).unwrap(), None);
        assert_eq!(store.error(), None);
        assert_eq!(store.output(), "");
    }

    #[test]
    fn attach_loads_draft_for_current_language() {
        let storage = MemoryStore::with_entries([
            (LANGUAGE_KEY, "rust"),
            ("editor-code-rust", "fn main() {}"),
        ]);
        let mut store = EditorStore::new(MockProvider::echo(), storage);
        store.attach_editor(TextBuffer::new("starter"));
        assert_eq!(store.code(), "fn main() {}");
    }

    #[test]
    fn reset_to_default_drops_draft() {
        let storage = Arc::new(MemoryStore::with_entries([(
            "editor-code-javascript",
            "draft",
        )]));
        let mut store = EditorStore::new(MockProvider::echo(), Arc::clone(&storage));
        store.attach_editor(TextBuffer::default());
        assert_eq!(store.code(), "draft");

        store.reset_to_default().unwrap();
        assert_eq!(storage.get(&draft_key("javascript")).unwrap(), None);
        assert!(store.code().contains("console.log"));
    }

    #[tokio::test]
    async fn empty_buffer_is_rejected_without_request() {
        let (mut store, _) = store_with(MockProvider::echo());
        store.attach_editor(TextBuffer::default());
        store.run().await;

        assert_eq!(store.error(), Some(EMPTY_CODE_ERROR));
        assert!(store.provider().requests().is_empty());
        assert!(store.execution_result().is_none());
        assert!(!store.is_running());
    }

    #[tokio::test]
    async fn run_sends_runtime_for_selected_language() {
        let (mut store, _) = store_with(MockProvider::echo());
        store.set_language("python").unwrap();
        store.attach_editor(TextBuffer::new("print('hi')"));
        store.run().await;

        let requests = store.provider().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].language, "python");
        assert_eq!(requests[0].version, "3.10.0");
        assert_eq!(requests[0].files[0].content, "print('hi')");
    }

    #[tokio::test]
    async fn api_message_becomes_error() {
        let (mut store, _) = store_with(MockProvider::responding(response(json!({
            "message": "X"
        }))));
        store.attach_editor(TextBuffer::new("1"));
        store.run().await;

        assert_eq!(store.error(), Some("X"));
        let result = store.execution_result().expect("result recorded");
        assert_eq!(result.output, "");
        assert_eq!(result.error.as_deref(), Some("X"));
        assert!(!store.is_running());
    }

    #[tokio::test]
    async fn compile_failure_uses_stderr_then_stdout() {
        let (mut store, _) = store_with(MockProvider::responding(response(json!({
            "compile": {"code": 1, "stderr": "boom"}
        }))));
        store.attach_editor(TextBuffer::new("int main("));
        store.run().await;
        assert_eq!(store.error(), Some("boom"));

        let (mut store, _) = store_with(MockProvider::responding(response(json!({
            "compile": {"code": 1, "stderr": "", "stdout": "out"}
        }))));
        store.attach_editor(TextBuffer::new("int main("));
        store.run().await;
        assert_eq!(store.error(), Some("out"));
        assert_eq!(
            store.execution_result().and_then(|r| r.error.as_deref()),
            Some("out")
        );
    }

    #[tokio::test]
    async fn runtime_failure_is_reported() {
        let (mut store, _) = store_with(MockProvider::responding(ExecuteResponse {
            message: None,
            compile: None,
            run: Some(StageResult {
                code: Some(1),
                stderr: "ReferenceError: x is not defined".to_string(),
                ..StageResult::default()
            }),
        }));
        store.attach_editor(TextBuffer::new("x"));
        store.run().await;
        assert_eq!(store.error(), Some("ReferenceError: x is not defined"));
        assert_eq!(store.output(), "");
    }

    #[tokio::test]
    async fn success_output_is_trimmed_and_error_cleared() {
        let (mut store, _) = store_with(MockProvider::responding(response(json!({
            "run": {"code": 0, "output": "  hello  "}
        }))));
        store.attach_editor(TextBuffer::new("console.log('hello')"));
        store.run().await;

        assert_eq!(store.output(), "hello");
        assert_eq!(store.error(), None);
        assert_eq!(
            store.execution_result(),
            Some(&ExecutionResult::succeeded(
                "console.log('hello')".to_string(),
                "hello".to_string()
            ))
        );
        assert!(!store.is_running());
    }

    #[tokio::test]
    async fn transport_failure_yields_generic_error() {
        let (mut store, _) = store_with(MockProvider::unreachable());
        store.attach_editor(TextBuffer::new("console.log(1)"));
        store.run().await;

        assert_eq!(store.error(), Some(RUN_FAILED_ERROR));
        assert_eq!(
            store.execution_result().and_then(|r| r.error.as_deref()),
            Some(RUN_FAILED_ERROR)
        );
        assert!(!store.is_running());
    }

    #[tokio::test]
    async fn malformed_response_yields_generic_error() {
        let (mut store, _) = store_with(MockProvider::responding(ExecuteResponse::default()));
        store.attach_editor(TextBuffer::new("console.log(1)"));
        store.run().await;
        assert_eq!(store.error(), Some(RUN_FAILED_ERROR));
    }

    #[tokio::test]
    async fn unknown_language_fails_without_request() {
        let (mut store, _) = store_with(MockProvider::echo());
        store.set_language("cobol").unwrap();
        store.attach_editor(TextBuffer::new("DISPLAY 'HI'."));
        store.run().await;

        assert_eq!(store.error(), Some(RUN_FAILED_ERROR));
        assert!(store.provider().requests().is_empty());
        assert!(!store.is_running());
    }

    #[test]
    fn newer_run_supersedes_pending_one() {
        let (mut store, _) = store_with(MockProvider::echo());
        store.attach_editor(TextBuffer::new("first"));
        let first = store.begin_run().expect("first ticket");
        store
            .editor_mut()
            .expect("editor attached")
            .set_value("second");
        let second = store.begin_run().expect("second ticket");
        assert!(second.generation() > first.generation());

        let ok = |text: &str| -> Result<ExecuteResponse, ProviderError> {
            Ok(response(json!({"run": {"code": 0, "output": text}})))
        };
        assert!(!store.complete_run(first, ok("stale")));
        assert!(store.is_running());
        assert_eq!(store.output(), "");

        assert!(store.complete_run(second, ok("fresh")));
        assert!(!store.is_running());
        assert_eq!(store.output(), "fresh");
        assert_eq!(
            store.execution_result().map(|r| r.code.as_str()),
            Some("second")
        );
    }

    #[test]
    fn snapshot_reflects_state() {
        let (mut store, _) = store_with(MockProvider::echo());
        store.set_theme("hc-black").unwrap();
        let snap = store.snapshot();
        assert_eq!(snap.theme, "hc-black");
        assert!(!snap.is_running);
        assert!(snap.execution_result.is_none());
    }
}
