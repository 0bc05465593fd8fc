use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;

use crate::translation::{
    Language, Tone, TranslationError, TranslationOptions, TranslationRequest, TranslationResult,
    Translator,
};

/// Shown for every failed translation; the cause only goes to the log.
pub const TRANSLATION_ERROR_MESSAGE: &str = "the manuscript could not be processed";

/// How long `copied` stays set after a copy.
pub const COPY_ACKNOWLEDGMENT: Duration = Duration::from_secs(2);

pub trait Clipboard: Send + Sync {
    fn set_text(&self, text: &str) -> Result<(), Box<dyn Error + Send + Sync>>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkspaceState {
    pub source_text: String,
    pub options: TranslationOptions,
    pub result: Option<TranslationResult>,
    pub error: Option<&'static str>,
    pub is_loading: bool,
    pub copied: bool,
}

#[derive(Default)]
struct Inner {
    state: WorkspaceState,
    /// Bumped by every submission and every clear. A submission only writes
    /// while its own generation is current.
    generation: u64,
    copy_generation: u64,
}

/// The editor screen without its widgets: the author's input, the running
/// translation and the flags the view renders from.
#[derive(Clone)]
pub struct Workspace {
    translator: Translator,
    inner: Arc<Mutex<Inner>>,
}

impl Workspace {
    pub fn new(translator: Translator) -> Self {
        Self { translator, inner: Arc::new(Mutex::new(Inner::default())) }
    }

    pub fn snapshot(&self) -> WorkspaceState {
        self.inner.lock().unwrap().state.clone()
    }

    pub fn set_source_text(&self, source_text: impl Into<String>) {
        self.inner.lock().unwrap().state.source_text = source_text.into();
    }

    pub fn set_target_language(&self, target_language: Language) {
        self.inner.lock().unwrap().state.options.target_language = target_language;
    }

    pub fn set_tone(&self, tone: Tone) {
        self.inner.lock().unwrap().state.options.tone = tone;
    }

    pub fn set_context(&self, context: impl Into<String>) {
        self.inner.lock().unwrap().state.options.context = context.into();
    }

    /// Translates the current source text, appending fragments to the result
    /// as they arrive. Does nothing when the source text is blank.
    pub async fn submit(&self) {
        let (request, generation) = {
            let mut inner = self.inner.lock().unwrap();

            if inner.state.source_text.trim().is_empty() {
                return;
            }

            inner.generation += 1;
            inner.state.result = None;
            inner.state.error = None;
            inner.state.is_loading = true;

            let request = TranslationRequest {
                source_text: inner.state.source_text.clone(),
                options: inner.state.options.clone(),
            };

            (request, inner.generation)
        };

        if let Err(err) = self.stream_translation(&request, generation).await {
            log::error!("translation into {} failed: {err}", request.options.target_language);
            self.update(generation, |state| state.error = Some(TRANSLATION_ERROR_MESSAGE));
        }

        self.update(generation, |state| state.is_loading = false);
    }

    async fn stream_translation(
        &self,
        request: &TranslationRequest,
        generation: u64,
    ) -> Result<(), TranslationError> {
        let mut fragments =
            self.translator.translate_stream(&request.source_text, &request.options).await?;

        while let Some(fragment) = fragments.next().await {
            let fragment = fragment?;

            let current = self.update(generation, |state| {
                state
                    .result
                    .get_or_insert_with(TranslationResult::default)
                    .translated_text
                    .push_str(&fragment);
            });

            if !current {
                log::debug!("translation superseded, dropping the stream");
                break;
            }
        }

        Ok(())
    }

    /// Applies `update` if `generation` is still the current one.
    fn update(&self, generation: u64, update: impl FnOnce(&mut WorkspaceState)) -> bool {
        let mut inner = self.inner.lock().unwrap();

        if inner.generation != generation {
            return false;
        }

        update(&mut inner.state);
        true
    }

    /// Discards the input, context, result and error. A submission still in
    /// flight stops at its next fragment without touching the state again.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.generation += 1;
        inner.copy_generation += 1;

        let options = TranslationOptions { context: String::new(), ..inner.state.options.clone() };
        inner.state = WorkspaceState { options, ..WorkspaceState::default() };
    }

    /// Copies the translated text and raises `copied` for [`COPY_ACKNOWLEDGMENT`].
    /// Must be called from within a Tokio runtime.
    pub fn copy_result(
        &self,
        clipboard: &dyn Clipboard,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let text = {
            let inner = self.inner.lock().unwrap();
            inner.state.result.as_ref().map(|result| result.translated_text.clone())
        };

        let Some(text) = text.filter(|text| !text.is_empty()) else {
            return Ok(());
        };

        // not under the lock: the clipboard may read the workspace back
        clipboard.set_text(&text)?;

        let copy_generation = {
            let mut inner = self.inner.lock().unwrap();
            inner.copy_generation += 1;
            inner.state.copied = true;
            inner.copy_generation
        };

        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            tokio::time::sleep(COPY_ACKNOWLEDGMENT).await;

            let mut inner = inner.lock().unwrap();
            if inner.copy_generation == copy_generation {
                inner.state.copied = false;
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transport::TransportError;
    use crate::utilities::test_fixtures::{ControlledTransport, ScriptedTransport};

    #[derive(Default)]
    struct MemoryClipboard {
        text: Mutex<Option<String>>,
    }

    impl Clipboard for MemoryClipboard {
        fn set_text(&self, text: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
            *self.text.lock().unwrap() = Some(text.into());
            Ok(())
        }
    }

    struct BrokenClipboard;

    impl Clipboard for BrokenClipboard {
        fn set_text(&self, _: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
            Err("clipboard unavailable".into())
        }
    }

    fn workspace(transport: ScriptedTransport) -> (Workspace, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        (Workspace::new(Translator::new(transport.clone())), transport)
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }

            tokio::task::yield_now().await;
        }

        panic!("condition never became true");
    }

    #[tokio::test]
    async fn test_submit_accumulates_fragments() {
        let (workspace, transport) =
            workspace(ScriptedTransport::fragments(&["Hola", "", ", mundo"]));
        workspace.set_source_text("Hello, world");
        workspace.set_target_language(Language::Spanish);
        workspace.set_tone(Tone::Casual);
        workspace.set_context("a greeting");

        workspace.submit().await;

        let state = workspace.snapshot();
        assert_eq!(
            state.result,
            Some(TranslationResult { translated_text: "Hola, mundo".into(), ..Default::default() })
        );
        assert_eq!(state.error, None);
        assert!(!state.is_loading);

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].prompt.contains("Tone: Casual\n"));
        assert!(calls[0].prompt.contains("Context: a greeting\n"));
    }

    #[tokio::test]
    async fn test_submit_ignores_blank_source() {
        let (workspace, transport) = workspace(ScriptedTransport::fragments(&["Hola"]));

        workspace.submit().await;
        workspace.set_source_text(" \n\t");
        workspace.submit().await;

        assert!(transport.calls().is_empty());
        assert_eq!(workspace.snapshot().source_text, " \n\t");
        assert_eq!(workspace.snapshot().result, None);
    }

    #[tokio::test]
    async fn test_submit_reports_generic_error() {
        let (workspace, _) = workspace(
            ScriptedTransport::fragments(&["Hal"]).with_stream_error("connection reset"),
        );
        workspace.set_source_text("Hello");

        workspace.submit().await;

        let state = workspace.snapshot();
        assert_eq!(state.error, Some(TRANSLATION_ERROR_MESSAGE));
        assert!(!state.is_loading);
        assert_eq!(state.result.unwrap().translated_text, "Hal");
    }

    #[tokio::test]
    async fn test_submit_resets_previous_result() {
        let (workspace, _) = workspace(ScriptedTransport::fragments(&["Hola"]));
        workspace.set_source_text("Hello");

        workspace.submit().await;
        workspace.submit().await;

        assert_eq!(workspace.snapshot().result.unwrap().translated_text, "Hola");
    }

    #[tokio::test]
    async fn test_loading_while_streaming() {
        let (transport, tx) = ControlledTransport::new();
        let workspace = Workspace::new(Translator::new(Arc::new(transport)));
        workspace.set_source_text("Hello");

        let task = tokio::spawn({
            let workspace = workspace.clone();
            async move { workspace.submit().await }
        });

        tx.send(Ok("Hola".into())).unwrap();
        wait_until(|| workspace.snapshot().result.is_some()).await;
        assert!(workspace.snapshot().is_loading);

        tx.send(Err(TransportError::MalformedStream("truncated".into()))).unwrap();
        task.await.unwrap();

        let state = workspace.snapshot();
        assert!(!state.is_loading);
        assert_eq!(state.error, Some(TRANSLATION_ERROR_MESSAGE));
    }

    #[tokio::test]
    async fn test_clear_mid_stream_does_not_resurrect_results() {
        let (transport, tx) = ControlledTransport::new();
        let workspace = Workspace::new(Translator::new(Arc::new(transport)));
        workspace.set_source_text("Hello, world");
        workspace.set_target_language(Language::Italian);
        workspace.set_context("a letter");

        let task = tokio::spawn({
            let workspace = workspace.clone();
            async move { workspace.submit().await }
        });

        tx.send(Ok("Ciao".into())).unwrap();
        wait_until(|| workspace.snapshot().result.is_some()).await;

        workspace.clear();

        tx.send(Ok(", mondo".into())).unwrap();
        tx.send(Err(TransportError::MalformedStream("late failure".into()))).ok();
        drop(tx);
        task.await.unwrap();

        assert_eq!(
            workspace.snapshot(),
            WorkspaceState {
                options: TranslationOptions::new(Language::Italian),
                ..WorkspaceState::default()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_copy_acknowledgment_resets() {
        let (workspace, _) = workspace(ScriptedTransport::fragments(&["Hola"]));
        let clipboard = MemoryClipboard::default();
        workspace.set_source_text("Hello");
        workspace.submit().await;

        workspace.copy_result(&clipboard).unwrap();
        assert_eq!(clipboard.text.lock().unwrap().as_deref(), Some("Hola"));
        assert!(workspace.snapshot().copied);

        tokio::time::sleep(COPY_ACKNOWLEDGMENT / 2).await;
        workspace.copy_result(&clipboard).unwrap();

        tokio::time::sleep(COPY_ACKNOWLEDGMENT * 3 / 4).await;
        assert!(workspace.snapshot().copied);

        tokio::time::sleep(COPY_ACKNOWLEDGMENT / 2).await;
        tokio::task::yield_now().await;
        assert!(!workspace.snapshot().copied);
    }

    #[tokio::test]
    async fn test_copy_without_result() {
        let (workspace, _) = workspace(ScriptedTransport::fragments(&[]));
        let clipboard = MemoryClipboard::default();

        workspace.copy_result(&clipboard).unwrap();
        assert!(clipboard.text.lock().unwrap().is_none());
        assert!(!workspace.snapshot().copied);

        workspace.set_source_text("Hello");
        workspace.submit().await;
        assert!(workspace.copy_result(&BrokenClipboard).is_ok());

        assert_eq!(workspace.snapshot().result, None);
    }

    /// Keeps what the workspace showed at the moment of the copy.
    struct ReadingClipboard {
        workspace: Workspace,
        seen: Mutex<Option<WorkspaceState>>,
    }

    impl Clipboard for ReadingClipboard {
        fn set_text(&self, _: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
            *self.seen.lock().unwrap() = Some(self.workspace.snapshot());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_copy_clipboard_reads_workspace() {
        let (workspace, _) = workspace(ScriptedTransport::fragments(&["Hola"]));
        workspace.set_source_text("Hello");
        workspace.submit().await;

        let clipboard = ReadingClipboard { workspace: workspace.clone(), seen: Mutex::default() };
        workspace.copy_result(&clipboard).unwrap();

        let seen = clipboard.seen.lock().unwrap().take().unwrap();
        assert_eq!(seen.result.unwrap().translated_text, "Hola");
        assert!(!seen.copied);
        assert!(workspace.snapshot().copied);
    }

    #[tokio::test]
    async fn test_copy_error() {
        let (workspace, _) = workspace(ScriptedTransport::fragments(&["Hola"]));
        workspace.set_source_text("Hello");
        workspace.submit().await;

        assert!(workspace.copy_result(&BrokenClipboard).is_err());
        assert!(!workspace.snapshot().copied);
    }
}
